//! WebSocket live feed of newly stored readings.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, ReadingEvent};

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing stored in between is missed
    let mut rx = state.readings_tx.subscribe();

    info!("WebSocket client connected");

    // Start the client off with the latest reading
    let latest = state.store.lock().await.latest();
    match latest {
        Ok(Some(reading)) => {
            if let Ok(json) = serde_json::to_string(&ReadingEvent::from(&reading))
                && sender.send(Message::Text(json.into())).await.is_err()
            {
                info!("WebSocket client disconnected during initial snapshot");
                return;
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Could not load snapshot for WebSocket client: {}", e),
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client fell behind, skipped {} readings", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound messages are only watched for close; axum answers pings
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use thermolog_core::ReadingSink;
    use thermolog_store::Store;
    use thermolog_types::Reading;
    use time::macros::datetime;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::ingest::StoreSink;

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn serve(state: Arc<AppState>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router().with_state(state))
                .await
                .unwrap();
        });
        format!("ws://{}/api/ws", addr)
    }

    async fn next_event(client: &mut Client) -> serde_json::Value {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no message within 5s")
            .expect("feed closed")
            .unwrap();
        serde_json::from_str(message.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());
        let app = router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/api/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // A plain GET without upgrade headers is rejected by the extractor
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_snapshot_then_new_readings() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());
        state
            .store
            .lock()
            .await
            .append(&Reading::new(datetime!(2026-01-09 00:00:05 UTC), 22.1))
            .unwrap();

        let (mut client, _) = connect_async(serve(Arc::clone(&state)).await)
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut client).await,
            serde_json::json!({"time": "2026-01-09 00:00:05", "temp": 22.1})
        );

        // The handler subscribed before sending the snapshot
        let sink = StoreSink::new(Arc::clone(&state));
        sink.append(&Reading::new(datetime!(2026-01-09 00:00:10 UTC), 22.4))
            .await
            .unwrap();
        sink.append(&Reading::new(datetime!(2026-01-09 00:59:50 UTC), 21.9))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut client).await,
            serde_json::json!({"time": "2026-01-09 00:00:10", "temp": 22.4})
        );
        assert_eq!(
            next_event(&mut client).await,
            serde_json::json!({"time": "2026-01-09 00:59:50", "temp": 21.9})
        );

        client.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_lagging_client_skips_to_newest() {
        let mut config = Config::default();
        config.server.broadcast_buffer = 2;
        let state = AppState::new(Store::open_in_memory().unwrap(), config);

        // Holding the store keeps the handler parked on its snapshot, so
        // events pile up in its subscription.
        let store = state.store.lock().await;
        let (mut client, _) = connect_async(serve(Arc::clone(&state)).await)
            .await
            .unwrap();
        timeout(Duration::from_secs(5), async {
            while state.readings_tx.receiver_count() == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler never subscribed");

        for minute in 0..5u8 {
            let reading = Reading::new(
                datetime!(2026-01-09 00:00:00 UTC) + time::Duration::minutes(minute.into()),
                20.0 + f64::from(minute),
            );
            state.readings_tx.send(ReadingEvent::from(&reading)).unwrap();
        }
        drop(store);

        assert_eq!(next_event(&mut client).await["temp"], 23.0);
        assert_eq!(next_event(&mut client).await["temp"], 24.0);

        // Still live after the skip
        let sink = StoreSink::new(Arc::clone(&state));
        sink.append(&Reading::new(datetime!(2026-01-09 01:00:00 UTC), 19.5))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut client).await,
            serde_json::json!({"time": "2026-01-09 01:00:00", "temp": 19.5})
        );
    }
}
