//! Ingest to query over the full service: scripted serial source, on-disk
//! database, HTTP router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use thermolog_core::{Error, MockEvent, MockSource};
use thermolog_service::{AppState, Config, Ingest};
use thermolog_store::Store;

fn test_config(db: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.path = db.to_path_buf();
    config.ingest.read_timeout_ms = 20;
    config.ingest.max_consecutive_failures = 2;
    config.ingest.backoff.initial_delay_ms = 5;
    config.ingest.backoff.max_delay_ms = 10;
    config.ingest.backoff.jitter = false;
    config
}

async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = thermolog_service::app(Arc::clone(state))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_serial_lines_reach_the_api() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir.path().join("readings.db"));
    let state = AppState::new(Store::open(&config.storage.path).unwrap(), config);
    let mut live = state.readings_tx.subscribe();

    // A record split across reads, a garbage line, then a dropped link that
    // comes back with the rest of the hour.
    let source = MockSource::new()
        .session(vec![
            MockEvent::data("T:22.10 @ 2026-01-09 00:00:05\nT:22.4"),
            MockEvent::data("0 @ 2026-01-09 00:00:10\nT:abc @ 2026-01-09 00:00:00\n"),
            MockEvent::error(std::io::ErrorKind::BrokenPipe),
        ])
        .session(vec![MockEvent::data("T:21.90 @ 2026-01-09 00:59:50\n")]);
    let source = Arc::new(source);

    let listener = Ingest::new(Arc::clone(&state)).listener_for(Box::new(Arc::clone(&source)));
    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let watcher = {
        let state = Arc::clone(&state);
        async move {
            tokio::time::timeout(Duration::from_secs(5), async {
                while state.ingest.snapshot().stored < 3 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("ingest did not store readings in time");
            stop.cancel();
        }
    };

    let ((), result) = tokio::join!(watcher, listener.run(cancel));
    let stats = result.unwrap();
    assert_eq!(stats.stored, 3);
    assert_eq!(stats.parse_failures, 1);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(source.opens(), 2);

    let first = live.recv().await.unwrap();
    assert_eq!(first.time, "2026-01-09 00:00:05");

    let (status, current) = get_json(&state, "/api/current").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        current,
        serde_json::json!({"temperature": 21.9, "timestamp": "2026-01-09 00:59:50"})
    );

    let (_, readings) = get_json(&state, "/api/readings").await;
    let temps: Vec<f64> = readings
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["temp"].as_f64().unwrap())
        .collect();
    assert_eq!(temps, vec![22.1, 22.4, 21.9]);

    let (_, daily) = get_json(&state, "/api/daily").await;
    assert_eq!(
        daily,
        serde_json::json!([{"date": "2026-01-09 00:00:00", "avg": 22.13}])
    );

    let (status, empty) = get_json(
        &state,
        "/api/readings?start=2026-01-09%2003:57:15&end=2026-01-09%2003:57:18",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty, serde_json::json!([]));

    let (_, health) = get_json(&state, "/api/health").await;
    assert_eq!(health["database"]["reading_count"], 3);
    assert_eq!(health["ingest"]["stored"], 3);
    assert_eq!(health["ingest"]["running"], false);
}

#[tokio::test]
async fn test_readings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("readings.db");

    {
        let config = test_config(&path);
        let state = AppState::new(Store::open(&path).unwrap(), config);
        let source = MockSource::new().session(vec![
            MockEvent::data("T:19.50 @ 2026-01-10 08:15:00\n"),
            MockEvent::Eof,
        ]);
        let err = Ingest::new(Arc::clone(&state))
            .listener_for(Box::new(source))
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        // One session, then every reopen fails until the cap is exceeded
        assert!(matches!(err, Error::ConnectionLost { attempts: 3, .. }));
    }

    let state = AppState::new(Store::open(&path).unwrap(), test_config(&path));
    let (_, current) = get_json(&state, "/api/current").await;
    assert_eq!(
        current,
        serde_json::json!({"temperature": 19.5, "timestamp": "2026-01-10 08:15:00"})
    );
}

#[tokio::test]
async fn test_api_only_mode_reports_idle_ingest() {
    let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());

    let (status, current) = get_json(&state, "/api/current").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current, serde_json::json!({"error": "no data"}));

    let (_, health) = get_json(&state, "/api/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["ingest"]["lines"], 0);
}
