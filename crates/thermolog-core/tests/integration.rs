//! End-to-end tests for thermolog-core over real OS streams.
//!
//! These drive the listener against a loopback TCP bridge, a capture file and
//! a FIFO on disk, with the in-memory sink standing in for the database.

use std::sync::Arc;
use std::time::Duration;

use thermolog_core::{
    DeviceSource, Error, Listener, ListenerOptions, MemorySink, RetryConfig, TcpSource,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn fast_options() -> ListenerOptions {
    ListenerOptions::default()
        .read_timeout(Duration::from_millis(50))
        .backoff(
            RetryConfig::for_reconnect()
                .initial_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(50)),
        )
}

async fn wait_for_readings(sink: &MemorySink, count: usize) {
    timeout(Duration::from_secs(5), async {
        while sink.readings().len() < count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("readings did not arrive in time");
}

#[tokio::test]
async fn test_tcp_bridge_fragmented_lines() {
    let bridge = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = bridge.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = bridge.accept().await.unwrap();
        socket
            .write_all(b"T:22.10 @ 2026-01-09 00:00:05\nT:22.4")
            .await
            .unwrap();
        sleep(Duration::from_millis(30)).await;
        socket
            .write_all(b"0 @ 2026-01-09 00:00:10\r\nT:bad @ 2026-01-09 00:00:11\n")
            .await
            .unwrap();
        socket
            .write_all(b"T:21.90 @ 2026-01-09 00:59:50\n")
            .await
            .unwrap();
        // Keep the link up until the test is done
        sleep(Duration::from_secs(10)).await;
    });

    let sink = Arc::new(MemorySink::new());
    let listener = Listener::new(Box::new(TcpSource::new(addr.to_string())), Arc::clone(&sink))
        .with_options(fast_options());

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let waiter = {
        let sink = Arc::clone(&sink);
        async move {
            wait_for_readings(&sink, 3).await;
            stop.cancel();
        }
    };

    let ((), result) = tokio::join!(waiter, listener.run(cancel));
    let stats = result.unwrap();

    let values: Vec<f64> = sink.readings().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![22.1, 22.4, 21.9]);
    assert_eq!(stats.lines, 4);
    assert_eq!(stats.parse_failures, 1);
    assert_eq!(stats.stored, 3);
    assert_eq!(stats.reconnects, 0);
}

#[tokio::test]
async fn test_tcp_bridge_drop_triggers_reconnect() {
    let bridge = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = bridge.local_addr().unwrap();

    tokio::spawn(async move {
        // First connection delivers one line and hangs up
        let (mut socket, _) = bridge.accept().await.unwrap();
        socket
            .write_all(b"T:22.10 @ 2026-01-09 00:00:05\n")
            .await
            .unwrap();
        drop(socket);

        let (mut socket, _) = bridge.accept().await.unwrap();
        socket
            .write_all(b"T:22.40 @ 2026-01-09 00:00:10\n")
            .await
            .unwrap();
        sleep(Duration::from_secs(10)).await;
    });

    let sink = Arc::new(MemorySink::new());
    let listener = Listener::new(Box::new(TcpSource::new(addr.to_string())), Arc::clone(&sink))
        .with_options(fast_options());

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let waiter = {
        let sink = Arc::clone(&sink);
        async move {
            wait_for_readings(&sink, 2).await;
            stop.cancel();
        }
    };

    let ((), result) = tokio::join!(waiter, listener.run(cancel));
    let stats = result.unwrap();

    assert_eq!(stats.stored, 2);
    assert_eq!(stats.reconnects, 1);
}

#[tokio::test]
async fn test_unreachable_bridge_is_connection_lost() {
    // Bind then drop to get a port nothing listens on
    let addr = {
        let bridge = TcpListener::bind("127.0.0.1:0").await.unwrap();
        bridge.local_addr().unwrap()
    };

    let sink = Arc::new(MemorySink::new());
    let listener = Listener::new(Box::new(TcpSource::new(addr.to_string())), Arc::clone(&sink))
        .with_options(fast_options().max_consecutive_failures(2));

    let err = listener.run(CancellationToken::new()).await.unwrap_err();

    match err {
        Error::ConnectionLost {
            source_name,
            attempts,
            ..
        } => {
            assert_eq!(source_name, format!("tcp://{}", addr));
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ConnectionLost, got {:?}", other),
    }
    assert!(sink.readings().is_empty());
}

#[tokio::test]
async fn test_capture_file_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ttyCAPTURE");
    std::fs::write(
        &path,
        "T:22.10 @ 2026-01-09 00:00:05\n\
         T:22.40 @ 2026-01-09 00:00:10\n\
         T:21.90 @ 2026-01-09 00:59:50\n",
    )
    .unwrap();

    let sink = Arc::new(MemorySink::new());
    // A regular file hits end-of-stream once drained; with no tolerance for
    // failures that ends the run after a single pass.
    let listener = Listener::new(Box::new(DeviceSource::new(&path)), Arc::clone(&sink))
        .with_options(fast_options().max_consecutive_failures(0));

    let err = listener.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::ConnectionLost { attempts: 1, .. }));
    let values: Vec<f64> = sink.readings().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![22.1, 22.4, 21.9]);
    assert_eq!(listener.stats().snapshot().stored, 3);
}

#[cfg(unix)]
#[test]
fn test_quiet_fifo_is_released_on_cancel() {
    use std::sync::mpsc;
    use std::thread;
    use tokio::net::unix::pipe;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ttyFIFO");
    let status = std::process::Command::new("mkfifo")
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    // The runtime lives on its own thread so a read stuck on the device
    // shows up as a timeout here instead of a hung test.
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let sink = Arc::new(MemorySink::new());
        let write_after_release = runtime.block_on(async {
            let listener = Listener::new(Box::new(DeviceSource::new(&path)), Arc::clone(&sink))
                .with_options(fast_options());
            let cancel = CancellationToken::new();
            let stop = cancel.clone();
            let writer = async {
                // The write end cannot open until the listener holds the read end
                let mut sender = timeout(Duration::from_secs(5), async {
                    loop {
                        match pipe::OpenOptions::new().open_sender(&path) {
                            Ok(sender) => break sender,
                            Err(_) => sleep(Duration::from_millis(10)).await,
                        }
                    }
                })
                .await
                .expect("listener never opened the fifo");

                sender
                    .write_all(b"T:22.10 @ 2026-01-09 00:00:05\n")
                    .await
                    .unwrap();
                wait_for_readings(&sink, 1).await;
                // Quiet line across several read timeouts
                sleep(Duration::from_millis(300)).await;
                stop.cancel();
                sender
            };

            let (sender, result) = tokio::join!(writer, listener.run(cancel));
            let stats = result.unwrap();
            assert_eq!(stats.stored, 1);
            assert_eq!(stats.reconnects, 0);

            sender.try_write(b"T").unwrap_err().kind()
        });
        drop(runtime);
        let _ = done_tx.send(write_after_release);
    });

    let kind = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("listener thread failed or runtime shutdown blocked on the device");
    // No reader left on the fifo once the stream is released
    assert_eq!(kind, std::io::ErrorKind::BrokenPipe);
}
