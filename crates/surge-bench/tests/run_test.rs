use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

use surge_bench::{FinishReason, HumanReporter, Reporter, RunCoordinator, Summary};
use surge_client::mock::{json_message, Script, ScriptedConnector};
use surge_client::StompConnector;
use surge_core::{now_epoch_ms, Command, Frame, FrameCodec, RunConfig};

fn config(address: String, clients: usize, duration: Duration) -> RunConfig {
    RunConfig {
        address,
        clients,
        duration,
        shutdown_grace: Duration::from_millis(500),
        log_every: 0,
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn test_refused_client_is_counted_and_run_completes() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let now = now_epoch_ms();
    let connector = Arc::new(ScriptedConnector::new(
        vec![Script::refuse("connection refused")],
        Script::events(vec![json_message(
            "/topic/ul/vehicles/bus",
            &json!({"generatedAt": now - 5.0}),
        )]),
    ));
    let log = connector.log();
    let run = config("mem://broker".into(), 5, Duration::from_millis(300));
    let coordinator = RunCoordinator::new(run.clone(), connector);

    let started = Instant::now();
    let report = timeout(Duration::from_secs(5), coordinator.run())
        .await
        .expect("run must finish within duration plus grace");
    assert!(started.elapsed() < run.duration + run.shutdown_grace + Duration::from_millis(200));

    assert_eq!(log.connects(), 5);
    assert_eq!(report.metrics.failed_clients, 1);
    assert_eq!(report.metrics.connected_clients, 4);
    assert!(report.metrics.errors >= 1);
    assert_eq!(report.metrics.messages_received, 4);
    assert_eq!(report.abandoned, 0);

    let summary = Summary::collect(&run, &report);
    assert_eq!(summary.finish_reasons[&FinishReason::ConnectFailed], 1);
    assert_eq!(summary.finish_reasons[&FinishReason::Timeout], 4);
    assert_eq!(summary.latency.as_ref().map(|l| l.count), Some(4));

    let text = HumanReporter.render(&summary).unwrap();
    assert!(text.contains("Failed:          1"));
    assert!(text.contains("Messages recv:   4"));
}

/// Minimal STOMP broker: answers CONNECT, publishes one timestamped MESSAGE
/// per SUBSCRIBE and stops on DISCONNECT.
async fn serve_broker(listener: TcpListener) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            while let Some(Ok(message)) = ws.next().await {
                let data = match message {
                    Message::Text(text) => text.into_bytes(),
                    Message::Binary(data) => data,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(frames) = FrameCodec::decode_all(&data) else {
                    break;
                };
                for frame in frames {
                    let reply = match frame.command {
                        Command::Connect => Frame::new(Command::Connected)
                            .header("version", "1.2")
                            .header("heart-beat", "0,0"),
                        Command::Subscribe => {
                            let destination = frame.get_header("destination").unwrap_or_default();
                            let body = json!({"timestamp": now_epoch_ms() - 25.0}).to_string();
                            Frame::new(Command::Message)
                                .header("destination", destination)
                                .header("subscription", frame.get_header("id").unwrap_or_default())
                                .header("message-id", "1")
                                .header("content-type", "application/json")
                                .with_body(body)
                        }
                        Command::Disconnect => return,
                        _ => continue,
                    };
                    let encoded = FrameCodec::encode(&reply).unwrap();
                    let text = String::from_utf8(encoded.to_vec()).unwrap();
                    if ws.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}

#[tokio::test]
async fn test_stomp_round_trip_over_websocket() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/ws/websocket", listener.local_addr().unwrap());
    let broker = tokio::spawn(serve_broker(listener));

    // One message per default topic, so the cap ends every session.
    let run = RunConfig {
        max_messages: 4,
        ..config(address, 2, Duration::from_secs(5))
    };
    let coordinator = RunCoordinator::new(run.clone(), Arc::new(StompConnector::new()));

    let report = timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("round trip must finish before the deadline");
    broker.abort();

    assert_eq!(report.metrics.connected_clients, 2);
    assert_eq!(report.metrics.failed_clients, 0);
    assert_eq!(report.metrics.errors, 0);
    assert_eq!(report.metrics.messages_received, 8);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.reason == FinishReason::MessageCap && o.messages == 4));

    let latency = report.latency.expect("broker payloads carry timestamps");
    assert_eq!(latency.count, 8);
    assert!(latency.min_ms >= 25.0);
}

#[tokio::test]
async fn test_unreachable_broker_fails_every_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/ws/websocket", listener.local_addr().unwrap());
    drop(listener);

    let coordinator = RunCoordinator::new(
        config(address, 3, Duration::from_secs(2)),
        Arc::new(StompConnector::new()),
    );
    let report = timeout(Duration::from_secs(5), coordinator.run())
        .await
        .expect("refused connections settle immediately");

    assert_eq!(report.metrics.failed_clients, 3);
    assert_eq!(report.metrics.connected_clients, 0);
    assert_eq!(report.metrics.errors, 3);
    assert!(report.latency.is_none());
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.reason == FinishReason::ConnectFailed));
}
