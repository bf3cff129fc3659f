use std::sync::Arc;
use std::time::Duration;

use otpmig_live::live::{serve_listener, LiveConfig, OtpEvent};
use otpmig_otp::migration::{decode_migration_uri, PngQrEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;

const SAMPLE: &str = "otpauth-migration://offline?data=CjEKCkhlbGxvId6tvu8SGEV4YW1wbGU6YWxpY2VAZ29vZ2xlLmNvbRoHRXhhbXBsZTAC";

#[tokio::test]
async fn two_viewers_receive_the_same_feed() {
    let batch = decode_migration_uri(SAMPLE).unwrap();
    let id = batch.entries[0].id();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = LiveConfig {
        interval_ms: 25,
        queue_capacity: 4,
        ..Default::default()
    };
    let (tx, rx) = watch::channel(false);
    let server = tokio::spawn(serve_listener(
        listener,
        batch,
        config,
        Arc::new(PngQrEncoder::default()),
        rx,
    ));

    let mut first = reqwest::get(format!("http://{}/events", addr)).await.unwrap();
    let mut second = reqwest::get(format!("http://{}/events", addr)).await.unwrap();

    for resp in [&mut first, &mut second] {
        let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame = String::from_utf8(chunk.to_vec()).unwrap();
        let data = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        let event: OtpEvent = serde_json::from_str(data).unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.code.len(), 6);
        assert!(event.time >= 0.0 && event.time < 30.0);
    }

    let png = reqwest::get(format!("http://{}/{}.png", addr, id))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&png[..4], b"\x89PNG");

    // A viewer going away does not disturb the other one or the producer.
    drop(first);
    let chunk = tokio::time::timeout(Duration::from_secs(5), second.chunk())
        .await
        .unwrap()
        .unwrap();
    assert!(chunk.is_some());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
