//! HTTP surface for a live batch.
//!
//! Routes:
//! - `GET /events`    – SSE stream of `{id, code, time}` events
//! - `GET /entries`   – entry listing without secrets
//! - `GET /{id}.png`  – QR image of one entry's credential URI
//! - `GET /health`

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use otpmig_otp::migration::{qr, EntrySummary, MigrationBatch, OtpEntry, QrEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use uuid::Uuid;

use super::broker::Broker;
use super::config::LiveConfig;
use super::error::{LiveError, LiveResult};
use super::producer::run_producer;

/// Shared, read-only handler state. Entries here are a snapshot taken at
/// startup; the producer owns the live copy.
#[derive(Clone)]
pub struct AppState {
    pub broker: Broker,
    pub entries: Arc<Vec<EntrySummary>>,
    pub routes: Arc<HashMap<Uuid, OtpEntry>>,
    pub qr: Arc<dyn QrEncoder>,
}

impl AppState {
    pub fn new(batch: &MigrationBatch, broker: Broker, qr: Arc<dyn QrEncoder>) -> Self {
        let entries = batch.entries.iter().map(OtpEntry::summary).collect();
        let routes = batch
            .entries
            .iter()
            .map(|e| (e.id(), e.clone()))
            .collect();
        Self {
            broker,
            entries: Arc::new(entries),
            routes: Arc::new(routes),
            qr,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(event_stream))
        .route("/entries", get(list_entries))
        .route("/:file", get(entry_qr))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn event_stream(State(state): State<AppState>) -> Response {
    let sub = state.broker.subscribe();
    log::debug!("event stream opened for subscriber {}", sub.id());
    let frames = sub
        .into_frames()
        .map(|frame| Ok::<_, Infallible>(Bytes::from(frame)));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

async fn list_entries(State(state): State<AppState>) -> Json<Vec<EntrySummary>> {
    Json(state.entries.as_ref().clone())
}

async fn entry_qr(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let entry = file
        .strip_suffix(".png")
        .and_then(|id| Uuid::parse_str(id).ok())
        .and_then(|id| state.routes.get(&id));
    let Some(entry) = entry else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match qr::entry_png(state.qr.as_ref(), entry) {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            log::error!("QR for '{}' failed: {}", entry.name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Resolves once `shutdown` holds `true` or its sender is gone.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Bind `config.bind` and serve until `shutdown` fires.
pub async fn serve(
    batch: MigrationBatch,
    config: LiveConfig,
    qr: Arc<dyn QrEncoder>,
    shutdown: watch::Receiver<bool>,
) -> LiveResult<MigrationBatch> {
    config.validate()?;
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|source| LiveError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    serve_listener(listener, batch, config, qr, shutdown).await
}

/// Serve on an already bound listener. Returns the batch with the
/// producer's final counters.
pub async fn serve_listener(
    listener: TcpListener,
    batch: MigrationBatch,
    config: LiveConfig,
    qr: Arc<dyn QrEncoder>,
    shutdown: watch::Receiver<bool>,
) -> LiveResult<MigrationBatch> {
    let broker = Broker::new(config.event(), config.queue_capacity);
    let state = AppState::new(&batch, broker.clone(), qr);

    let (stop_tx, stop_rx) = watch::channel(false);
    let producer = tokio::spawn(run_producer(
        batch,
        broker.clone(),
        config.engine(),
        config.interval(),
        stop_rx,
    ));

    log::info!("listening on http://{}", listener.local_addr()?);
    let closing = broker.clone();
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            wait_for_shutdown(shutdown).await;
            log::info!("shutdown requested");
            closing.close();
        })
        .await;

    broker.close();
    // The receiver only goes away if the producer already exited.
    let _ = stop_tx.send(true);
    let batch = producer
        .await
        .map_err(|e| LiveError::Serve(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    served?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpmig_otp::migration::{MigrationError, MigrationErrorKind, OtpType, PngQrEncoder};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct FailingQr;

    impl QrEncoder for FailingQr {
        fn encode(&self, _text: &str) -> Result<Vec<u8>, MigrationError> {
            Err(MigrationError::new(MigrationErrorKind::QrEncodeFailed, "no renderer"))
        }
    }

    fn batch() -> MigrationBatch {
        MigrationBatch {
            version: 1,
            entries: vec![
                OtpEntry::new("alice", b"Hello!".to_vec())
                    .with_issuer("Example")
                    .with_type(OtpType::Totp),
                OtpEntry::new("bob", b"12345678901234567890".to_vec()).as_hotp(0),
            ],
            ..Default::default()
        }
    }

    async fn start(
        qr: Arc<dyn QrEncoder>,
    ) -> (SocketAddr, watch::Sender<bool>, JoinHandle<LiveResult<MigrationBatch>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = LiveConfig {
            interval_ms: 20,
            ..Default::default()
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(serve_listener(listener, batch(), config, qr, rx));
        (addr, tx, handle)
    }

    #[tokio::test]
    async fn health_and_entries() {
        let (addr, tx, handle) = start(Arc::new(PngQrEncoder::default())).await;

        let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let entries: Vec<EntrySummary> = reqwest::get(format!("http://{}/entries", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "alice");
        assert_eq!(entries[1].kind, "hotp");

        tx.send(true).unwrap();
        let final_batch = handle.await.unwrap().unwrap();
        assert!(final_batch.entries[1].counter >= 1);
    }

    #[tokio::test]
    async fn qr_routes() {
        let (addr, tx, handle) = start(Arc::new(PngQrEncoder::default())).await;
        let id = batch().entries[0].id();

        let resp = reqwest::get(format!("http://{}/{}.png", addr, id)).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "image/png");
        assert_eq!(&resp.bytes().await.unwrap()[..4], b"\x89PNG");

        let resp = reqwest::get(format!("http://{}/{}.png", addr, Uuid::nil())).await.unwrap();
        assert_eq!(resp.status(), 404);
        let resp = reqwest::get(format!("http://{}/not-a-uuid.png", addr)).await.unwrap();
        assert_eq!(resp.status(), 404);
        let resp = reqwest::get(format!("http://{}/{}", addr, id)).await.unwrap();
        assert_eq!(resp.status(), 404);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn qr_failure_is_500() {
        let (addr, tx, handle) = start(Arc::new(FailingQr)).await;
        let id = batch().entries[0].id();
        let resp = reqwest::get(format!("http://{}/{}.png", addr, id)).await.unwrap();
        assert_eq!(resp.status(), 500);
        assert!(resp.text().await.unwrap().contains("no renderer"));
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn event_stream_frames_and_shutdown() {
        let (addr, tx, handle) = start(Arc::new(PngQrEncoder::default())).await;

        let mut resp = reqwest::get(format!("http://{}/events", addr)).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_eq!(resp.headers()["cache-control"], "no-cache");
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");

        let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("event: otp\ndata: {"));
        assert!(text.ends_with("\n\n"));

        // Shutdown must end the open stream instead of hanging on it.
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = LiveConfig {
            bind: taken.local_addr().unwrap().to_string(),
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);
        let err = serve(batch(), config, Arc::new(PngQrEncoder::default()), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::Bind { .. }));
    }
}
