//! Tick-driven code producer.
//!
//! The producer task owns the batch outright, so it is the only place HOTP
//! counters ever move.

use std::time::Duration;

use chrono::{DateTime, Utc};
use otpmig_otp::migration::{MigrationBatch, OtpEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::broker::Broker;

/// Payload of one stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpEvent {
    pub id: Uuid,
    pub code: String,
    /// Seconds elapsed in the current TOTP window.
    pub time: f64,
}

/// Evaluate every entry once and publish one event per entry.
///
/// Entries that fail to evaluate are logged and left out of this tick.
/// Returns the number of events published.
pub fn tick(batch: &mut MigrationBatch, broker: &Broker, engine: &OtpEngine, now: DateTime<Utc>) -> usize {
    let time = engine.seconds_in_period(now);
    let mut published = 0;
    for entry in batch.entries.iter_mut() {
        let code = match engine.evaluate_string(entry, now) {
            Ok(code) => code,
            Err(e) => {
                log::warn!("cannot evaluate '{}': {}", entry.name, e);
                continue;
            }
        };
        let event = OtpEvent {
            id: entry.id(),
            code,
            time,
        };
        match serde_json::to_string(&event) {
            Ok(json) => {
                broker.publish(&json);
                published += 1;
            }
            Err(e) => log::warn!("cannot serialize event for '{}': {}", entry.name, e),
        }
    }
    published
}

/// Run [`tick`] every `interval` until `shutdown` flips to `true` or its
/// sender goes away. Hands the batch back with its advanced counters.
pub async fn run_producer(
    mut batch: MigrationBatch,
    broker: Broker,
    engine: OtpEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> MigrationBatch {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!(
        "producer started: {} entries every {:?}",
        batch.len(),
        interval
    );

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                tick(&mut batch, &broker, &engine, Utc::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("producer stopped");
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use otpmig_otp::migration::{OtpEntry, OtpType};

    fn batch() -> MigrationBatch {
        MigrationBatch {
            version: 1,
            batch_size: 1,
            entries: vec![
                OtpEntry::new(
                    "Example:alice@google.com",
                    vec![0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x21, 0xde, 0xad, 0xbe, 0xef],
                )
                .with_issuer("Example")
                .with_type(OtpType::Totp),
                OtpEntry::new("broken", Vec::new()),
                OtpEntry::new("counter", b"12345678901234567890".to_vec()).as_hotp(0),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn tick_publishes_per_entry_and_skips_failures() {
        let broker = Broker::default();
        let mut sub = broker.subscribe();
        let mut batch = batch();
        let now = Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap();

        assert_eq!(tick(&mut batch, &broker, &OtpEngine::default(), now), 2);

        let first: OtpEvent = serde_json::from_str(&sub.try_recv().unwrap()).unwrap();
        assert_eq!(first.id, batch.entries[0].id());
        assert_eq!(first.code, "528064");
        assert!((first.time - 5.0).abs() < 1e-9);

        let second: OtpEvent = serde_json::from_str(&sub.try_recv().unwrap()).unwrap();
        assert_eq!(second.code, "287082");
        assert_eq!(sub.try_recv(), None);
        assert_eq!(batch.entries[2].counter, 1);
    }

    #[test]
    fn tick_advances_hotp_each_time() {
        let broker = Broker::default();
        let mut batch = batch();
        let now = Utc::now();
        tick(&mut batch, &broker, &OtpEngine::default(), now);
        tick(&mut batch, &broker, &OtpEngine::default(), now);
        assert_eq!(batch.entries[2].counter, 2);
    }

    #[tokio::test]
    async fn producer_runs_until_shutdown() {
        let broker = Broker::default();
        let mut sub = broker.subscribe();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_producer(
            batch(),
            broker.clone(),
            OtpEngine::default(),
            Duration::from_millis(10),
            rx,
        ));

        // The first tick fires immediately.
        let msg = sub.recv().await.unwrap();
        assert!(msg.contains("\"code\""));

        tx.send(true).unwrap();
        let batch = handle.await.unwrap();
        assert!(batch.entries[2].counter >= 1);
    }

    #[tokio::test]
    async fn producer_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let batch = run_producer(batch(), Broker::default(), OtpEngine::default(), Duration::from_secs(3600), rx).await;
        assert_eq!(batch.len(), 3);
    }
}
