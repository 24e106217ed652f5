use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use url::Url;

use crate::domain::value_objects::{enums::requester_types::RequesterType, requesters::RequesterUpdate};

/// Base URLs of the services that own payments. A missing entry disables that target.
#[derive(Debug, Clone, Default)]
pub struct RequesterConfig {
    pub order_url: Option<Url>,
    pub reservation_url: Option<Url>,
    pub event_url: Option<Url>,
    pub delivery_url: Option<Url>,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    /// Per-call bound for requester HTTP calls; the dispatcher is serial.
    pub request_timeout: Duration,
}

impl RequesterConfig {
    fn base_for(&self, requester_type: RequesterType) -> Option<&Url> {
        match requester_type {
            RequesterType::Order => self.order_url.as_ref(),
            RequesterType::Reservation => self.reservation_url.as_ref(),
            RequesterType::Event => self.event_url.as_ref(),
        }
    }
}

/// One outbound HTTP call produced from an update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusDispatch {
    pub target: &'static str,
    pub url: Url,
    pub body: Value,
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn send(&self, dispatch: &StatusDispatch) -> Result<()>;
}

/// Fire-and-forget propagation of payment status to requesters. Updates are queued and
/// delivered by a single background task; the caller never waits on a requester.
#[derive(Clone)]
pub struct RequesterNotifier {
    tx: mpsc::Sender<RequesterUpdate>,
}

impl RequesterNotifier {
    pub fn new(config: RequesterConfig, sink: Arc<dyn StatusSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<RequesterUpdate>(config.queue_capacity.max(1));

        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                for dispatch in build_dispatches(&config, &update) {
                    deliver(sink.as_ref(), &dispatch, &config, update.payment_id).await;
                }
            }
        });

        Self { tx }
    }

    pub fn notify(&self, update: RequesterUpdate) {
        let payment_id = update.payment_id;
        match self.tx.try_send(update) {
            Ok(()) => debug!(payment_id, "requesters: status update queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(payment_id, "requesters: queue full; dropping status update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(payment_id, "requesters: queue closed; dropping status update");
            }
        }
    }
}

async fn deliver(sink: &dyn StatusSink, dispatch: &StatusDispatch, config: &RequesterConfig, payment_id: i32) {
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match sink.send(dispatch).await {
            Ok(()) => {
                debug!(
                    payment_id,
                    target = dispatch.target,
                    url = %dispatch.url,
                    attempt,
                    "requesters: status update delivered"
                );
                return;
            }
            Err(err) if attempt < max_attempts => {
                warn!(
                    payment_id,
                    target = dispatch.target,
                    url = %dispatch.url,
                    attempt,
                    error = %err,
                    "requesters: status update failed; retrying"
                );
                tokio::time::sleep(config.retry_backoff * attempt).await;
            }
            Err(err) => {
                error!(
                    payment_id,
                    target = dispatch.target,
                    url = %dispatch.url,
                    attempt,
                    error = %err,
                    "requesters: status update abandoned"
                );
            }
        }
    }
}

fn endpoint(base: &Url, id: i32, suffix: &str) -> Option<Url> {
    let raw = format!("{}/{}/{}", base.as_str().trim_end_matches('/'), id, suffix);
    Url::parse(&raw).ok()
}

pub(crate) fn build_dispatches(config: &RequesterConfig, update: &RequesterUpdate) -> Vec<StatusDispatch> {
    let mut dispatches = Vec::with_capacity(2);

    match config
        .base_for(update.requester_type)
        .and_then(|base| endpoint(base, update.requester_id, "payment-status"))
    {
        Some(url) => dispatches.push(StatusDispatch {
            target: update.requester_type.as_str(),
            url,
            body: json!({
                "payment_id": update.payment_id,
                "status": update.status,
            }),
        }),
        None => warn!(
            payment_id = update.payment_id,
            requester_type = %update.requester_type,
            "requesters: no endpoint configured; skipping requester update"
        ),
    }

    if let Some(secondary_id) = update.secondary_requester_id {
        match config
            .delivery_url
            .as_ref()
            .and_then(|base| endpoint(base, secondary_id, "status"))
        {
            Some(url) => dispatches.push(StatusDispatch {
                target: "delivery",
                url,
                body: json!({
                    "payment_id": update.payment_id,
                    "status": update.status,
                    "label": update.status.delivery_label(),
                }),
            }),
            None => warn!(
                payment_id = update.payment_id,
                secondary_requester_id = secondary_id,
                "requesters: no delivery endpoint configured; skipping delivery update"
            ),
        }
    }

    dispatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::enums::payment_statuses::PaymentStatus;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> RequesterConfig {
        RequesterConfig {
            order_url: Some(Url::parse("http://orders:8000/api/v1/orders/").unwrap()),
            reservation_url: Some(Url::parse("http://reservations:8000/api/v1/reservations").unwrap()),
            event_url: None,
            delivery_url: Some(Url::parse("http://delivery:8000/api/v1/deliveries").unwrap()),
            queue_capacity: 16,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_secs(1),
        }
    }

    fn update(requester_type: RequesterType, secondary: Option<i32>) -> RequesterUpdate {
        RequesterUpdate {
            payment_id: 7,
            requester_type,
            requester_id: 10,
            secondary_requester_id: secondary,
            status: PaymentStatus::Completed,
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<StatusDispatch>>,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn send(&self, dispatch: &StatusDispatch) -> Result<()> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("requester unavailable");
            }
            self.sent.lock().unwrap().push(dispatch.clone());
            Ok(())
        }
    }

    async fn wait_for(sink: &RecordingSink, count: usize) {
        for _ in 0..200 {
            if sink.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn order_update_targets_order_service() {
        let dispatches = build_dispatches(&config(), &update(RequesterType::Order, None));

        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].target, "order");
        assert_eq!(
            dispatches[0].url.as_str(),
            "http://orders:8000/api/v1/orders/10/payment-status"
        );
        assert_eq!(dispatches[0].body["status"], 2);
    }

    #[test]
    fn secondary_requester_adds_delivery_update_with_label() {
        let dispatches = build_dispatches(&config(), &update(RequesterType::Order, Some(99)));

        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[1].target, "delivery");
        assert_eq!(
            dispatches[1].url.as_str(),
            "http://delivery:8000/api/v1/deliveries/99/status"
        );
        assert_eq!(dispatches[1].body["label"], "Payment completed");
    }

    #[test]
    fn unconfigured_requester_is_skipped() {
        let dispatches = build_dispatches(&config(), &update(RequesterType::Event, None));
        assert!(dispatches.is_empty());
    }

    #[tokio::test]
    async fn notifier_delivers_in_background() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = RequesterNotifier::new(config(), sink.clone());

        notifier.notify(update(RequesterType::Reservation, Some(3)));
        wait_for(&sink, 2).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].target, "reservation");
        assert_eq!(sent[1].target, "delivery");
    }

    #[tokio::test]
    async fn failed_delivery_is_retried() {
        let sink = Arc::new(RecordingSink {
            failures_left: AtomicU32::new(2),
            ..Default::default()
        });
        let notifier = RequesterNotifier::new(config(), sink.clone());

        notifier.notify(update(RequesterType::Order, None));
        wait_for(&sink, 1).await;

        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert_eq!(sink.failures_left.load(Ordering::SeqCst), 0);
    }
}
