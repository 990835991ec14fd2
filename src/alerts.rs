//! Background alert poller.
//!
//! Every interval the poller asks Prometheus for firing alerts and pushes one chat message per
//! alert to the configured channel. A failed query counts as zero alerts; the loop never stops
//! on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::backends::prometheus::{firing_alerts, MetricsApi};
use crate::error::Result;

/// Outbound chat capability used by the poller.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

pub fn alert_message(name: &str) -> String {
    format!("🚨 Alert firing: `{}`", name)
}

pub struct AlertPoller {
    metrics: Option<Arc<dyn MetricsApi>>,
    sender: Arc<dyn ChatSender>,
    chat_id: Option<i64>,
    interval: Duration,
}

impl AlertPoller {
    pub fn new(
        metrics: Option<Arc<dyn MetricsApi>>,
        sender: Arc<dyn ChatSender>,
        chat_id: Option<i64>,
        interval: Duration,
    ) -> Self {
        Self {
            metrics,
            sender,
            chat_id,
            interval,
        }
    }

    /// One poll. Returns the number of notifications delivered.
    pub async fn tick(&self) -> usize {
        let (Some(metrics), Some(chat_id)) = (self.metrics.as_deref(), self.chat_id) else {
            return 0;
        };

        let names = match firing_alerts(metrics).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Alert query failed, treating as no alerts: {}", e);
                return 0;
            }
        };
        if !names.is_empty() {
            tracing::info!("{} alert(s) firing", names.len());
        }

        let mut sent = 0;
        for name in &names {
            match self.sender.send_message(chat_id, &alert_message(name)).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to send alert {} to chat {}: {}", name, chat_id, e),
            }
        }
        sent
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        if self.metrics.is_none() || self.chat_id.is_none() {
            tracing::info!("Alert poller idle: PROMETHEUS_URL or ALERT_CHAT_ID not configured");
        } else {
            tracing::info!("Alert poller started (every {}s)", self.interval.as_secs());
        }

        loop {
            self.tick().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }
        tracing::info!("Alert poller stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::prometheus::tests::FakeMetrics;
    use crate::backends::BackendError;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatSender for RecordingSender {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Other("chat not found".to_string()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    const INTERVAL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_one_message_per_alert() {
        let sender = Arc::new(RecordingSender::default());
        let poller = AlertPoller::new(
            Some(Arc::new(FakeMetrics::alerting(&["HighCPU", "DiskFull"]))),
            sender.clone(),
            Some(-100123),
            INTERVAL,
        );

        assert_eq!(poller.tick().await, 2);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent[0], (-100123, "🚨 Alert firing: `HighCPU`".to_string()));
        assert_eq!(sent[1].1, "🚨 Alert firing: `DiskFull`");
    }

    #[tokio::test]
    async fn test_unconfigured_poller_sends_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let metrics = Arc::new(FakeMetrics::alerting(&["HighCPU"]));

        let no_chat = AlertPoller::new(Some(metrics.clone()), sender.clone(), None, INTERVAL);
        let no_metrics = AlertPoller::new(None, sender.clone(), Some(1), INTERVAL);

        assert_eq!(no_chat.tick().await, 0);
        assert_eq!(no_metrics.tick().await, 0);
        assert!(sender.sent.lock().unwrap().is_empty());
        assert_eq!(metrics.query_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failures_are_not_counted() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let poller = AlertPoller::new(
            Some(Arc::new(FakeMetrics::alerting(&["HighCPU"]))),
            sender,
            Some(1),
            INTERVAL,
        );
        assert_eq!(poller.tick().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_query_keeps_ticking() {
        let sender = Arc::new(RecordingSender::default());
        let metrics = Arc::new(FakeMetrics::failing(BackendError::unreachable("connection refused")));
        let poller = AlertPoller::new(Some(metrics.clone()), sender.clone(), Some(1), INTERVAL);

        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone());

        // Ticks at 0s, 300s and 600s.
        sleep(INTERVAL * 2 + Duration::from_secs(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(metrics.query_count(), 3);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_promptly() {
        let sender = Arc::new(RecordingSender::default());
        let poller = AlertPoller::new(None, sender, None, INTERVAL);

        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }
}
