//! Post-commit notification dispatch for membership changes.
//!
//! Batches are handed off on a spawned task after the data transaction has
//! committed; delivery failures are logged and swallowed so they can never
//! roll back or fail the membership change. There is no retry or dead-letter
//! queue.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::types::{Member, User};

/// One affected member in a dispatch batch.
#[derive(Debug, Clone, Serialize)]
pub struct MemberNotification {
    pub user_id: String,
    pub member_id: String,
    /// `{user_id}::{revision}` of the user's denormalized profile.
    pub profile_version: String,
}

impl MemberNotification {
    #[must_use]
    pub fn new(user: &User, member: &Member) -> Self {
        Self {
            user_id: user.id.clone(),
            member_id: member.id.clone(),
            profile_version: user.profile_version(),
        }
    }
}

/// Delivery backend. The default sink just logs; a deployment wires in its
/// task queue here.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, batch: &[MemberNotification]) -> Result<()>;
}

pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, batch: &[MemberNotification]) -> Result<()> {
        for notification in batch {
            tracing::info!(
                user_id = %notification.user_id,
                member_id = %notification.member_id,
                profile_version = %notification.profile_version,
                "membership notification"
            );
        }
        Ok(())
    }
}

pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Fire-and-forget: schedules delivery and returns immediately.
    pub fn dispatch(&self, batch: Vec<MemberNotification>) {
        if batch.is_empty() {
            return;
        }

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&batch) {
                tracing::warn!("notification delivery failed for {} members: {e}", batch.len());
            }
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        delivered: AtomicUsize,
    }

    impl NotificationSink for CountingSink {
        fn deliver(&self, batch: &[MemberNotification]) -> Result<()> {
            self.delivered.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn deliver(&self, _batch: &[MemberNotification]) -> Result<()> {
            Err(crate::error::Error::Config("sink down".to_string()))
        }
    }

    fn notification(n: usize) -> MemberNotification {
        MemberNotification {
            user_id: format!("u{n}"),
            member_id: format!("m{n}"),
            profile_version: format!("u{n}::1"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_batch() {
        let sink = Arc::new(CountingSink {
            delivered: AtomicUsize::new(0),
        });
        let notifier = Notifier::new(sink.clone());

        notifier.dispatch(vec![notification(1), notification(2)]);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_dispatched() {
        let sink = Arc::new(CountingSink {
            delivered: AtomicUsize::new(0),
        });
        let notifier = Notifier::new(sink.clone());

        notifier.dispatch(Vec::new());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = Notifier::new(Arc::new(FailingSink));
        notifier.dispatch(vec![notification(1)]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // Nothing to assert beyond "no panic, no propagation".
    }
}
