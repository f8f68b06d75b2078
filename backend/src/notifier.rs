use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::model::{StatusKind, StatusMessage};

pub const DEFAULT_STATUS_DURATION_MS: u64 = 3000;

/// Ordered list of transient status messages.
///
/// Messages with a duration are removed by a background task once it
/// elapses; that task filters the current list by id, so a message dismissed
/// earlier stays dismissed.
#[derive(Debug, Clone, Default)]
pub struct StatusNotifier {
    messages: Arc<Mutex<Vec<StatusMessage>>>,
}

impl StatusNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts with the default three second lifetime.
    pub fn post(&self, text: impl Into<String>, kind: StatusKind) -> String {
        self.post_for(text, kind, DEFAULT_STATUS_DURATION_MS)
    }

    /// Posts a message that expires after `duration_ms`; 0 keeps it until
    /// dismissed. Outside a tokio runtime the message is kept until dismissed.
    pub fn post_for(&self, text: impl Into<String>, kind: StatusKind, duration_ms: u64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let message = StatusMessage {
            id: id.clone(),
            kind,
            text: text.into(),
            duration_ms: (duration_ms > 0).then_some(duration_ms),
        };
        tracing::debug!(id = %id, kind = kind.label(), text = %message.text, "Status posted");
        self.lock().push(message);

        if duration_ms > 0 {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let messages = Arc::clone(&self.messages);
                    let expired = id.clone();
                    handle.spawn(async move {
                        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                        lock(&messages).retain(|m| m.id != expired);
                    });
                }
                Err(_) => {
                    tracing::warn!(id = %id, "No async runtime, status message will not expire");
                }
            }
        }

        id
    }

    pub fn dismiss(&self, id: &str) {
        self.lock().retain(|m| m.id != id);
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StatusMessage>> {
        lock(&self.messages)
    }
}

fn lock(messages: &Mutex<Vec<StatusMessage>>) -> MutexGuard<'_, Vec<StatusMessage>> {
    messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn messages_expire_after_duration() {
        let notifier = StatusNotifier::new();
        notifier.post("short", StatusKind::Info);
        notifier.post_for("long", StatusKind::Error, 10_000);
        notifier.post_for("sticky", StatusKind::Loading, 0);
        assert_eq!(notifier.messages().len(), 3);

        tokio::time::sleep(Duration::from_millis(3_001)).await;
        let texts: Vec<_> = notifier.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["long", "sticky"]);

        tokio::time::sleep(Duration::from_millis(7_000)).await;
        let texts: Vec<_> = notifier.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["sticky"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_is_idempotent() {
        let notifier = StatusNotifier::new();
        let first = notifier.post("first", StatusKind::Info);
        notifier.post("second", StatusKind::Success);

        notifier.dismiss(&first);
        notifier.dismiss(&first);
        notifier.dismiss("missing");

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_after_dismissal_does_not_resurrect() {
        let notifier = StatusNotifier::new();
        let id = notifier.post("gone", StatusKind::Info);
        notifier.dismiss(&id);
        let kept = notifier.post_for("kept", StatusKind::Info, 0);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, kept);
    }

    #[test]
    fn posting_outside_a_runtime_keeps_the_message() {
        let notifier = StatusNotifier::new();
        let id = notifier.post("no runtime", StatusKind::Info);
        assert_eq!(notifier.messages().len(), 1);

        notifier.dismiss(&id);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn preserves_insertion_order() {
        let notifier = StatusNotifier::new();
        for i in 0..5 {
            notifier.post_for(format!("m{i}"), StatusKind::Info, 0);
        }
        let texts: Vec<_> = notifier.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }
}
