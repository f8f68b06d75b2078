use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::StatusKind;
use crate::notifier::StatusNotifier;

pub mod generation;
pub mod payment;

pub use generation::{GenerationFlow, GenerationState};
pub use payment::{PaymentFlow, PaymentState};

/// Held for the duration of one flow invocation; a second invocation fails to
/// acquire it.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The single loading toast a flow keeps visible. Showing a new step replaces
/// the previous toast; clearing is idempotent.
pub(crate) struct LoadingToast<'a> {
    notifier: &'a StatusNotifier,
    active: Option<String>,
}

impl<'a> LoadingToast<'a> {
    pub(crate) fn new(notifier: &'a StatusNotifier) -> Self {
        Self {
            notifier,
            active: None,
        }
    }

    pub(crate) fn show(&mut self, text: impl Into<String>) {
        self.clear();
        self.active = Some(self.notifier.post_for(text, StatusKind::Loading, 0));
    }

    pub(crate) fn clear(&mut self) {
        if let Some(id) = self.active.take() {
            self.notifier.dismiss(&id);
        }
    }
}

impl Drop for LoadingToast<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}
