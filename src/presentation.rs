//! Seam between the dispatch core and whatever draws the overlay.
//!
//! The core never renders; it calls into this trait and receives raw key
//! events back through the dispatcher. A tracing-backed implementation ships
//! so the core runs headless (tests, automation, platforms without a UI).

use tracing::{info, warn};

/// Calls the core makes toward the presentation layer.
pub trait Presentation: Send + Sync {
    /// Display the overlay for the group identified by `label` (None = root).
    fn show(&self, label: Option<&str>);
    /// Dismiss the overlay.
    fn hide(&self);
    /// Feedback for a key that matched nothing in the current group.
    fn not_found(&self, key: char);
    /// Blocking, user-visible (non-fatal) warning, e.g. a malformed default
    /// config.
    fn alert(&self, message: &str);
}

/// Headless presentation that routes everything through tracing.
#[derive(Debug, Default)]
pub struct LoggingPresentation;

impl Presentation for LoggingPresentation {
    fn show(&self, label: Option<&str>) {
        info!(
            event_type = "overlay",
            action = "show",
            group = label.unwrap_or("(root)"),
            "Overlay show"
        );
    }

    fn hide(&self) {
        info!(event_type = "overlay", action = "hide", "Overlay hide");
    }

    fn not_found(&self, key: char) {
        info!(
            event_type = "overlay",
            action = "not_found",
            key = %key,
            "No entry for key '{}'", key
        );
    }

    fn alert(&self, message: &str) {
        warn!(event_type = "overlay", action = "alert", "{}", message);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every presentation call for assertions.
    #[derive(Default)]
    pub struct RecordingPresentation {
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingPresentation {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut self.calls.lock())
        }
    }

    impl Presentation for RecordingPresentation {
        fn show(&self, label: Option<&str>) {
            self.calls
                .lock()
                .push(format!("show:{}", label.unwrap_or("(root)")));
        }

        fn hide(&self) {
            self.calls.lock().push("hide".to_string());
        }

        fn not_found(&self, key: char) {
            self.calls.lock().push(format!("not_found:{}", key));
        }

        fn alert(&self, message: &str) {
            self.calls.lock().push(format!("alert:{}", message));
        }
    }
}
