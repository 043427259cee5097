use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::info;

use crate::traits::EventNotifier;

const RETAINED_EVENTS: usize = 100;

/// Logs events and keeps the most recent ones for inspection.
#[derive(Default)]
pub struct LoggingEventNotifier {
    recent: Mutex<VecDeque<String>>,
}

impl LoggingEventNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.recent.lock().iter().cloned().collect()
    }
}

impl EventNotifier for LoggingEventNotifier {
    fn event(&self, message: &str) {
        info!(event = message, "master event");
        let mut recent = self.recent.lock();
        if recent.len() == RETAINED_EVENTS {
            recent.pop_front();
        }
        recent.push_back(message.to_string());
    }
}
