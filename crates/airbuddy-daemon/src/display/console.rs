//! Headless presenter that writes screens to the log.

use std::sync::Mutex;
use tracing::info;

use super::{Presenter, Screen};

/// Logs each screen. Consecutive animation frames are collapsed.
#[derive(Default)]
pub struct ConsolePresenter {
    last_kind: Mutex<Option<&'static str>>,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for ConsolePresenter {
    fn show(&self, screen: &Screen) {
        let mut last = self.last_kind.lock().unwrap();
        let kind = screen.kind();
        let animated = matches!(screen, Screen::Busy { .. } | Screen::Booting { .. });
        if animated && *last == Some(kind) {
            return;
        }
        *last = Some(kind);
        info!("[{}] {}", kind, screen.lines().join(" | "));
    }
}
