//! Boot screen: title over a block progress bar that fills up.

use std::time::Duration;

use super::{Presenter, Screen};

/// Blocks across a full bar.
pub const BAR_BLOCKS: usize = 12;

/// Bar text with `filled` of [`BAR_BLOCKS`] blocks lit.
pub fn bar(filled: usize) -> String {
    let filled = filled.min(BAR_BLOCKS);
    format!("{}{}", "█".repeat(filled), " ".repeat(BAR_BLOCKS - filled))
}

/// Animates the bar from empty to full over `duration`.
pub async fn run(presenter: &dyn Presenter, duration: Duration, frame: Duration) {
    let frame = frame.max(Duration::from_millis(1));
    let frames = (duration.as_millis() / frame.as_millis()).max(1) as usize;
    if duration.is_zero() {
        presenter.show(&Screen::Booting {
            filled: BAR_BLOCKS,
        });
        return;
    }

    for i in 0..=frames {
        presenter.show(&Screen::Booting {
            filled: i * BAR_BLOCKS / frames,
        });
        if i < frames {
            tokio::time::sleep(frame).await;
        }
    }
}
