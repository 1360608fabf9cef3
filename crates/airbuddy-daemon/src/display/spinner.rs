//! Busy indicator: a block that breathes in both directions.

use std::time::Duration;
use tokio::time::Instant;

use super::{Presenter, Screen};

/// Animation frames, each a list of equal-width lines.
pub const FRAMES: [&[&str]; 8] = [
    &["      ████      "],
    &["     ██████     "],
    &["     ██████     ", "     ██████     "],
    &["    ████████    ", "    ████████    "],
    &[
        "    ████████    ",
        "    ████████    ",
        "    ████████    ",
    ],
    &["    ████████    ", "    ████████    "],
    &["     ██████     ", "     ██████     "],
    &["     ██████     "],
];

/// Returns frame `index`, wrapping around.
pub fn frame(index: usize) -> &'static [&'static str] {
    FRAMES[index % FRAMES.len()]
}

/// Animates the spinner on `presenter` until `duration` has elapsed.
pub async fn run(presenter: &dyn Presenter, duration: Duration, interval: Duration) {
    let interval = interval.max(Duration::from_millis(1));
    let end = Instant::now() + duration;
    let mut index = 0;

    while Instant::now() < end {
        presenter.show(&Screen::Busy { frame: index });
        index = (index + 1) % FRAMES.len();
        let left = end.saturating_duration_since(Instant::now());
        tokio::time::sleep(interval.min(left)).await;
    }
}
