//! Display views and presenters.
//!
//! The orchestrator decides what to show; a [`Presenter`] decides how. All
//! presenter calls are fire-and-forget: failures are logged by the
//! presenter and never reach the caller.

pub mod booter;
mod console;
mod panel;
pub mod spinner;

pub use console::ConsolePresenter;
pub use panel::PanelPresenter;

use crate::reading::{Rating, Reading};

/// One screenful.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    /// Startup splash with `filled` progress blocks
    Booting { filled: usize },
    /// Waiting for the button, with the last logged reading if any
    Idle { last: Option<Reading> },
    /// One busy-indicator frame
    Busy { frame: usize },
    /// A single measurement
    Metric {
        label: String,
        value: String,
        freshness: &'static str,
    },
    /// Overall rating
    Face {
        rating: Rating,
        freshness: &'static str,
    },
    /// Settings page
    Settings { lines: Vec<String> },
    /// Timed error message
    Error { message: String },
    /// Display off
    Blank,
}

impl Screen {
    /// Text lines for the view, top to bottom.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Screen::Booting { filled } => vec!["airBuddy".into(), booter::bar(*filled)],
            Screen::Idle { last } => {
                let mut lines = vec!["airBuddy".into(), "Press to sample".into()];
                if let Some(reading) = last {
                    lines.push(format!(
                        "Last: {} {}",
                        reading.rating,
                        reading.timestamp.format("%H:%M")
                    ));
                }
                lines
            }
            Screen::Busy { frame } => spinner::frame(*frame)
                .iter()
                .map(|line| line.to_string())
                .collect(),
            Screen::Metric {
                label,
                value,
                freshness,
            } => vec![label.clone(), value.clone(), freshness.to_string()],
            Screen::Face { rating, freshness } => vec![
                face_for(*rating).to_string(),
                rating.to_string(),
                freshness.to_string(),
            ],
            Screen::Settings { lines } => lines.clone(),
            Screen::Error { message } => vec!["Error".into(), message.clone()],
            Screen::Blank => Vec::new(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Screen::Booting { .. } => "booting",
            Screen::Idle { .. } => "idle",
            Screen::Busy { .. } => "busy",
            Screen::Metric { .. } => "metric",
            Screen::Face { .. } => "face",
            Screen::Settings { .. } => "settings",
            Screen::Error { .. } => "error",
            Screen::Blank => "blank",
        }
    }
}

/// Emoticon for a rating.
pub fn face_for(rating: Rating) -> &'static str {
    match rating {
        Rating::VeryGood => "(^_^)",
        Rating::Good => "(-_-)",
        Rating::Ok => "(o_o)",
        Rating::Poor => "(x_x)",
    }
}

/// Builds the metric screens for a reading, in display order.
pub fn metric_screens(reading: &Reading) -> Vec<Screen> {
    let freshness = reading.provenance.freshness();
    let metric = |label: &str, value: String| Screen::Metric {
        label: label.to_string(),
        value,
        freshness,
    };
    vec![
        metric("Temperature", format!("{:.1} C", reading.temperature_c)),
        metric("Humidity", format!("{:.0} %", reading.humidity)),
        metric("eCO2", format!("{} ppm", reading.eco2_ppm)),
        metric("TVOC", format!("{} ppb", reading.tvoc_ppb)),
    ]
}

/// Output surface for screens.
pub trait Presenter: Send + Sync {
    /// Shows a screen. Never fails; problems are logged.
    fn show(&self, screen: &Screen);

    /// Returns the last rendered frame as PNG, if this presenter renders.
    fn snapshot_png(&self) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reading::tests::sample_measurement;
    use crate::reading::Provenance;
    use chrono::DateTime;
    use std::sync::Mutex;

    /// Presenter that records every screen shown.
    #[derive(Default)]
    pub(crate) struct RecordingPresenter {
        pub screens: Mutex<Vec<Screen>>,
    }

    impl RecordingPresenter {
        pub(crate) fn kinds(&self) -> Vec<&'static str> {
            self.screens.lock().unwrap().iter().map(|s| s.kind()).collect()
        }
    }

    impl Presenter for RecordingPresenter {
        fn show(&self, screen: &Screen) {
            self.screens.lock().unwrap().push(screen.clone());
        }
    }

    fn reading(provenance: Provenance) -> Reading {
        Reading::from_measurement(
            &sample_measurement(2),
            provenance,
            DateTime::parse_from_rfc3339("2025-03-01T10:20:00+01:00").unwrap(),
        )
    }

    #[test]
    fn test_idle_lines() {
        assert_eq!(Screen::Idle { last: None }.lines().len(), 2);
        let lines = Screen::Idle {
            last: Some(reading(Provenance::Scheduled)),
        }
        .lines();
        assert_eq!(lines[2], "Last: Good 10:20");
    }

    #[test]
    fn test_metric_screens_carry_freshness() {
        let screens = metric_screens(&reading(Provenance::Fallback));
        assert_eq!(screens.len(), 4);
        assert_eq!(
            screens[0].lines(),
            vec!["Temperature", "21.5 C", "cached"]
        );
        assert_eq!(screens[2].lines(), vec!["eCO2", "612 ppm", "cached"]);

        let fresh = metric_screens(&reading(Provenance::Button));
        assert_eq!(fresh[1].lines()[2], "just now");
    }

    #[test]
    fn test_face_lines() {
        let lines = Screen::Face {
            rating: Rating::Poor,
            freshness: "just now",
        }
        .lines();
        assert_eq!(lines, vec!["(x_x)", "Poor", "just now"]);
    }

    #[test]
    fn test_blank_has_no_lines() {
        assert!(Screen::Blank.lines().is_empty());
    }
}
