//! Foreground controller.
//!
//! Turns button actions into screens:
//! `Idle -> Sampling -> Displaying -> Idle`, with `Settings` reached from
//! `Idle` by a double click. The background scheduler is held for the
//! whole sampling step and always released afterwards.

use airbuddy_hw::ButtonAction;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::display::{metric_screens, spinner, Presenter, Screen};
use crate::engine::{SamplingEngine, SamplingError};
use crate::reading::{Provenance, Reading};
use crate::scheduler::Scheduler;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Sampling,
    Displaying,
    Settings,
}

/// Foreground durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundTiming {
    /// Sensor warmup for a button sample
    pub warmup: Duration,
    /// Time each metric stays on screen
    pub metric_dwell: Duration,
    /// Time the rating face stays on screen
    pub face_dwell: Duration,
    /// Time the error screen stays up
    pub error_display: Duration,
    /// Time the settings page stays up
    pub settings_display: Duration,
    /// Busy indicator frame period
    pub spinner_interval: Duration,
}

impl Default for ForegroundTiming {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(6),
            metric_dwell: Duration::from_millis(2500),
            face_dwell: Duration::from_millis(3000),
            error_display: Duration::from_millis(3000),
            settings_display: Duration::from_millis(5000),
            spinner_interval: Duration::from_millis(180),
        }
    }
}

/// Drives the display from button actions.
pub struct Orchestrator {
    engine: Arc<SamplingEngine>,
    scheduler: Arc<Scheduler>,
    presenter: Arc<dyn Presenter>,
    timing: ForegroundTiming,
    state: Mutex<ControllerState>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<SamplingEngine>,
        scheduler: Arc<Scheduler>,
        presenter: Arc<dyn Presenter>,
        timing: ForegroundTiming,
    ) -> Self {
        Self {
            engine,
            scheduler,
            presenter,
            timing,
            state: Mutex::new(ControllerState::Idle),
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ControllerState) {
        let mut current = self.state.lock().unwrap();
        if *current != state {
            debug!("Controller {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Shows the idle screen with the last logged reading.
    pub fn show_idle(&self) {
        self.set_state(ControllerState::Idle);
        self.presenter.show(&Screen::Idle {
            last: self.engine.last_logged(),
        });
    }

    /// Consumes actions until the channel closes or `cancel` fires.
    ///
    /// Presses that arrive while an action is being handled are dropped.
    pub async fn run(&self, mut actions: mpsc::Receiver<ButtonAction>, cancel: CancellationToken) {
        self.show_idle();

        loop {
            let action = tokio::select! {
                _ = cancel.cancelled() => break,
                action = actions.recv() => match action {
                    Some(action) => action,
                    None => {
                        debug!("Button channel closed");
                        break;
                    }
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.handle(action) => {}
            }

            let mut dropped = 0;
            while actions.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Discarded {} button action(s) queued during the last cycle", dropped);
            }
        }

        info!("Foreground controller stopped");
    }

    /// Runs one action to completion and returns to idle.
    pub async fn handle(&self, action: ButtonAction) {
        debug!("Button action: {}", action);
        match action {
            ButtonAction::Single => self.sample_and_display().await,
            ButtonAction::Double => self.show_settings().await,
        }
        self.show_idle();
    }

    async fn sample_and_display(&self) {
        match self.sample().await {
            Ok(reading) => {
                info!(
                    "Button reading: {} ({}), {:.2} C, {:.2} %, {} ppm, {} ppb",
                    reading.rating,
                    reading.provenance,
                    reading.temperature_c,
                    reading.humidity,
                    reading.eco2_ppm,
                    reading.tvoc_ppb
                );
                self.display(&reading).await;
            }
            Err(e) => {
                warn!("Button sample failed: {}", e);
                self.set_state(ControllerState::Displaying);
                let message = match e {
                    SamplingError::NoFallbackData => "No data yet".to_string(),
                    other => other.to_string(),
                };
                self.presenter.show(&Screen::Error { message });
                tokio::time::sleep(self.timing.error_display).await;
            }
        }
    }

    async fn sample(&self) -> Result<Reading, SamplingError> {
        self.set_state(ControllerState::Sampling);
        let _hold = self.scheduler.hold();

        self.engine
            .begin_sampling(self.timing.warmup, Provenance::Button);
        spinner::run(
            self.presenter.as_ref(),
            self.timing.warmup,
            self.timing.spinner_interval,
        )
        .await;
        if let Some(session) = self.engine.session() {
            tokio::time::sleep_until(session.deadline).await;
        }
        self.engine.finish_sampling(true).await
    }

    async fn display(&self, reading: &Reading) {
        self.set_state(ControllerState::Displaying);
        for screen in metric_screens(reading) {
            self.presenter.show(&screen);
            tokio::time::sleep(self.timing.metric_dwell).await;
        }
        self.presenter.show(&Screen::Face {
            rating: reading.rating,
            freshness: reading.provenance.freshness(),
        });
        tokio::time::sleep(self.timing.face_dwell).await;
    }

    async fn show_settings(&self) {
        self.set_state(ControllerState::Settings);
        let status = self.scheduler.status();
        let records = match self.engine.log().count() {
            Ok(count) => count.to_string(),
            Err(e) => {
                warn!("Failed to count records: {}", e);
                "?".to_string()
            }
        };
        let schedule = if !status.running {
            "Logging off".to_string()
        } else if status.paused {
            "Logging paused".to_string()
        } else {
            format!("Log every {} min", status.interval_secs / 60)
        };

        self.presenter.show(&Screen::Settings {
            lines: vec![
                "Settings".to_string(),
                schedule,
                format!("Warmup {} s", self.timing.warmup.as_secs()),
                format!("Records {}", records),
            ],
        });
        tokio::time::sleep(self.timing.settings_display).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::tests::RecordingPresenter;
    use crate::engine::tests::{engine_with, Behaviour};
    use crate::reading::tests::sample_measurement;
    use crate::reading::Rating;
    use crate::records::ReadingLog;
    use chrono::DateTime;

    /// Records whether the scheduler was held while the spinner ran, and
    /// the controller state for each screen.
    struct HoldWatch {
        scheduler: Arc<Scheduler>,
        inner: RecordingPresenter,
        held_while_busy: Mutex<Vec<bool>>,
        states: Mutex<Vec<(&'static str, Option<ControllerState>)>>,
        orchestrator: std::sync::OnceLock<std::sync::Weak<Orchestrator>>,
    }

    impl Presenter for HoldWatch {
        fn show(&self, screen: &Screen) {
            if matches!(screen, Screen::Busy { .. }) {
                self.held_while_busy
                    .lock()
                    .unwrap()
                    .push(self.scheduler.is_held());
            }
            let state = self
                .orchestrator
                .get()
                .and_then(|weak| weak.upgrade())
                .map(|o| o.state());
            self.states.lock().unwrap().push((screen.kind(), state));
            self.inner.show(screen);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: Arc<SamplingEngine>,
        scheduler: Arc<Scheduler>,
        presenter: Arc<HoldWatch>,
        orchestrator: Arc<Orchestrator>,
    }

    fn fixture(behaviour: Behaviour, seed: Option<u8>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _counters) = engine_with(behaviour, &dir);
        if let Some(aqi) = seed {
            let previous = Reading::from_measurement(
                &sample_measurement(aqi),
                Provenance::Scheduled,
                DateTime::parse_from_rfc3339("2025-03-01T09:00:00+01:00").unwrap(),
            );
            engine.log().append(&previous).unwrap();
        }
        let engine = Arc::new(engine);
        let scheduler = Arc::new(Scheduler::new(engine.clone()));
        let presenter = Arc::new(HoldWatch {
            scheduler: scheduler.clone(),
            inner: RecordingPresenter::default(),
            held_while_busy: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
            orchestrator: std::sync::OnceLock::new(),
        });
        let orchestrator = Arc::new(Orchestrator::new(
            engine.clone(),
            scheduler.clone(),
            presenter.clone(),
            ForegroundTiming::default(),
        ));
        let _ = presenter.orchestrator.set(Arc::downgrade(&orchestrator));
        Fixture {
            _dir: dir,
            engine,
            scheduler,
            presenter,
            orchestrator,
        }
    }

    fn log_count(log: &ReadingLog) -> usize {
        log.count().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fallback_shows_error_and_resumes() {
        let fx = fixture(Behaviour::Failing, None);

        fx.orchestrator.handle(ButtonAction::Single).await;

        let kinds = fx.presenter.inner.kinds();
        assert_eq!(kinds.first(), Some(&"busy"));
        assert_eq!(&kinds[kinds.len() - 2..], &["error", "idle"]);
        assert!(!kinds.contains(&"metric"));
        assert!(!fx.scheduler.is_held());
        assert!(fx
            .presenter
            .held_while_busy
            .lock()
            .unwrap()
            .iter()
            .all(|held| *held));
        assert_eq!(fx.orchestrator.state(), ControllerState::Idle);

        let states = fx.presenter.states.lock().unwrap().clone();
        assert!(states.contains(&("error", Some(ControllerState::Displaying))));
        assert_eq!(log_count(fx.engine.log()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_device_displays_cached_reading() {
        let fx = fixture(Behaviour::Failing, Some(2));

        fx.orchestrator.handle(ButtonAction::Single).await;

        let screens = fx.presenter.inner.screens.lock().unwrap().clone();
        let metrics: Vec<&Screen> = screens
            .iter()
            .filter(|s| matches!(s, Screen::Metric { .. }))
            .collect();
        assert_eq!(metrics.len(), 4);
        assert!(metrics
            .iter()
            .all(|s| matches!(s, Screen::Metric { freshness: "cached", .. })));
        assert!(screens.contains(&Screen::Face {
            rating: Rating::Good,
            freshness: "cached",
        }));
        assert!(matches!(screens.last(), Some(Screen::Idle { last: Some(_) })));

        // Fallback readings are never logged
        assert_eq!(log_count(fx.engine.log()), 1);
        assert!(!fx.scheduler.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_working_device_logs_button_reading() {
        let fx = fixture(Behaviour::Working(1), None);

        let start = tokio::time::Instant::now();
        fx.orchestrator.handle(ButtonAction::Single).await;

        // Warmup, four metrics and the face
        assert!(start.elapsed() >= Duration::from_millis(6000 + 4 * 2500 + 3000));
        let last = fx.engine.last_logged().unwrap();
        assert_eq!(last.provenance, Provenance::Button);
        assert_eq!(last.rating, Rating::VeryGood);
        assert!(fx.presenter.inner.screens.lock().unwrap().contains(&Screen::Face {
            rating: Rating::VeryGood,
            freshness: "just now",
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_click_shows_settings() {
        let fx = fixture(Behaviour::Working(1), Some(3));

        fx.orchestrator.handle(ButtonAction::Double).await;

        let screens = fx.presenter.inner.screens.lock().unwrap().clone();
        assert_eq!(screens.len(), 2);
        match &screens[0] {
            Screen::Settings { lines } => {
                assert_eq!(lines[1], "Logging off");
                assert_eq!(lines[3], "Records 1");
            }
            other => panic!("Expected settings, got {:?}", other),
        }
        assert_eq!(log_count(fx.engine.log()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_report_operator_pause() {
        let fx = fixture(Behaviour::Working(1), None);
        fx.scheduler.pause();
        fx.scheduler
            .start(crate::scheduler::SchedulerTiming::default());

        fx.orchestrator.handle(ButtonAction::Double).await;

        let screens = fx.presenter.inner.screens.lock().unwrap().clone();
        assert!(matches!(&screens[0], Screen::Settings { lines } if lines[1] == "Logging paused"));
        fx.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_discards_queued_presses() {
        let fx = Arc::new(fixture(Behaviour::Working(2), None));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tx.send(ButtonAction::Single).await.unwrap();
        tx.send(ButtonAction::Single).await.unwrap();

        let runner = {
            let fx = fx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { fx.orchestrator.run(rx, cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
        runner.await.unwrap();

        assert_eq!(log_count(fx.engine.log()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_sample_resumes_scheduler() {
        let fx = Arc::new(fixture(Behaviour::Working(2), None));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let runner = {
            let fx = fx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { fx.orchestrator.run(rx, cancel).await })
        };

        tx.send(ButtonAction::Single).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fx.scheduler.is_held());
        assert_eq!(fx.orchestrator.state(), ControllerState::Sampling);

        cancel.cancel();
        runner.await.unwrap();
        assert!(!fx.scheduler.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_press_keeps_operator_pause() {
        let fx = fixture(Behaviour::Working(2), None);
        fx.scheduler.pause();

        fx.orchestrator.handle(ButtonAction::Single).await;

        assert!(fx.scheduler.is_paused());
        assert!(!fx.scheduler.is_held());
        assert_eq!(log_count(fx.engine.log()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_resume_mid_sample_keeps_hold() {
        let fx = Arc::new(fixture(Behaviour::Working(2), None));
        fx.scheduler.pause();

        let cycle = {
            let fx = fx.clone();
            tokio::spawn(async move { fx.orchestrator.handle(ButtonAction::Single).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        fx.scheduler.resume();
        assert!(fx.scheduler.is_held());

        cycle.await.unwrap();
        assert!(!fx.scheduler.is_held());
        assert!(!fx.scheduler.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_channel_closes() {
        let fx = fixture(Behaviour::Working(2), None);
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        fx.orchestrator.run(rx, CancellationToken::new()).await;
        assert_eq!(fx.presenter.inner.kinds(), vec!["idle"]);
    }
}
