//! Application state management.

use airbuddy_hw::{ButtonAction, EnvironmentSensor, OledDevice, SensorDevice, SimulatedSensor};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Config, DisplayConfig, SensorConfig};
use crate::display::{ConsolePresenter, PanelPresenter, Presenter};
use crate::engine::SamplingEngine;
use crate::orchestrator::Orchestrator;
use crate::reading::Reading;
use crate::records::ReadingLog;
use crate::rendering::TextRenderer;
use crate::scheduler::Scheduler;

/// Shared application state.
pub struct AppState {
    /// Sole owner of the sensor and the log appends
    engine: Arc<SamplingEngine>,

    /// Background scheduler
    scheduler: Arc<Scheduler>,

    /// Foreground controller
    orchestrator: Arc<Orchestrator>,

    /// Display output
    presenter: Arc<dyn Presenter>,

    /// Button actions into the orchestrator
    actions: mpsc::Sender<ButtonAction>,
}

impl AppState {
    /// Opens the log and devices and wires the components together.
    ///
    /// Missing hardware is not an error: the sensor is retried on every
    /// sample and a missing panel falls back to headless rendering.
    pub fn new(config: &Config, actions: mpsc::Sender<ButtonAction>) -> Result<Self> {
        let log = ReadingLog::open(&config.log.path).context("Failed to open reading log")?;
        info!("Reading log at {}", log.path().display());

        let engine = Arc::new(
            SamplingEngine::new(open_sensor(&config.sensor), log)
                .with_read_timeout(Duration::from_millis(config.sensor.read_timeout_ms)),
        );
        let scheduler = Arc::new(Scheduler::new(engine.clone()));
        let presenter = open_presenter(&config.display);
        let orchestrator = Arc::new(Orchestrator::new(
            engine.clone(),
            scheduler.clone(),
            presenter.clone(),
            config.foreground.timing(),
        ));

        Ok(Self {
            engine,
            scheduler,
            orchestrator,
            presenter,
            actions,
        })
    }

    pub fn engine(&self) -> &Arc<SamplingEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Most recent logged reading.
    pub fn latest_reading(&self) -> Option<Reading> {
        self.engine.last_logged()
    }

    /// Queues a virtual button action. Returns false if the controller is
    /// busy with a full queue or has stopped.
    pub fn press(&self, action: ButtonAction) -> bool {
        match self.actions.try_send(action) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropped button action {}: {}", action, e);
                false
            }
        }
    }

    /// Last rendered frame as PNG.
    pub fn screen_png(&self) -> Option<Vec<u8>> {
        self.presenter.snapshot_png()
    }
}

fn open_sensor(config: &SensorConfig) -> Box<dyn SensorDevice> {
    if config.simulate {
        info!("Using simulated sensor");
        return Box::new(SimulatedSensor::new());
    }
    Box::new(EnvironmentSensor::new(
        &config.bus,
        config.aht21_address,
        config.ens160_address,
    ))
}

fn open_presenter(config: &DisplayConfig) -> Arc<dyn Presenter> {
    let font = match TextRenderer::from_file(&config.font) {
        Ok(font) => font,
        Err(e) => {
            warn!("{:#}. Screens will be logged only", e);
            return Arc::new(ConsolePresenter::new());
        }
    };

    let device = if config.enable {
        match OledDevice::open(&config.bus, config.address, config.flip) {
            Ok(device) => {
                info!("OLED opened on {} at {:#04x}", config.bus, config.address);
                Some(device)
            }
            Err(e) => {
                warn!("Failed to open OLED: {}. Running headless", e);
                None
            }
        }
    } else {
        None
    };

    match PanelPresenter::new(font, device) {
        Ok(panel) => Arc::new(panel),
        Err(e) => {
            warn!("Failed to create panel renderer: {}. Screens will be logged only", e);
            Arc::new(ConsolePresenter::new())
        }
    }
}
