//! Push button on a sysfs GPIO line.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const SYSFS_GPIO: &str = "/sys/class/gpio";

/// What the user did with the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// One press.
    Single,
    /// Two presses within the double-click window.
    Double,
}

impl FromStr for ButtonAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(ButtonAction::Single),
            "double" => Ok(ButtonAction::Double),
            _ => Err(format!("Unknown button action: {}", s)),
        }
    }
}

impl std::fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonAction::Single => write!(f, "single"),
            ButtonAction::Double => write!(f, "double"),
        }
    }
}

/// Debounced press-edge detector.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    debounce: Duration,
    pressed: bool,
    last_change: Option<Instant>,
}

impl EdgeDetector {
    /// Creates a detector that ignores level changes closer than `debounce`.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pressed: false,
            last_change: None,
        }
    }

    /// Feeds one sampled level. Returns true on a released -> pressed edge.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        if pressed == self.pressed {
            return false;
        }
        if let Some(last) = self.last_change {
            if now.duration_since(last) < self.debounce {
                return false;
            }
        }
        self.pressed = pressed;
        self.last_change = Some(now);
        pressed
    }
}

/// A momentary button wired to a GPIO line exported through sysfs.
pub struct GpioButton {
    pin: u32,
    value_path: PathBuf,
    active_low: bool,
    poll: Duration,
    double_click: Duration,
    detector: EdgeDetector,
}

impl GpioButton {
    /// Exports `pin` as an input and returns a button reading it.
    pub fn open(pin: u32, active_low: bool) -> Result<Self> {
        let gpio_dir = PathBuf::from(SYSFS_GPIO).join(format!("gpio{}", pin));
        let gpio_err = |source| Error::Gpio { pin, source };

        if !gpio_dir.exists() {
            fs::write(Path::new(SYSFS_GPIO).join("export"), pin.to_string()).map_err(gpio_err)?;
            // udev needs a moment to fix permissions on the new node
            thread::sleep(Duration::from_millis(100));
        }
        fs::write(gpio_dir.join("direction"), "in").map_err(gpio_err)?;

        info!("Button on GPIO {} (active {})", pin, if active_low { "low" } else { "high" });
        Ok(Self::with_value_path(pin, gpio_dir.join("value"), active_low))
    }

    /// Creates a button reading an arbitrary value file.
    pub fn with_value_path(pin: u32, value_path: PathBuf, active_low: bool) -> Self {
        Self {
            pin,
            value_path,
            active_low,
            poll: Duration::from_millis(10),
            double_click: Duration::from_millis(350),
            detector: EdgeDetector::new(Duration::from_millis(50)),
        }
    }

    /// Sets the sampling period.
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the window in which a second press makes a double click.
    pub fn with_double_click(mut self, window: Duration) -> Self {
        self.double_click = window;
        self
    }

    /// Sets the debounce interval.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.detector = EdgeDetector::new(debounce);
        self
    }

    /// Reads the current level, adjusted for polarity.
    pub fn is_pressed(&self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path).map_err(|source| Error::Gpio {
            pin: self.pin,
            source,
        })?;
        let high = raw.trim() == "1";
        Ok(high != self.active_low)
    }

    /// Blocks until a press edge or `deadline`. Returns false on timeout.
    pub fn wait_for_press(&mut self, deadline: Option<Instant>) -> Result<bool> {
        loop {
            let now = Instant::now();
            if self.detector.update(self.is_pressed()?, now) {
                return Ok(true);
            }
            if deadline.is_some_and(|d| now >= d) {
                return Ok(false);
            }
            thread::sleep(self.poll);
        }
    }

    /// Waits up to `timeout` for a first press, then classifies the click.
    /// Returns `None` if nothing was pressed in time.
    pub fn poll_action(&mut self, timeout: Duration) -> Result<Option<ButtonAction>> {
        if !self.wait_for_press(Some(Instant::now() + timeout))? {
            return Ok(None);
        }

        let window_end = Instant::now() + self.double_click;
        let action = if self.wait_for_press(Some(window_end))? {
            ButtonAction::Double
        } else {
            ButtonAction::Single
        };
        debug!("Button {}: {}", self.pin, action);
        Ok(Some(action))
    }

    /// Blocks until the next single or double click.
    pub fn wait_for_action(&mut self) -> Result<ButtonAction> {
        loop {
            if let Some(action) = self.poll_action(Duration::from_secs(1))? {
                return Ok(action);
            }
        }
    }
}
