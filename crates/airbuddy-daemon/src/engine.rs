//! Sampling engine.
//!
//! Owns the sensor device and serializes every physical read and every log
//! append behind one async mutex (the exclusive section). Both the button
//! path and the background scheduler go through here. Device calls run on
//! the blocking pool, each bounded by the read timeout; an overrun counts
//! as a failed sample and goes straight to the fallback.
//!
//! Recovery policy per sample: initialize if needed, read, on failure
//! re-initialize and read once more, then fall back to the last logged
//! reading. Only a missing fallback surfaces as an error.

use airbuddy_hw::{Measurement, SensorDevice};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::reading::{now_local, Provenance, Reading};
use crate::records::ReadingLog;

/// Errors that cross the engine boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplingError {
    /// Sensor read failed twice and the log holds nothing to fall back on.
    #[error("Sensor read failed and no fallback record exists")]
    NoFallbackData,

    /// `finish_sampling` was called before the warmup deadline.
    #[error("Warmup not complete ({remaining:?} remaining)")]
    WarmupNotComplete { remaining: Duration },

    /// `finish_sampling` was called without an open session.
    #[error("No sampling session open")]
    NoSession,
}

/// An in-progress non-blocking acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSession {
    /// When the warmup ends
    pub deadline: Instant,
    /// Provenance of the reading this session will produce
    pub provenance: Provenance,
}

/// Used when no read timeout is configured.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

type DeviceGuard = OwnedMutexGuard<Box<dyn SensorDevice>>;

/// Exclusive owner of the sensor device and the log appends.
pub struct SamplingEngine {
    device: Arc<tokio::sync::Mutex<Box<dyn SensorDevice>>>,
    log: ReadingLog,
    session: Mutex<Option<SamplingSession>>,
    read_timeout: Duration,
}

impl SamplingEngine {
    /// Creates an engine and makes one non-fatal attempt to bring the device up.
    pub fn new(mut device: Box<dyn SensorDevice>, log: ReadingLog) -> Self {
        try_init(device.as_mut());
        Self {
            device: Arc::new(tokio::sync::Mutex::new(device)),
            log,
            session: Mutex::new(None),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Bounds each blocking device call (initialize or read).
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Returns the reading log.
    pub fn log(&self) -> &ReadingLog {
        &self.log
    }

    /// Warms up, reads, and logs (if `persist`), falling back to the last
    /// logged reading when the sensor fails twice.
    ///
    /// Holds the exclusive section for the whole call, warmup included.
    pub async fn sample_blocking(
        &self,
        warmup: Duration,
        provenance: Provenance,
        persist: bool,
    ) -> Result<Reading, SamplingError> {
        let device = self.device.clone().lock_owned().await;

        let init = self
            .on_device(device, |d| {
                if !d.is_initialized() {
                    try_init(d);
                }
            })
            .await;
        let Some((device, ())) = init else {
            return self.fallback();
        };

        if !warmup.is_zero() {
            debug!("Warming up sensor for {:?}", warmup);
            tokio::time::sleep(warmup).await;
        }

        let Some((device, first)) = self.on_device(device, |d| d.read_one()).await else {
            return self.fallback();
        };
        match first {
            Ok(measurement) => return Ok(self.record(&measurement, provenance, persist)),
            Err(e) => warn!("Sensor read failed: {}. Reinitializing and retrying", e),
        }

        let retry = self
            .on_device(device, |d| {
                try_init(d);
                d.read_one()
            })
            .await;
        let Some((_device, retry)) = retry else {
            return self.fallback();
        };
        match retry {
            Ok(measurement) => Ok(self.record(&measurement, provenance, persist)),
            Err(e) => {
                warn!("Sensor retry failed: {}. Falling back to last logged reading", e);
                self.fallback()
            }
        }
    }

    /// Runs `op` on the blocking pool under `read_timeout`.
    ///
    /// `None` means the call overran or panicked. An overrunning call keeps
    /// the guard until it returns, so no other read can start meanwhile.
    async fn on_device<T, F>(&self, mut device: DeviceGuard, op: F) -> Option<(DeviceGuard, T)>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SensorDevice) -> T + Send + 'static,
    {
        let call = tokio::task::spawn_blocking(move || {
            let out = op(device.as_mut());
            (device, out)
        });
        match tokio::time::timeout(self.read_timeout, call).await {
            Ok(Ok(done)) => Some(done),
            Ok(Err(e)) => {
                warn!("Sensor call aborted: {}", e);
                None
            }
            Err(_) => {
                warn!("Sensor call exceeded {:?}", self.read_timeout);
                None
            }
        }
    }

    /// Opens a warmup window without blocking. Replaces any unfinished session.
    pub fn begin_sampling(&self, warmup: Duration, provenance: Provenance) {
        // Initialize opportunistically; a sample already in flight will do it
        match self.device.clone().try_lock_owned() {
            Ok(mut device) => {
                if !device.is_initialized() {
                    tokio::task::spawn_blocking(move || try_init(device.as_mut()));
                }
            }
            Err(_) => debug!("Sensor busy, deferring initialization to finish"),
        }

        let session = SamplingSession {
            deadline: Instant::now() + warmup,
            provenance,
        };
        let replaced = self.session.lock().unwrap().replace(session);
        if replaced.is_some() {
            debug!("Discarded unfinished sampling session");
        }
        debug!("Sampling session opened ({}, warmup {:?})", provenance, warmup);
    }

    /// True if no session is open or its warmup has elapsed.
    pub fn is_ready(&self) -> bool {
        match *self.session.lock().unwrap() {
            None => true,
            Some(session) => Instant::now() >= session.deadline,
        }
    }

    /// Returns the open session, if any.
    pub fn session(&self) -> Option<SamplingSession> {
        *self.session.lock().unwrap()
    }

    /// Completes the open session with an immediate sample.
    pub async fn finish_sampling(&self, persist: bool) -> Result<Reading, SamplingError> {
        let session = {
            let mut guard = self.session.lock().unwrap();
            let session = (*guard).ok_or(SamplingError::NoSession)?;
            let now = Instant::now();
            if now < session.deadline {
                return Err(SamplingError::WarmupNotComplete {
                    remaining: session.deadline - now,
                });
            }
            *guard = None;
            session
        };

        self.sample_blocking(Duration::ZERO, session.provenance, persist)
            .await
    }

    /// Most recent logged reading. Unreadable logs count as empty.
    pub fn last_logged(&self) -> Option<Reading> {
        self.log.last().unwrap_or_else(|e| {
            warn!("Failed to read last logged reading: {}", e);
            None
        })
    }

    fn record(&self, measurement: &Measurement, provenance: Provenance, persist: bool) -> Reading {
        let reading = Reading::from_measurement(measurement, provenance, now_local());
        if persist {
            // The measurement is still good if the disk is not
            if let Err(e) = self.log.append(&reading) {
                warn!("Failed to log reading: {}", e);
            }
        }
        reading
    }

    fn fallback(&self) -> Result<Reading, SamplingError> {
        let last = self.last_logged().ok_or(SamplingError::NoFallbackData)?;
        info!("Using fallback reading from {}", last.timestamp_iso());
        Ok(last.as_fallback(now_local()))
    }
}

/// Device unavailability is absorbed here; the next sample retries.
fn try_init(device: &mut dyn SensorDevice) {
    if let Err(e) = device.initialize() {
        warn!("Sensor {} unavailable: {}", device.name(), e);
    }
}
