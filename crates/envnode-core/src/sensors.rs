//! Sensor abstraction
//!
//! The core only needs one thing from a sensor driver: a combined
//! temperature/humidity reading or an error. Drivers live in the firmware
//! and simulator crates.
//!
//! Drivers that have to await a conversion run in their own task and post
//! into a [`ReadingMailbox`]; the tick then reads the latest result without
//! waiting on the bus.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};

use crate::error::SensorError;

/// One temperature/humidity reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity, percent
    pub humidity: f32,
}

impl Reading {
    pub const fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Both channels hold an actual number.
    pub fn is_valid(&self) -> bool {
        !self.temperature.is_nan() && !self.humidity.is_nan()
    }
}

/// A sensor producing temperature and humidity.
///
/// `read` runs inside the cooperative tick and must return without waiting
/// on hardware.
pub trait ClimateSensor {
    /// Name used in log messages and errors.
    const NAME: &'static str;

    fn read(&mut self) -> Result<Reading, SensorError>;
}

impl<S: ClimateSensor> ClimateSensor for &mut S {
    const NAME: &'static str = S::NAME;

    fn read(&mut self) -> Result<Reading, SensorError> {
        (**self).read()
    }
}

type Posted = Option<(Instant, Result<Reading, SensorError>)>;

/// Latest result from a sensor task, handed to the tick.
pub struct ReadingMailbox {
    latest: Mutex<CriticalSectionRawMutex, Cell<Posted>>,
}

impl ReadingMailbox {
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(Cell::new(None)),
        }
    }

    /// Replace the latest result with one measured at `at`.
    pub fn post(&self, at: Instant, result: Result<Reading, SensorError>) {
        self.latest.lock(|latest| latest.set(Some((at, result))));
    }

    /// The latest result, if it was posted within `max_age` of `now`.
    ///
    /// Nothing posted yet, or only a stale result, reads as
    /// [`SensorError::NotAvailable`].
    pub fn latest(&self, now: Instant, max_age: Duration, sensor: &'static str) -> Result<Reading, SensorError> {
        match self.latest.lock(|latest| latest.get()) {
            Some((at, result)) if now.saturating_duration_since(at) <= max_age => result,
            _ => Err(SensorError::NotAvailable { sensor }),
        }
    }
}

impl Default for ReadingMailbox {
    fn default() -> Self {
        Self::new()
    }
}
