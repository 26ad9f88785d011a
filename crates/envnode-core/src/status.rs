//! Shared status record
//!
//! One [`StatusStore`] lives for the whole run of the node. Every field is an
//! independent cell behind a critical-section mutex, so readers on any
//! execution context see the last fully written value of each field without
//! any cross-field locking.
//!
//! Each field has exactly one writer. The store enforces this by handing out
//! write capabilities at most once:
//!
//! | Handle            | Writes                                              |
//! |-------------------|-----------------------------------------------------|
//! | [`SensorWriter`]  | current/last-logged readings, health, log timestamp |
//! | [`LinkWriter`]    | signal quality                                      |
//! | [`UploadCounter`] | upload count (increment only)                       |
//!
//! Everyone else gets a [`StatusView`].

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};
use serde::Serialize;

use crate::error::StatusError;
use crate::sensors::Reading;

/// A single scalar cell of the status record
struct Field<T> {
    cell: Mutex<CriticalSectionRawMutex, Cell<T>>,
}

impl<T: Copy> Field<T> {
    const fn new(value: T) -> Self {
        Self {
            cell: Mutex::new(Cell::new(value)),
        }
    }

    fn get(&self) -> T {
        self.cell.lock(|cell| cell.get())
    }

    fn set(&self, value: T) {
        self.cell.lock(|cell| cell.set(value));
    }

    /// Read-modify-write under one lock. Returns the new value.
    fn update(&self, f: impl FnOnce(T) -> T) -> T {
        self.cell.lock(|cell| {
            let value = f(cell.get());
            cell.set(value);
            value
        })
    }
}

/// Claims a write capability; `true` only for the first caller.
fn claim(flag: &Field<bool>) -> bool {
    let mut granted = false;
    flag.update(|taken| {
        granted = !taken;
        true
    });
    granted
}

/// The process-wide status record
pub struct StatusStore {
    boot: Instant,

    signal_quality: Field<i32>,
    sensor_healthy: Field<bool>,
    upload_count: Field<u32>,
    current_temperature: Field<f32>,
    current_humidity: Field<f32>,
    last_logged_temperature: Field<f32>,
    last_logged_humidity: Field<f32>,
    last_log_timestamp: Field<Option<Instant>>,

    sensor_claimed: Field<bool>,
    link_claimed: Field<bool>,
    upload_claimed: Field<bool>,
}

impl StatusStore {
    /// Create an empty record. `boot` is the reference for the derived uptime.
    pub const fn new(boot: Instant) -> Self {
        Self {
            boot,
            signal_quality: Field::new(0),
            sensor_healthy: Field::new(false),
            upload_count: Field::new(0),
            current_temperature: Field::new(0.0),
            current_humidity: Field::new(0.0),
            last_logged_temperature: Field::new(0.0),
            last_logged_humidity: Field::new(0.0),
            last_log_timestamp: Field::new(None),
            sensor_claimed: Field::new(false),
            link_claimed: Field::new(false),
            upload_claimed: Field::new(false),
        }
    }

    /// Read-only access; any number of views may exist.
    pub fn view(&self) -> StatusView<'_> {
        StatusView { store: self }
    }

    /// Write capability for the sampling fields. Granted once.
    pub fn sensor_writer(&self) -> Result<SensorWriter<'_>, StatusError> {
        if claim(&self.sensor_claimed) {
            Ok(SensorWriter { store: self })
        } else {
            Err(StatusError::WriterClaimed("sensor"))
        }
    }

    /// Write capability for the signal quality. Granted once.
    pub fn link_writer(&self) -> Result<LinkWriter<'_>, StatusError> {
        if claim(&self.link_claimed) {
            Ok(LinkWriter { store: self })
        } else {
            Err(StatusError::WriterClaimed("link"))
        }
    }

    /// Increment capability for the upload count. Granted once, but the
    /// handle itself is `Copy` so every upload task can carry one.
    pub fn upload_counter(&self) -> Result<UploadCounter<'_>, StatusError> {
        if claim(&self.upload_claimed) {
            Ok(UploadCounter { store: self })
        } else {
            Err(StatusError::WriterClaimed("upload"))
        }
    }
}

/// Read-only view of the status record
#[derive(Clone, Copy)]
pub struct StatusView<'a> {
    store: &'a StatusStore,
}

impl StatusView<'_> {
    pub fn signal_quality(&self) -> i32 {
        self.store.signal_quality.get()
    }

    pub fn sensor_healthy(&self) -> bool {
        self.store.sensor_healthy.get()
    }

    pub fn upload_count(&self) -> u32 {
        self.store.upload_count.get()
    }

    pub fn current_temperature(&self) -> f32 {
        self.store.current_temperature.get()
    }

    pub fn current_humidity(&self) -> f32 {
        self.store.current_humidity.get()
    }

    pub fn last_logged_temperature(&self) -> f32 {
        self.store.last_logged_temperature.get()
    }

    pub fn last_logged_humidity(&self) -> f32 {
        self.store.last_logged_humidity.get()
    }

    /// Time of the last window flush, `None` before the first one
    pub fn last_log_timestamp(&self) -> Option<Instant> {
        self.store.last_log_timestamp.get()
    }

    /// Time since the store was created
    pub fn uptime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.store.boot)
    }

    /// Copy every exposed field for the status query surface.
    ///
    /// Fields are read one at a time; the snapshot is per-field consistent,
    /// not a cross-field transaction.
    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        StatusSnapshot {
            current_temp: self.current_temperature(),
            current_hum: self.current_humidity(),
            last_logged_temp: self.last_logged_temperature(),
            last_logged_hum: self.last_logged_humidity(),
            tx_count: self.upload_count(),
            rssi: self.signal_quality(),
            uptime: self.uptime(now).as_millis(),
            sensor_healthy: self.sensor_healthy(),
        }
    }
}

/// Writer for the fields owned by the sample aggregator
pub struct SensorWriter<'a> {
    store: &'a StatusStore,
}

impl SensorWriter<'_> {
    /// Record a successful instantaneous reading.
    pub fn record_reading(&self, reading: Reading) {
        self.store.current_temperature.set(reading.temperature);
        self.store.current_humidity.set(reading.humidity);
        self.store.sensor_healthy.set(true);
    }

    /// Record a failed read. The last good reading stays visible.
    pub fn record_failure(&self) {
        self.store.sensor_healthy.set(false);
    }

    /// Publish a completed window average.
    pub fn publish_average(&self, average: Reading, at: Instant) {
        self.store.last_logged_temperature.set(average.temperature);
        self.store.last_logged_humidity.set(average.humidity);
        self.store.last_log_timestamp.set(Some(at));
    }
}

/// Writer for the field owned by the connectivity supervisor
pub struct LinkWriter<'a> {
    store: &'a StatusStore,
}

impl LinkWriter<'_> {
    pub fn set_signal_quality(&self, rssi: i32) {
        self.store.signal_quality.set(rssi);
    }
}

/// Increment-only handle on the upload count
#[derive(Clone, Copy)]
pub struct UploadCounter<'a> {
    store: &'a StatusStore,
}

impl UploadCounter<'_> {
    /// Count one confirmed upload and return the new total.
    ///
    /// Saturates instead of wrapping so the count never goes backwards.
    pub fn increment(&self) -> u32 {
        self.store
            .upload_count
            .update(|count| count.saturating_add(1))
    }
}

/// Serialized form of the status record for external consumers
///
/// Field names are part of the public contract of the `/metrics` endpoint.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub current_temp: f32,
    pub current_hum: f32,
    pub last_logged_temp: f32,
    pub last_logged_hum: f32,
    pub tx_count: u32,
    pub rssi: i32,
    /// Milliseconds since boot
    pub uptime: u64,
    pub sensor_healthy: bool,
}
