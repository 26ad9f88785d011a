//! Windowed averaging of sensor samples
//!
//! The [`SampleAggregator`] owns the sensor and all sampling-related fields
//! of the status record. It reads the sensor on a fixed cadence, accumulates
//! successful readings into an [`AggregationWindow`] and, once a window has
//! elapsed, publishes the average and parks it as a ready result for the
//! upload dispatcher.
//!
//! ## Window policy
//!
//! - Failed reads never enter the window.
//! - A window that expires without a single successful sample is extended:
//!   nothing is published, nothing is reset, and the next flush check fires
//!   as soon as one sample arrives.
//! - The accumulators are reset only by a successful flush.

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::error::SensorError;
use crate::sensors::{ClimateSensor, Reading};
use crate::status::SensorWriter;

/// Running sums of one averaging window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregationWindow {
    temperature_sum: f32,
    humidity_sum: f32,
    count: u32,
}

impl AggregationWindow {
    pub const fn new() -> Self {
        Self {
            temperature_sum: 0.0,
            humidity_sum: 0.0,
            count: 0,
        }
    }

    pub fn add(&mut self, reading: Reading) {
        self.temperature_sum += reading.temperature;
        self.humidity_sum += reading.humidity;
        self.count += 1;
    }

    /// Number of successful samples in the window
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the window, `None` while empty.
    pub fn average(&self) -> Option<Reading> {
        if self.is_empty() {
            return None;
        }

        let count = self.count as f32;
        Some(Reading::new(
            self.temperature_sum / count,
            self.humidity_sum / count,
        ))
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Samples the sensor and turns windows of samples into averages
pub struct SampleAggregator<'a, S> {
    sensor: S,
    writer: SensorWriter<'a>,
    window: AggregationWindow,
    sample_interval: Duration,
    window_interval: Duration,
    last_sample: Option<Instant>,
    last_flush: Instant,
    ready: Option<Reading>,
}

impl<'a, S: ClimateSensor> SampleAggregator<'a, S> {
    /// Create an aggregator whose first window starts at `started`.
    pub fn new(
        sensor: S,
        writer: SensorWriter<'a>,
        sample_interval: Duration,
        window_interval: Duration,
        started: Instant,
    ) -> Self {
        Self {
            sensor,
            writer,
            window: AggregationWindow::new(),
            sample_interval,
            window_interval,
            last_sample: None,
            last_flush: started,
            ready: None,
        }
    }

    /// Read the sensor if a sample is due.
    ///
    /// Returns `None` when nothing was due, otherwise the outcome of the read.
    /// The cadence advances on failures too so a dead sensor is not polled
    /// every tick.
    pub fn sample_if_due(&mut self, now: Instant) -> Option<Result<Reading, SensorError>> {
        let due = match self.last_sample {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.sample_interval,
        };
        if !due {
            return None;
        }
        self.last_sample = Some(now);

        let result = self.sensor.read().and_then(|reading| {
            if reading.is_valid() {
                Ok(reading)
            } else {
                Err(SensorError::NotANumber { sensor: S::NAME })
            }
        });

        match result {
            Ok(reading) => {
                self.writer.record_reading(reading);
                self.window.add(reading);
                debug!(
                    "Sample {}: {} C, {} % ({} in window)",
                    S::NAME,
                    reading.temperature,
                    reading.humidity,
                    self.window.count()
                );
            }
            Err(e) => {
                self.writer.record_failure();
                warn!("Failed to read from {}: {}", S::NAME, e);
            }
        }

        Some(result)
    }

    /// Close the window if it has elapsed and holds at least one sample.
    ///
    /// Returns the published average.
    pub fn flush_if_due(&mut self, now: Instant) -> Option<Reading> {
        if now.saturating_duration_since(self.last_flush) < self.window_interval {
            return None;
        }

        let Some(average) = self.window.average() else {
            debug!("Window elapsed without samples, extending");
            return None;
        };

        self.writer.publish_average(average, now);
        info!(
            "Window closed: {} samples, avg {} C, {} %",
            self.window.count(),
            average.temperature,
            average.humidity
        );

        self.ready = Some(average);
        self.window.reset();
        self.last_flush = now;

        Some(average)
    }

    /// Hand out the pending average. Yields each flushed result once.
    pub fn consume_ready_result(&mut self) -> Option<Reading> {
        self.ready.take()
    }

    /// Whether a flushed average is waiting to be consumed
    pub fn has_ready_result(&self) -> bool {
        self.ready.is_some()
    }

    /// Change the sampling cadence. Takes effect from the next due check.
    pub fn set_sample_interval(&mut self, interval: Duration) {
        info!(
            "Sample interval {} s -> {} s",
            self.sample_interval.as_secs(),
            interval.as_secs()
        );
        self.sample_interval = interval;
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Current state of the open window
    pub fn window(&self) -> &AggregationWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusStore;
    use alloc::collections::VecDeque;

    /// Replays a scripted sequence of reads.
    struct ScriptedSensor {
        script: VecDeque<Result<Reading, SensorError>>,
    }

    impl ScriptedSensor {
        fn new(script: &[Result<Reading, SensorError>]) -> Self {
            Self {
                script: script.iter().copied().collect(),
            }
        }
    }

    impl ClimateSensor for ScriptedSensor {
        const NAME: &'static str = "scripted";

        fn read(&mut self) -> Result<Reading, SensorError> {
            self.script
                .pop_front()
                .unwrap_or(Err(SensorError::NotAvailable { sensor: Self::NAME }))
        }
    }

    const FAIL: Result<Reading, SensorError> = Err(SensorError::NotAvailable { sensor: "scripted" });

    fn ok(temperature: f32, humidity: f32) -> Result<Reading, SensorError> {
        Ok(Reading::new(temperature, humidity))
    }

    fn secs(s: u64) -> Instant {
        Instant::from_secs(s)
    }

    fn aggregator<'a>(
        store: &'a StatusStore,
        script: &[Result<Reading, SensorError>],
    ) -> SampleAggregator<'a, ScriptedSensor> {
        SampleAggregator::new(
            ScriptedSensor::new(script),
            store.sensor_writer().unwrap(),
            Duration::from_secs(30),
            Duration::from_secs(300),
            secs(0),
        )
    }

    #[test]
    fn test_window_average() {
        let mut window = AggregationWindow::new();
        assert_eq!(window.average(), None);

        window.add(Reading::new(20.0, 50.0));
        window.add(Reading::new(22.0, 52.0));
        window.add(Reading::new(21.0, 51.0));
        assert_eq!(window.count(), 3);
        assert_eq!(window.average(), Some(Reading::new(21.0, 51.0)));

        window.reset();
        assert!(window.is_empty());
        assert_eq!(window, AggregationWindow::default());
    }

    #[test]
    fn test_first_call_samples_immediately() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0)]);

        assert_eq!(agg.sample_if_due(secs(0)), Some(ok(20.0, 50.0)));
        assert_eq!(store.view().current_temperature(), 20.0);
        assert!(store.view().sensor_healthy());
    }

    #[test]
    fn test_sampling_respects_interval() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0), ok(21.0, 51.0)]);

        assert!(agg.sample_if_due(secs(0)).is_some());
        assert!(agg.sample_if_due(secs(29)).is_none());
        assert!(agg.sample_if_due(secs(30)).is_some());
        assert_eq!(agg.window().count(), 2);
    }

    #[test]
    fn test_failed_reads_do_not_contribute() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(
            &store,
            &[ok(20.0, 50.0), FAIL, ok(f32::NAN, 50.0), ok(24.0, 54.0)],
        );

        for t in [0, 30, 60, 90] {
            agg.sample_if_due(secs(t));
        }
        assert_eq!(agg.window().count(), 2);

        assert_eq!(agg.flush_if_due(secs(300)), Some(Reading::new(22.0, 52.0)));
        assert_eq!(store.view().last_logged_temperature(), 22.0);
        assert_eq!(store.view().last_logged_humidity(), 52.0);
    }

    #[test]
    fn test_failure_clears_health_but_keeps_last_reading() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0), FAIL]);

        agg.sample_if_due(secs(0));
        let failed = agg.sample_if_due(secs(30));
        assert_eq!(failed, Some(FAIL));

        let view = store.view();
        assert!(!view.sensor_healthy());
        assert_eq!(view.current_temperature(), 20.0);
        assert_eq!(view.current_humidity(), 50.0);
    }

    #[test]
    fn test_nan_reading_is_a_failure() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(21.0, f32::NAN)]);

        assert_eq!(
            agg.sample_if_due(secs(0)),
            Some(Err(SensorError::NotANumber { sensor: "scripted" }))
        );
        assert!(agg.window().is_empty());
        assert!(!store.view().sensor_healthy());
    }

    #[test]
    fn test_empty_window_extends() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[FAIL, ok(25.0, 40.0)]);

        agg.sample_if_due(secs(0));
        assert_eq!(agg.flush_if_due(secs(300)), None);
        assert_eq!(store.view().last_log_timestamp(), None);
        assert!(!agg.has_ready_result());

        // First good sample after expiry closes the window right away.
        agg.sample_if_due(secs(310));
        assert_eq!(agg.flush_if_due(secs(310)), Some(Reading::new(25.0, 40.0)));
        assert_eq!(store.view().last_log_timestamp(), Some(secs(310)));
    }

    #[test]
    fn test_flush_not_due_keeps_sums() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0)]);

        agg.sample_if_due(secs(0));
        assert_eq!(agg.flush_if_due(secs(299)), None);
        assert_eq!(agg.window().count(), 1);
    }

    #[test]
    fn test_ready_result_consumed_once() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0)]);

        agg.sample_if_due(secs(0));
        agg.flush_if_due(secs(300));

        assert_eq!(agg.consume_ready_result(), Some(Reading::new(20.0, 50.0)));
        assert_eq!(agg.consume_ready_result(), None);
    }

    #[test]
    fn test_next_window_starts_at_flush_time() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0), ok(30.0, 60.0)]);

        agg.sample_if_due(secs(0));
        agg.flush_if_due(secs(320));
        agg.sample_if_due(secs(330));

        assert_eq!(agg.flush_if_due(secs(619)), None);
        assert_eq!(agg.flush_if_due(secs(620)), Some(Reading::new(30.0, 60.0)));
    }

    #[test]
    fn test_set_sample_interval() {
        let store = StatusStore::new(secs(0));
        let mut agg = aggregator(&store, &[ok(20.0, 50.0), ok(20.0, 50.0)]);

        agg.set_sample_interval(Duration::from_secs(60));
        agg.sample_if_due(secs(0));
        assert!(agg.sample_if_due(secs(30)).is_none());
        assert!(agg.sample_if_due(secs(60)).is_some());
    }
}
