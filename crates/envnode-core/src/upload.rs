//! Upload dispatch
//!
//! Once per tick the [`UploadDispatcher`] asks the aggregator for a ready
//! window average. If the link is up it moves an [`UploadJob`] into a new
//! detached task through an [`UploadSpawner`] and returns immediately; the
//! ready flag is already cleared at that point, regardless of how the upload
//! ends.
//!
//! Every upload task runs [`run_upload`]: one transmission attempt bounded by
//! a timeout, followed by a single increment of the upload count on success.
//! The task owns its job and drops it on every exit path.

use core::future::Future;

use embassy_time::{Duration, with_timeout};
use log::{error, info, warn};

use crate::error::{DispatchError, UploadError};
use crate::sampling::SampleAggregator;
use crate::sensors::{ClimateSensor, Reading};
use crate::status::UploadCounter;

/// Immutable snapshot of one window average, owned by exactly one upload task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadJob {
    pub temperature: f32,
    pub humidity: f32,
}

impl From<Reading> for UploadJob {
    fn from(reading: Reading) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}

/// Client able to deliver one reading to the collection endpoint
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Send one reading and return the HTTP status of the response.
    fn send_reading(
        &mut self,
        temperature: f32,
        humidity: f32,
    ) -> impl Future<Output = Result<u16, Self::Error>>;
}

/// Starts upload tasks on an execution context other than the tick loop
pub trait UploadSpawner<'a> {
    /// Move `job` into a new detached task that runs [`run_upload`].
    ///
    /// Must return without waiting for the upload.
    fn spawn_upload(&mut self, job: UploadJob, counter: UploadCounter<'a>) -> Result<(), DispatchError>;
}

/// What a single dispatcher poll did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchOutcome {
    /// No window average was pending
    Idle,
    /// An upload task now owns the job
    Dispatched(UploadJob),
    /// The link was down; the window average is lost
    Dropped(UploadJob),
    /// The task could not be started; the window average is lost
    Failed(DispatchError),
}

/// Hands ready averages to detached upload tasks
pub struct UploadDispatcher<'a, P> {
    spawner: P,
    counter: UploadCounter<'a>,
}

impl<'a, P: UploadSpawner<'a>> UploadDispatcher<'a, P> {
    pub fn new(spawner: P, counter: UploadCounter<'a>) -> Self {
        Self { spawner, counter }
    }

    pub fn poll<S: ClimateSensor>(
        &mut self,
        connected: bool,
        aggregator: &mut SampleAggregator<'_, S>,
    ) -> DispatchOutcome {
        let Some(average) = aggregator.consume_ready_result() else {
            return DispatchOutcome::Idle;
        };
        let job = UploadJob::from(average);

        if !connected {
            warn!(
                "Link down, dropping window average {} C, {} %",
                job.temperature, job.humidity
            );
            return DispatchOutcome::Dropped(job);
        }

        match self.spawner.spawn_upload(job, self.counter) {
            Ok(()) => {
                info!("Upload dispatched: {} C, {} %", job.temperature, job.humidity);
                DispatchOutcome::Dispatched(job)
            }
            Err(e) => {
                error!("Upload dispatch failed: {}", e);
                DispatchOutcome::Failed(e)
            }
        }
    }
}

/// Whether a response status confirms delivery.
///
/// Redirects count: script-hosted endpoints acknowledge with a 302.
/// Client and server errors (4xx/5xx) are not counted as delivered, even
/// though the server did answer.
pub fn status_accepted(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Body of an upload task.
///
/// Makes one attempt and, only if the server accepted the reading,
/// increments the upload count once. Returns the new count.
pub async fn run_upload<T: Transport>(
    job: UploadJob,
    transport: &mut T,
    counter: UploadCounter<'_>,
    timeout: Duration,
) -> Result<u32, UploadError> {
    let response = with_timeout(timeout, transport.send_reading(job.temperature, job.humidity)).await;

    match response {
        Ok(Ok(status)) if status_accepted(status) => {
            let total = counter.increment();
            info!("Upload accepted with status {} (total {})", status, total);
            Ok(total)
        }
        Ok(Ok(status)) => {
            warn!("Upload rejected with status {}", status);
            Err(UploadError::Rejected { status })
        }
        Ok(Err(e)) => {
            error!("Upload transport error: {:?}", e);
            Err(UploadError::Transport)
        }
        Err(_) => {
            warn!("Upload timed out after {} ms", timeout.as_millis());
            Err(UploadError::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::status::{StatusSnapshot, StatusStore};
    use alloc::vec::Vec;
    use embassy_futures::block_on;
    use embassy_time::Instant;

    struct ConstantSensor(Reading);

    impl ClimateSensor for ConstantSensor {
        const NAME: &'static str = "constant";

        fn read(&mut self) -> Result<Reading, SensorError> {
            Ok(self.0)
        }
    }

    /// Records jobs instead of running them.
    #[derive(Default)]
    struct RecordingSpawner {
        jobs: Vec<UploadJob>,
        refuse: bool,
    }

    impl<'a> UploadSpawner<'a> for &mut RecordingSpawner {
        fn spawn_upload(&mut self, job: UploadJob, _counter: UploadCounter<'a>) -> Result<(), DispatchError> {
            if self.refuse {
                return Err(DispatchError::PoolExhausted);
            }
            self.jobs.push(job);
            Ok(())
        }
    }

    enum Reply {
        Status(u16),
        Error,
        Hang,
    }

    struct FakeTransport {
        reply: Reply,
        sent: Vec<(f32, f32)>,
    }

    impl FakeTransport {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                sent: Vec::new(),
            }
        }
    }

    impl Transport for FakeTransport {
        type Error = &'static str;

        async fn send_reading(&mut self, temperature: f32, humidity: f32) -> Result<u16, Self::Error> {
            self.sent.push((temperature, humidity));
            match self.reply {
                Reply::Status(status) => Ok(status),
                Reply::Error => Err("connection refused"),
                Reply::Hang => core::future::pending().await,
            }
        }
    }

    fn flushed_aggregator<'a>(store: &'a StatusStore) -> SampleAggregator<'a, ConstantSensor> {
        let mut agg = SampleAggregator::new(
            ConstantSensor(Reading::new(21.0, 51.0)),
            store.sensor_writer().unwrap(),
            Duration::from_secs(30),
            Duration::from_secs(300),
            Instant::from_secs(0),
        );
        agg.sample_if_due(Instant::from_secs(0));
        agg.flush_if_due(Instant::from_secs(300));
        agg
    }

    #[test]
    fn test_idle_without_ready_result() {
        let store = StatusStore::new(Instant::from_secs(0));
        let mut spawner = RecordingSpawner::default();
        let mut dispatcher = UploadDispatcher::new(&mut spawner, store.upload_counter().unwrap());
        let mut agg = SampleAggregator::new(
            ConstantSensor(Reading::new(21.0, 51.0)),
            store.sensor_writer().unwrap(),
            Duration::from_secs(30),
            Duration::from_secs(300),
            Instant::from_secs(0),
        );

        assert_eq!(dispatcher.poll(true, &mut agg), DispatchOutcome::Idle);
        drop(dispatcher);
        assert!(spawner.jobs.is_empty());
    }

    #[test]
    fn test_dispatch_when_connected() {
        let store = StatusStore::new(Instant::from_secs(0));
        let mut spawner = RecordingSpawner::default();
        let mut dispatcher = UploadDispatcher::new(&mut spawner, store.upload_counter().unwrap());
        let mut agg = flushed_aggregator(&store);

        let job = UploadJob {
            temperature: 21.0,
            humidity: 51.0,
        };
        assert_eq!(dispatcher.poll(true, &mut agg), DispatchOutcome::Dispatched(job));
        // Ready flag is cleared at hand-off, not when the upload finishes.
        assert!(!agg.has_ready_result());
        assert_eq!(dispatcher.poll(true, &mut agg), DispatchOutcome::Idle);

        drop(dispatcher);
        assert_eq!(spawner.jobs, [job]);
        // Dispatching alone never counts as an upload.
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_drop_when_disconnected() {
        let store = StatusStore::new(Instant::from_secs(0));
        let mut spawner = RecordingSpawner::default();
        let mut dispatcher = UploadDispatcher::new(&mut spawner, store.upload_counter().unwrap());
        let mut agg = flushed_aggregator(&store);

        assert!(matches!(
            dispatcher.poll(false, &mut agg),
            DispatchOutcome::Dropped(_)
        ));
        // The dropped window is not retried once the link comes back.
        assert_eq!(dispatcher.poll(true, &mut agg), DispatchOutcome::Idle);

        drop(dispatcher);
        assert!(spawner.jobs.is_empty());
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_spawn_failure_is_absorbed() {
        let store = StatusStore::new(Instant::from_secs(0));
        let mut spawner = RecordingSpawner {
            jobs: Vec::new(),
            refuse: true,
        };
        let mut dispatcher = UploadDispatcher::new(&mut spawner, store.upload_counter().unwrap());
        let mut agg = flushed_aggregator(&store);

        assert_eq!(
            dispatcher.poll(true, &mut agg),
            DispatchOutcome::Failed(DispatchError::PoolExhausted)
        );
        assert!(!agg.has_ready_result());
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_status_accepted() {
        assert!(status_accepted(200));
        assert!(status_accepted(204));
        assert!(status_accepted(302));
        assert!(!status_accepted(0));
        assert!(!status_accepted(404));
        assert!(!status_accepted(500));
    }

    #[test]
    fn test_run_upload_success_increments_once() {
        let store = StatusStore::new(Instant::from_secs(0));
        let counter = store.upload_counter().unwrap();
        let mut transport = FakeTransport::new(Reply::Status(200));
        let job = UploadJob {
            temperature: 21.0,
            humidity: 51.0,
        };

        let result = block_on(run_upload(job, &mut transport, counter, Duration::from_secs(1)));

        assert_eq!(result, Ok(1));
        assert_eq!(transport.sent, [(21.0, 51.0)]);
        assert_eq!(store.view().upload_count(), 1);
    }

    #[test]
    fn test_run_upload_rejected_status() {
        let store = StatusStore::new(Instant::from_secs(0));
        let counter = store.upload_counter().unwrap();
        let mut transport = FakeTransport::new(Reply::Status(500));
        let job = UploadJob {
            temperature: 21.0,
            humidity: 51.0,
        };

        let result = block_on(run_upload(job, &mut transport, counter, Duration::from_secs(1)));

        assert_eq!(result, Err(UploadError::Rejected { status: 500 }));
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_run_upload_client_error_is_not_counted() {
        let store = StatusStore::new(Instant::from_secs(0));
        let counter = store.upload_counter().unwrap();
        let mut transport = FakeTransport::new(Reply::Status(404));
        let job = UploadJob {
            temperature: 21.0,
            humidity: 51.0,
        };

        let result = block_on(run_upload(job, &mut transport, counter, Duration::from_secs(1)));

        assert_eq!(result, Err(UploadError::Rejected { status: 404 }));
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_run_upload_transport_error() {
        let store = StatusStore::new(Instant::from_secs(0));
        let counter = store.upload_counter().unwrap();
        let mut transport = FakeTransport::new(Reply::Error);
        let job = UploadJob {
            temperature: 21.0,
            humidity: 51.0,
        };

        let result = block_on(run_upload(job, &mut transport, counter, Duration::from_secs(1)));

        assert_eq!(result, Err(UploadError::Transport));
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_run_upload_times_out() {
        let store = StatusStore::new(Instant::from_secs(0));
        let counter = store.upload_counter().unwrap();
        let mut transport = FakeTransport::new(Reply::Hang);
        let job = UploadJob {
            temperature: 21.0,
            humidity: 51.0,
        };

        let result = block_on(run_upload(job, &mut transport, counter, Duration::from_millis(20)));

        assert_eq!(result, Err(UploadError::TimedOut));
        assert_eq!(store.view().upload_count(), 0);
    }

    #[test]
    fn test_concurrent_uploads_only_touch_the_count() {
        extern crate std;
        use std::thread;

        let store = StatusStore::new(Instant::from_secs(0));
        store
            .sensor_writer()
            .unwrap()
            .publish_average(Reading::new(19.0, 44.0), Instant::from_secs(300));
        store.link_writer().unwrap().set_signal_quality(-70);
        let counter = store.upload_counter().unwrap();
        let before = store.view().snapshot(Instant::from_secs(400));

        thread::scope(|scope| {
            for i in 0..6u16 {
                scope.spawn(move || {
                    let status = if i % 2 == 0 { 200 } else { 503 };
                    let mut transport = FakeTransport::new(Reply::Status(status));
                    let job = UploadJob {
                        temperature: 19.0,
                        humidity: 44.0,
                    };
                    let _ = block_on(run_upload(job, &mut transport, counter, Duration::from_secs(1)));
                });
            }
        });

        let after = store.view().snapshot(Instant::from_secs(400));
        assert_eq!(after.tx_count, 3);
        assert_eq!(without_count(after), without_count(before));
    }

    fn without_count(mut snapshot: StatusSnapshot) -> StatusSnapshot {
        snapshot.tx_count = 0;
        snapshot
    }
}
