//! Cooperative tick loop
//!
//! [`Scheduler::tick`] runs every duty once, in a fixed order, using only
//! elapsed-time comparisons against the `now` it is given:
//!
//! 1. apply a pending config change
//! 2. network maintenance (so the upload check sees a fresh link state)
//! 3. sampling, then the window flush check
//! 4. upload check
//! 5. status screen refresh, on its own interval
//!
//! Nothing in a tick blocks; uploads run in detached tasks.

use embassy_time::{Duration, Instant};

use crate::config::{IntervalSignal, NodeConfig};
use crate::display::{StatusDisplay, StatusScreen};
use crate::error::StatusError;
use crate::link::{ConnectivitySupervisor, LinkLayer, LinkState};
use crate::sampling::SampleAggregator;
use crate::sensors::ClimateSensor;
use crate::status::{StatusStore, StatusView};
use crate::upload::{DispatchOutcome, UploadDispatcher, UploadSpawner};

/// The external collaborators a scheduler drives
pub struct Collaborators<S, L, P, D> {
    pub sensor: S,
    pub link: L,
    pub spawner: P,
    pub display: D,
}

/// What happened during one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub link: LinkState,
    pub sampled: bool,
    pub flushed: bool,
    pub dispatch: DispatchOutcome,
    pub refreshed_display: bool,
}

/// Owns every duty and runs them from a single execution context
pub struct Scheduler<'a, S, L, P, D> {
    view: StatusView<'a>,
    aggregator: SampleAggregator<'a, S>,
    supervisor: ConnectivitySupervisor<'a, L>,
    dispatcher: UploadDispatcher<'a, P>,
    display: D,
    screen: StatusScreen,
    display_interval: Duration,
    last_display: Option<Instant>,
    config_updates: Option<&'a IntervalSignal>,
}

impl<'a, S, L, P, D> Scheduler<'a, S, L, P, D>
where
    S: ClimateSensor,
    L: LinkLayer,
    P: UploadSpawner<'a>,
    D: StatusDisplay,
{
    /// Build every duty and claim its writer on `store`.
    ///
    /// Fails if a writer was already claimed, which means a second scheduler
    /// is being built on the same store.
    pub fn new(
        store: &'a StatusStore,
        collaborators: Collaborators<S, L, P, D>,
        config: NodeConfig,
        started: Instant,
    ) -> Result<Self, StatusError> {
        let Collaborators {
            sensor,
            link,
            spawner,
            display,
        } = collaborators;

        Ok(Self {
            view: store.view(),
            aggregator: SampleAggregator::new(
                sensor,
                store.sensor_writer()?,
                config.sample_interval,
                config.window_interval,
                started,
            ),
            supervisor: ConnectivitySupervisor::new(
                link,
                store.link_writer()?,
                config.reconnect_interval,
            ),
            dispatcher: UploadDispatcher::new(spawner, store.upload_counter()?),
            display,
            screen: StatusScreen::new(),
            display_interval: config.display_interval,
            last_display: None,
            config_updates: None,
        })
    }

    /// Accept interval changes posted by the config surface.
    pub fn with_config_updates(mut self, updates: &'a IntervalSignal) -> Self {
        self.config_updates = Some(updates);
        self
    }

    /// Run every duty that is due at `now`.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        if let Some(interval) = self.config_updates.and_then(|updates| updates.try_take()) {
            self.aggregator.set_sample_interval(interval);
        }

        let link = self.supervisor.maintain(now);

        let sampled = self.aggregator.sample_if_due(now).is_some();
        let flushed = self.aggregator.flush_if_due(now).is_some();

        let dispatch = self
            .dispatcher
            .poll(self.supervisor.is_connected(), &mut self.aggregator);

        let refreshed_display = self.refresh_display(now);

        TickReport {
            link,
            sampled,
            flushed,
            dispatch,
            refreshed_display,
        }
    }

    fn refresh_display(&mut self, now: Instant) -> bool {
        let due = match self.last_display {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.display_interval,
        };
        if !due {
            return false;
        }
        self.last_display = Some(now);

        let frame = self
            .screen
            .render(&self.view, self.supervisor.is_connected());
        self.display.show(&frame);
        true
    }

    pub fn view(&self) -> StatusView<'a> {
        self.view
    }

    pub fn aggregator(&self) -> &SampleAggregator<'a, S> {
        &self.aggregator
    }

    pub fn link_state(&self) -> LinkState {
        self.supervisor.state()
    }
}
