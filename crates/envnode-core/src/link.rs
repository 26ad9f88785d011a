//! Connectivity supervision
//!
//! Polls the link layer every tick. While the link is down a reconnect is
//! requested on a fixed interval, forever; while it is up the signal quality
//! is republished into the status record.

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::status::LinkWriter;

/// Narrow view of the network interface
pub trait LinkLayer {
    fn is_connected(&self) -> bool;

    /// Link-quality metric, RSSI in dBm for Wi-Fi
    fn signal_quality(&self) -> i32;

    /// Start a (re)connection attempt. Must not block.
    fn request_reconnect(&mut self);
}

impl<L: LinkLayer> LinkLayer for &mut L {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn signal_quality(&self) -> i32 {
        (**self).signal_quality()
    }

    fn request_reconnect(&mut self) {
        (**self).request_reconnect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Tracks link state and drives reconnect attempts
pub struct ConnectivitySupervisor<'a, L> {
    link: L,
    writer: LinkWriter<'a>,
    state: LinkState,
    reconnect_interval: Duration,
    last_attempt: Option<Instant>,
}

impl<'a, L: LinkLayer> ConnectivitySupervisor<'a, L> {
    pub fn new(link: L, writer: LinkWriter<'a>, reconnect_interval: Duration) -> Self {
        Self {
            link,
            writer,
            state: LinkState::Disconnected,
            reconnect_interval,
            last_attempt: None,
        }
    }

    /// Refresh the link state and act on it. Returns the state after polling.
    pub fn maintain(&mut self, now: Instant) -> LinkState {
        let connected = self.link.is_connected();

        match (self.state, connected) {
            (LinkState::Disconnected, true) => {
                info!("Link up");
                self.state = LinkState::Connected;
            }
            (LinkState::Connected, false) => {
                warn!("Link lost");
                self.state = LinkState::Disconnected;
            }
            _ => {}
        }

        match self.state {
            LinkState::Connected => {
                self.writer.set_signal_quality(self.link.signal_quality());
            }
            LinkState::Disconnected => {
                let due = match self.last_attempt {
                    None => true,
                    Some(last) => now.saturating_duration_since(last) >= self.reconnect_interval,
                };
                if due {
                    debug!("Requesting reconnect");
                    self.link.request_reconnect();
                    self.last_attempt = Some(now);
                }
            }
        }

        self.state
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}
