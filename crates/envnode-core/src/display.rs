//! Local status screen
//!
//! Produces the text of the rotating status screen. Where and how the lines
//! are drawn is up to the [`StatusDisplay`] implementation.

use core::fmt::Write;

use heapless::String;

use crate::status::StatusView;

/// Longest line a frame can hold
pub const LINE_CAPACITY: usize = 24;

pub type Line = String<LINE_CAPACITY>;

/// One rendered status screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenFrame {
    /// Connectivity, e.g. `WiFi OK (-61)`
    pub header: Line,
    /// The large reading, alternating between temperature and humidity
    pub main: Line,
    /// Upload count and sensor health
    pub footer: Line,
}

/// Sink for rendered frames
pub trait StatusDisplay {
    fn show(&mut self, frame: &ScreenFrame);
}

impl<D: StatusDisplay> StatusDisplay for &mut D {
    fn show(&mut self, frame: &ScreenFrame) {
        (**self).show(frame)
    }
}

/// Which reading the next frame puts on the main line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MainReading {
    Temperature,
    Humidity,
}

/// Builds frames, alternating the main reading on every render
pub struct StatusScreen {
    next: MainReading,
}

impl Default for StatusScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusScreen {
    pub const fn new() -> Self {
        Self {
            next: MainReading::Temperature,
        }
    }

    pub fn render(&mut self, view: &StatusView<'_>, connected: bool) -> ScreenFrame {
        let mut frame = ScreenFrame::default();

        // Writes can only fail on overflow; a clipped line is acceptable.
        if connected {
            let _ = write!(frame.header, "WiFi OK ({})", view.signal_quality());
        } else {
            let _ = frame.header.push_str("WiFi: Connecting...");
        }

        self.next = match self.next {
            MainReading::Temperature => {
                let _ = write!(frame.main, "{:.1} C", view.current_temperature());
                MainReading::Humidity
            }
            MainReading::Humidity => {
                let _ = write!(frame.main, "{:.1} %", view.current_humidity());
                MainReading::Temperature
            }
        };

        let _ = write!(frame.footer, "TX: {}", view.upload_count());
        if !view.sensor_healthy() {
            let _ = frame.footer.push_str(" ERR");
        }

        frame
    }
}
