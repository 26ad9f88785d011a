//! Status screen on the LCD

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Text};
use envnode_core::display::{ScreenFrame, StatusDisplay};

/// Draws [`ScreenFrame`]s on any RGB565 draw target
pub struct LcdScreen<D> {
    target: D,
}

impl<D> LcdScreen<D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    pub fn new(target: D) -> Self {
        Self { target }
    }

    fn draw(&mut self, frame: &ScreenFrame) -> Result<(), D::Error> {
        let size = self.target.bounding_box().size;
        let center_x = (size.width / 2) as i32;

        let small = MonoTextStyle::new(&FONT_6X10, Rgb565::WHITE);
        let large = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);

        self.target.clear(Rgb565::BLACK)?;
        Text::with_alignment(&frame.header, Point::new(center_x, 16), small, Alignment::Center)
            .draw(&mut self.target)?;
        Text::with_alignment(
            &frame.main,
            Point::new(center_x, (size.height / 2) as i32),
            large,
            Alignment::Center,
        )
        .draw(&mut self.target)?;
        Text::with_alignment(
            &frame.footer,
            Point::new(center_x, size.height as i32 - 10),
            small,
            Alignment::Center,
        )
        .draw(&mut self.target)?;

        Ok(())
    }
}

impl<D> StatusDisplay for LcdScreen<D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    fn show(&mut self, frame: &ScreenFrame) {
        if let Err(e) = self.draw(frame) {
            log::warn!("Display draw failed: {:?}", e);
        }
    }
}
