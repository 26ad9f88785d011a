//! SHT40 driver task and the tick-side sensor that reads its results

use embassy_time::{Duration, Instant, Ticker};
use embedded_hal_async::i2c::I2c;
use envnode_core::error::SensorError;
use envnode_core::sensors::{ClimateSensor, Reading, ReadingMailbox};
use sht4x::Sht4xAsync;

/// How often the sensor task takes a measurement
const SENSOR_REFRESH: Duration = Duration::from_secs(2);

/// Older results are treated as a missing sensor
const MAX_READING_AGE: Duration = Duration::from_secs(6);

const SENSOR_NAME: &str = "SHT40";

pub type SensorBus = esp_hal::i2c::master::I2c<'static, esp_hal::Async>;

pub struct SHT40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

impl<I: I2c> SHT40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }

    pub async fn measure(&mut self) -> Result<Reading, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                log::error!("SHT40 measurement failed: {:?}", e);
                SensorError::Bus {
                    sensor: SENSOR_NAME,
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        Ok(Reading::new(
            measurement.temperature_celsius().to_num::<f32>(),
            measurement.humidity_percent().to_num::<f32>(),
        ))
    }
}

/// Measures every [`SENSOR_REFRESH`] and posts each result.
#[embassy_executor::task]
pub async fn sensor_task(mut sensor: SHT40Sensor<SensorBus>, mailbox: &'static ReadingMailbox) {
    let mut ticker = Ticker::every(SENSOR_REFRESH);
    loop {
        let result = sensor.measure().await;
        mailbox.post(Instant::now(), result);
        ticker.next().await;
    }
}

/// The tick's view of the SHT40: the latest result from [`sensor_task`].
pub struct StagedSensor {
    mailbox: &'static ReadingMailbox,
}

impl StagedSensor {
    pub const fn new(mailbox: &'static ReadingMailbox) -> Self {
        Self { mailbox }
    }
}

impl ClimateSensor for StagedSensor {
    const NAME: &'static str = SENSOR_NAME;

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.mailbox.latest(Instant::now(), MAX_READING_AGE, Self::NAME)
    }
}
