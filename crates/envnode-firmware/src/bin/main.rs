#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, StackResources};
use embassy_time::{Instant, Ticker};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::{MwdtStage, TimerGroup};
use log::info;
use static_cell::StaticCell;

// Display-LCD panel specific imports
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::spi::master::{Config, Spi};
use mipidsi::interface::SpiInterface;
use mipidsi::{Builder as MipidsiBuilder, models::ILI9342CRgb565};

use envnode_core::config::{IntervalSignal, NodeConfig, TICK_INTERVAL, WATCHDOG_TIMEOUT};
use envnode_core::scheduler::{Collaborators, Scheduler};
use envnode_core::sensors::ReadingMailbox;
use envnode_core::status::StatusStore;
use envnode_firmware::screen::LcdScreen;
use envnode_firmware::sensor::{SHT40Sensor, StagedSensor, sensor_task};
use envnode_firmware::server::http_server;
use envnode_firmware::settings::CONFIG;
use envnode_firmware::transport::{EmbassySpawner, HttpTransport};
use envnode_firmware::wifi::{WifiLink, net_task, wifi_task};

const DISPLAY_WIDTH: u16 = 320;
const DISPLAY_HEIGHT: u16 = 240;

/// DHCP socket, the status server and one socket per upload task
const NET_SOCKETS: usize = 8;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    // Once armed, the watchdog resets the node from here
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<NET_SOCKETS>> = StaticCell::new();
static STORE: StaticCell<StatusStore> = StaticCell::new();
static CONFIG_UPDATES: IntervalSignal = IntervalSignal::new();
static READINGS: ReadingMailbox = ReadingMailbox::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let boot = Instant::now();
    let store: &'static StatusStore = STORE.init(StatusStore::new(boot));
    let node_config = NodeConfig::default();

    // Network stack

    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(DhcpConfig::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner.spawn(net_task(runner).expect("net_task spawn"));
    spawner.spawn(wifi_task(wifi_controller, stack, CONFIG.internet).expect("wifi_task spawn"));
    spawner.spawn(http_server(stack, store.view(), &CONFIG_UPDATES).expect("http_server spawn"));

    // Sensor

    let i2c = I2c::new(peripherals.I2C0, I2cConfig::default())
        .expect("Failed to initialize I2C")
        .with_sda(peripherals.GPIO2)
        .with_scl(peripherals.GPIO1)
        .into_async();
    spawner.spawn(sensor_task(SHT40Sensor::new(i2c), &READINGS).expect("sensor_task spawn"));

    // Configure and initialize the display

    let spi_bus = Spi::new(peripherals.SPI2, Config::default())
        .expect("Failed to initialize SPI")
        .with_sck(peripherals.GPIO36)
        .with_mosi(peripherals.GPIO37);

    // No hardware CS on this panel
    let cs = Output::new(peripherals.GPIO35, Level::High, OutputConfig::default());
    let spi_device = ExclusiveDevice::new_no_delay(spi_bus, cs).expect("Failed to create SPI device");
    let dc = Output::new(peripherals.GPIO34, Level::Low, OutputConfig::default());

    // Larger = faster, uses more RAM
    let mut spi_buffer = [0u8; 64];
    let di = SpiInterface::new(spi_device, dc, &mut spi_buffer);

    let display = MipidsiBuilder::new(ILI9342CRgb565, di)
        .display_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .init(&mut embassy_time::Delay)
        .expect("Failed to initialize display");

    info!("Display initialized!");

    // Scheduler

    let transport = HttpTransport::new(stack, CONFIG.upload);
    let collaborators = Collaborators {
        sensor: StagedSensor::new(&READINGS),
        link: WifiLink,
        spawner: EmbassySpawner::new(spawner, transport, node_config.upload_timeout),
        display: LcdScreen::new(display),
    };
    let mut scheduler = Scheduler::new(store, collaborators, node_config, boot)
        .expect("Failed to build scheduler")
        .with_config_updates(&CONFIG_UPDATES);

    info!(
        "Uploading to {}:{}{}",
        CONFIG.upload.host, CONFIG.upload.port, CONFIG.upload.path
    );

    // Armed last so boot time does not count against it
    let mut watchdog = TimerGroup::new(peripherals.TIMG1).wdt;
    watchdog.set_timeout(
        MwdtStage::Stage0,
        esp_hal::time::Duration::from_millis(WATCHDOG_TIMEOUT.as_millis()),
    );
    watchdog.enable();
    info!("Watchdog armed ({} s)", WATCHDOG_TIMEOUT.as_secs());

    let mut ticker = Ticker::every(TICK_INTERVAL);
    loop {
        scheduler.tick(Instant::now());
        watchdog.feed();
        ticker.next().await;
    }
}
