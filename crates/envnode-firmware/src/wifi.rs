//! Wi-Fi station management
//!
//! The radio is owned by [`wifi_task`]. The tick loop only sees a
//! [`WifiLink`], which reads the state the task publishes and posts reconnect
//! requests without waiting for them.

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use alloc::string::String;
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use envnode_core::config::InternetConfig;
use envnode_core::link::LinkLayer;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiError};
use log::{debug, info, warn};

/// Upper bound on association plus DHCP
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Link check and RSSI refresh cadence while associated
const LINK_POLL_INTERVAL: Duration = Duration::from_secs(2);

static LINK_UP: AtomicBool = AtomicBool::new(false);
static RSSI: AtomicI32 = AtomicI32::new(0);
static RECONNECT: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Non-blocking handle on the station state
pub struct WifiLink;

impl LinkLayer for WifiLink {
    fn is_connected(&self) -> bool {
        LINK_UP.load(Ordering::Acquire)
    }

    fn signal_quality(&self) -> i32 {
        RSSI.load(Ordering::Relaxed)
    }

    fn request_reconnect(&mut self) {
        RECONNECT.signal(());
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

/// Connects on request and watches the link until it drops.
#[embassy_executor::task]
pub async fn wifi_task(
    mut controller: WifiController<'static>,
    stack: Stack<'static>,
    credentials: InternetConfig<'static>,
) {
    info!("Wi-Fi task starting (ssid=\"{}\")", credentials.ssid);

    loop {
        RECONNECT.wait().await;

        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(String::from(credentials.ssid))
                    .with_password(String::from(credentials.password)),
            );
            if let Err(e) = controller.set_config(&client_config) {
                warn!("Wi-Fi set_config error: {:?}", e);
                continue;
            }
            if let Err(e) = controller.start_async().await {
                warn!("Wi-Fi start error: {:?}", e);
                continue;
            }
        }

        debug!("Connecting to \"{}\"", credentials.ssid);
        let connected = with_timeout(CONNECT_TIMEOUT, async {
            controller.connect_async().await?;
            stack.wait_config_up().await;
            Ok::<(), WifiError>(())
        })
        .await;

        match connected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Wi-Fi connect error: {:?}", e);
                continue;
            }
            Err(_) => {
                warn!("Wi-Fi connect timed out");
                let _ = controller.disconnect_async().await;
                continue;
            }
        }

        if let Some(config) = stack.config_v4() {
            info!("Wi-Fi link up: ip={}", config.address.address());
        }
        LINK_UP.store(true, Ordering::Release);

        while matches!(controller.is_connected(), Ok(true)) {
            if let Ok(rssi) = controller.rssi() {
                RSSI.store(i32::from(rssi), Ordering::Relaxed);
            }
            Timer::after(LINK_POLL_INTERVAL).await;
        }

        LINK_UP.store(false, Ordering::Release);
        warn!("Wi-Fi link lost");
    }
}
