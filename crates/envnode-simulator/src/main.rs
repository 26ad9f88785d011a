//! Desktop simulator for the envnode sensor node.
//!
//! Runs the envnode-core scheduler against mock hardware so the sampling,
//! windowing, reconnect and upload paths can be exercised without a board:
//!
//! - a sensor producing a slow sinusoid with periodic bad reads
//! - a link that needs a few seconds to come up and drops now and then
//! - uploads on their own OS threads against a fake collection endpoint
//! - the status screen written to the log
//!
//! The real status/config endpoints are served on [`HTTP_ADDR`]. Intervals are
//! compressed so a window closes every 20 seconds.
//!
//! ```text
//! RUST_LOG=info cargo run -p envnode-simulator
//! curl http://127.0.0.1:8080/metrics
//! curl -X POST -d interval=10 http://127.0.0.1:8080/update_config
//! ```

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration as StdDuration, Instant as StdInstant};

use embassy_futures::block_on;
use embassy_time::{Duration, Instant, Timer};
use log::{debug, error, info, warn};
use static_cell::StaticCell;

use envnode_core::config::{IntervalSignal, MAX_INFLIGHT_UPLOADS, NodeConfig, TICK_INTERVAL};
use envnode_core::display::{ScreenFrame, StatusDisplay};
use envnode_core::error::{DispatchError, HttpError, SensorError};
use envnode_core::http::{Response, complete_length, parse_request};
use envnode_core::link::LinkLayer;
use envnode_core::scheduler::{Collaborators, Scheduler};
use envnode_core::sensors::{ClimateSensor, Reading};
use envnode_core::status::{StatusStore, StatusView, UploadCounter};
use envnode_core::upload::{Transport, UploadJob, UploadSpawner, run_upload};
use envnode_core::web;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Address of the status/config server.
const HTTP_ADDR: &str = "127.0.0.1:8080";

/// Largest request the status server accepts.
const REQUEST_BUFFER_SIZE: usize = 1024;

/// Every n-th sensor read returns a NaN humidity.
const SENSOR_DROPOUT_EVERY: u32 = 7;

/// Time between a reconnect request and the link coming up.
const CONNECT_DELAY: StdDuration = StdDuration::from_secs(3);

/// How long a link stays up before the simulator drops it.
const LINK_LIFETIME: StdDuration = StdDuration::from_secs(90);

/// Simulated round trip of one upload.
const UPLOAD_LATENCY: Duration = Duration::from_millis(400);

/// Every n-th upload is answered with a server error.
const UPLOAD_FAILURE_EVERY: u32 = 5;

static STORE: StaticCell<StatusStore> = StaticCell::new();
static CONFIG_UPDATES: IntervalSignal = IntervalSignal::new();

/// Node intervals, compressed so that windows close while you watch.
fn simulation_config() -> NodeConfig {
    NodeConfig {
        sample_interval: Duration::from_secs(2),
        window_interval: Duration::from_secs(20),
        reconnect_interval: Duration::from_secs(5),
        ..NodeConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Mock hardware
// ---------------------------------------------------------------------------

/// Generates synthetic readings that vary over time.
struct MockSensor {
    started: StdInstant,
    reads: u32,
}

impl MockSensor {
    fn new() -> Self {
        Self {
            started: StdInstant::now(),
            reads: 0,
        }
    }
}

impl ClimateSensor for MockSensor {
    const NAME: &'static str = "mock-sht40";

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.reads += 1;
        let t = self.started.elapsed().as_secs_f64();

        // Temperature: 20–26 °C, humidity: 40–60 %
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();
        let mut humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        if self.reads % SENSOR_DROPOUT_EVERY == 0 {
            humidity = f64::NAN;
        }

        Ok(Reading::new(temperature as f32, humidity as f32))
    }
}

/// A link that comes up [`CONNECT_DELAY`] after a reconnect request and goes
/// down again after [`LINK_LIFETIME`].
struct MockLink {
    attempt: Option<StdInstant>,
}

impl MockLink {
    fn new() -> Self {
        Self { attempt: None }
    }
}

impl LinkLayer for MockLink {
    fn is_connected(&self) -> bool {
        self.attempt.is_some_and(|attempt| {
            let elapsed = attempt.elapsed();
            elapsed >= CONNECT_DELAY && elapsed < CONNECT_DELAY + LINK_LIFETIME
        })
    }

    fn signal_quality(&self) -> i32 {
        let t = self
            .attempt
            .map(|attempt| attempt.elapsed().as_secs_f64())
            .unwrap_or_default();
        (-60.0 + 8.0 * (t / 15.0).sin()) as i32
    }

    fn request_reconnect(&mut self) {
        if self
            .attempt
            .is_some_and(|attempt| attempt.elapsed() < CONNECT_DELAY)
        {
            debug!("Reconnect already in progress");
            return;
        }
        info!("Simulated link: connecting");
        self.attempt = Some(StdInstant::now());
    }
}

/// Fake collection endpoint
struct MockTransport;

static UPLOAD_SEQUENCE: AtomicU32 = AtomicU32::new(0);

impl Transport for MockTransport {
    type Error = io::Error;

    async fn send_reading(&mut self, temperature: f32, humidity: f32) -> Result<u16, io::Error> {
        debug!(
            "Simulated GET ?temperature={:.2}&humidity={:.2}",
            temperature, humidity
        );
        Timer::after(UPLOAD_LATENCY).await;

        let sequence = UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
        if sequence % UPLOAD_FAILURE_EVERY == 0 {
            Ok(500)
        } else {
            Ok(302)
        }
    }
}

/// Runs every upload on its own OS thread, at most
/// [`MAX_INFLIGHT_UPLOADS`] at a time.
struct ThreadSpawner {
    in_flight: Arc<AtomicUsize>,
    timeout: Duration,
}

impl ThreadSpawner {
    fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            timeout,
        }
    }
}

impl UploadSpawner<'static> for ThreadSpawner {
    fn spawn_upload(
        &mut self,
        job: UploadJob,
        counter: UploadCounter<'static>,
    ) -> Result<(), DispatchError> {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) >= MAX_INFLIGHT_UPLOADS {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(DispatchError::PoolExhausted);
        }

        let in_flight = Arc::clone(&self.in_flight);
        let timeout = self.timeout;
        let spawned = thread::Builder::new()
            .name("upload".into())
            .spawn(move || {
                let _ = block_on(run_upload(job, &mut MockTransport, counter, timeout));
                in_flight.fetch_sub(1, Ordering::AcqRel);
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Failed to spawn upload thread: {}", e);
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(DispatchError::SpawnFailed("thread spawn failed"))
            }
        }
    }
}

/// Writes each status screen to the log.
struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&mut self, frame: &ScreenFrame) {
        debug!("[{}] {} | {}", frame.header, frame.main, frame.footer);
    }
}

// ---------------------------------------------------------------------------
// Status server
// ---------------------------------------------------------------------------

fn serve(listener: TcpListener, view: StatusView<'static>) {
    for stream in listener.incoming() {
        if let Err(e) = stream.and_then(|stream| handle_connection(stream, view)) {
            warn!("HTTP connection failed: {}", e);
        }
    }
}

fn handle_connection(mut stream: TcpStream, view: StatusView<'static>) -> io::Result<()> {
    stream.set_read_timeout(Some(StdDuration::from_secs(2)))?;

    let mut buf = [0u8; REQUEST_BUFFER_SIZE];
    let mut len = 0;
    let response = loop {
        match complete_length(&buf[..len], buf.len()) {
            Ok(Some(total)) => {
                break match parse_request(&buf[..total]) {
                    Ok(request) => {
                        debug!("{:?} {}", request.method, request.path);
                        web::handle(&request, view, Instant::now(), &CONFIG_UPDATES)
                    }
                    Err(e) => Response::text(400, e.to_string()),
                };
            }
            Ok(None) => {}
            Err(e @ HttpError::TooLarge { .. }) => break Response::text(413, e.to_string()),
            Err(e) => break Response::text(400, e.to_string()),
        }

        let n = stream.read(&mut buf[len..])?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        len += n;
    };

    stream.write_all(response.head().as_bytes())?;
    stream.write_all(response.body.as_bytes())?;
    stream.flush()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting envnode simulator");

    let config = simulation_config();
    info!(
        "Sample every {} s, window {} s, reconnect every {} s",
        config.sample_interval.as_secs(),
        config.window_interval.as_secs(),
        config.reconnect_interval.as_secs()
    );

    let boot = Instant::now();
    let store: &'static StatusStore = STORE.init(StatusStore::new(boot));

    match TcpListener::bind(HTTP_ADDR) {
        Ok(listener) => {
            info!("Status server on http://{}", HTTP_ADDR);
            let view = store.view();
            if let Err(e) = thread::Builder::new()
                .name("http".into())
                .spawn(move || serve(listener, view))
            {
                warn!("Failed to start status server: {}", e);
            }
        }
        Err(e) => warn!("Status server disabled, cannot bind {}: {}", HTTP_ADDR, e),
    }

    let collaborators = Collaborators {
        sensor: MockSensor::new(),
        link: MockLink::new(),
        spawner: ThreadSpawner::new(config.upload_timeout),
        display: LogDisplay,
    };
    let mut scheduler = match Scheduler::new(store, collaborators, config, boot) {
        Ok(scheduler) => scheduler.with_config_updates(&CONFIG_UPDATES),
        Err(e) => {
            error!("Failed to build scheduler: {}", e);
            return;
        }
    };

    let tick = StdDuration::from_millis(TICK_INTERVAL.as_millis());
    loop {
        scheduler.tick(Instant::now());
        thread::sleep(tick);
    }
}
