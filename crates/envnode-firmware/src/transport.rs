//! Upload transport and upload task pool
//!
//! Readings go out as a plain HTTP GET over an embassy-net TCP socket. Each
//! upload runs in its own task from a fixed pool, so at most
//! [`MAX_INFLIGHT_UPLOADS`] uploads are alive at once.

use core::net::Ipv4Addr;

use embassy_executor::Spawner;
use embassy_net::Stack;
use embassy_net::tcp::{self, ConnectError, TcpSocket};
use embassy_time::Duration;
use embedded_io_async::Write;
use envnode_core::config::{MAX_INFLIGHT_UPLOADS, UploadTarget};
use envnode_core::error::DispatchError;
use envnode_core::http::{parse_status_line, reading_request};
use envnode_core::status::UploadCounter;
use envnode_core::upload::{Transport, UploadJob, UploadSpawner, run_upload};
use thiserror_no_std::Error;

/// Idle timeout on the upload socket
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("upload host is not an IPv4 address")]
    InvalidHost,
    #[error("connect failed: {0:?}")]
    Connect(ConnectError),
    #[error("socket error: {0:?}")]
    Socket(tcp::Error),
    #[error("response has no status line")]
    BadResponse,
}

/// HTTP client for the collection endpoint
#[derive(Clone, Copy)]
pub struct HttpTransport {
    stack: Stack<'static>,
    target: UploadTarget<'static>,
}

impl HttpTransport {
    pub fn new(stack: Stack<'static>, target: UploadTarget<'static>) -> Self {
        Self { stack, target }
    }
}

impl Transport for HttpTransport {
    type Error = TransportError;

    async fn send_reading(&mut self, temperature: f32, humidity: f32) -> Result<u16, TransportError> {
        let address: Ipv4Addr = self
            .target
            .host
            .parse()
            .map_err(|_| TransportError::InvalidHost)?;

        let mut rx_buf = [0u8; 512];
        let mut tx_buf = [0u8; 512];
        let mut socket = TcpSocket::new(self.stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        socket
            .connect((address, self.target.port))
            .await
            .map_err(TransportError::Connect)?;

        let request = reading_request(self.target.host, self.target.path, temperature, humidity);
        socket
            .write_all(request.as_bytes())
            .await
            .map_err(TransportError::Socket)?;

        // Only the status line matters.
        let mut response = [0u8; 128];
        let mut len = 0;
        while len < response.len() {
            let n = socket
                .read(&mut response[len..])
                .await
                .map_err(TransportError::Socket)?;
            if n == 0 {
                break;
            }
            len += n;
            if response[..len].windows(2).any(|w| w == b"\r\n") {
                break;
            }
        }

        socket.close();
        parse_status_line(&response[..len]).ok_or(TransportError::BadResponse)
    }
}

#[embassy_executor::task(pool_size = MAX_INFLIGHT_UPLOADS)]
async fn upload_task(
    job: UploadJob,
    mut transport: HttpTransport,
    counter: UploadCounter<'static>,
    timeout: Duration,
) {
    let _ = run_upload(job, &mut transport, counter, timeout).await;
}

/// Starts uploads on the embassy executor
pub struct EmbassySpawner {
    spawner: Spawner,
    transport: HttpTransport,
    timeout: Duration,
}

impl EmbassySpawner {
    pub fn new(spawner: Spawner, transport: HttpTransport, timeout: Duration) -> Self {
        Self {
            spawner,
            transport,
            timeout,
        }
    }
}

impl UploadSpawner<'static> for EmbassySpawner {
    fn spawn_upload(
        &mut self,
        job: UploadJob,
        counter: UploadCounter<'static>,
    ) -> Result<(), DispatchError> {
        let token = upload_task(job, self.transport, counter, self.timeout)
            .map_err(|_| DispatchError::PoolExhausted)?;
        self.spawner.spawn(token);
        Ok(())
    }
}
