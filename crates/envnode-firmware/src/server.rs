//! Status and config server on port 80

use embassy_net::Stack;
use embassy_net::tcp::{self, TcpSocket};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write;
use envnode_core::config::IntervalSignal;
use envnode_core::error::HttpError;
use envnode_core::http::{Response, complete_length, parse_request};
use envnode_core::status::StatusView;
use envnode_core::web;
use log::{debug, info, warn};

const HTTP_PORT: u16 = 80;

/// Largest request the server accepts; config posts are tiny.
const REQUEST_BUFFER_SIZE: usize = 1024;

#[embassy_executor::task]
pub async fn http_server(
    stack: Stack<'static>,
    view: StatusView<'static>,
    config_updates: &'static IntervalSignal,
) {
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 1024];

    info!("HTTP server starting (port={})", HTTP_PORT);

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(Duration::from_secs(10)));

        match socket.accept(HTTP_PORT).await {
            Ok(()) => {
                if let Err(e) = handle_connection(&mut socket, view, config_updates).await {
                    warn!("HTTP connection error: {:?}", e);
                }
                socket.close();
                let _ = socket.flush().await;
            }
            Err(e) => {
                warn!("HTTP accept error: {:?}", e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }

        socket.abort();
    }
}

async fn handle_connection(
    socket: &mut TcpSocket<'_>,
    view: StatusView<'static>,
    config_updates: &'static IntervalSignal,
) -> Result<(), tcp::Error> {
    let mut buf = [0u8; REQUEST_BUFFER_SIZE];
    let mut len = 0;

    let response = loop {
        match complete_length(&buf[..len], buf.len()) {
            Ok(Some(total)) => {
                break match parse_request(&buf[..total]) {
                    Ok(request) => {
                        debug!("{:?} {}", request.method, request.path);
                        web::handle(&request, view, Instant::now(), config_updates)
                    }
                    Err(e) => Response::text(400, alloc::format!("{}", e)),
                };
            }
            Ok(None) => {}
            Err(e @ HttpError::TooLarge { .. }) => break Response::text(413, alloc::format!("{}", e)),
            Err(e) => break Response::text(400, alloc::format!("{}", e)),
        }

        let n = socket.read(&mut buf[len..]).await?;
        if n == 0 {
            return Ok(());
        }
        len += n;
    };

    socket.write_all(response.head().as_bytes()).await?;
    socket.write_all(response.body.as_bytes()).await?;
    socket.flush().await
}
