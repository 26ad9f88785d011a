//! Status and config endpoints
//!
//! Routes a parsed request against the status record. The web surface only
//! ever reads the record; a config change is validated here and posted to
//! the scheduler, which is the one that applies it.

use embassy_time::Instant;
use log::{info, warn};

use crate::config::{IntervalSignal, parse_interval};
use crate::error::ConfigError;
use crate::http::{Method, Request, Response, form_value};
use crate::status::StatusView;

const LANDING_PAGE: &str = "<!DOCTYPE html><html><head><title>envnode</title></head>\
<body><p>Sensor node status is served at <a href=\"/metrics\">/metrics</a>.</p></body></html>";

/// Produce the response for one request.
pub fn handle(
    request: &Request<'_>,
    view: StatusView<'_>,
    now: Instant,
    config: &IntervalSignal,
) -> Response {
    match (request.method, request.path) {
        (Method::Get, "/") => Response::new(200, "text/html", LANDING_PAGE),
        (Method::Get, "/metrics") => metrics(view, now),
        (Method::Post, "/update_config") => update_config(request, config),
        (_, "/" | "/metrics" | "/update_config") => Response::text(405, "Method Not Allowed"),
        _ => Response::text(404, "Not Found"),
    }
}

fn metrics(view: StatusView<'_>, now: Instant) -> Response {
    match serde_json::to_string(&view.snapshot(now)) {
        Ok(json) => Response::new(200, "application/json", json),
        Err(e) => {
            warn!("Failed to serialize status: {}", e);
            Response::text(500, "Internal Server Error")
        }
    }
}

fn update_config(request: &Request<'_>, config: &IntervalSignal) -> Response {
    let raw = form_value(request.body, "interval").or_else(|| form_value(request.query, "interval"));
    let Some(raw) = raw else {
        return config_error(ConfigError::Missing);
    };

    match parse_interval(raw) {
        Ok(interval) => {
            info!("Config update accepted: interval {} s", interval.as_secs());
            config.signal(interval);
            Response::text(200, alloc::format!("Config updated: Interval set to {raw}"))
        }
        Err(e) => config_error(e),
    }
}

fn config_error(error: ConfigError) -> Response {
    warn!("Config update rejected: {}", error);
    let body = match error {
        ConfigError::Missing => "Error: Missing interval parameter",
        ConfigError::NotNumeric => "Error: Invalid numeric input",
        ConfigError::OutOfRange { .. } => "Error: Interval out of range (10-3600)",
    };
    Response::text(400, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parse_request;
    use crate::sensors::Reading;
    use crate::status::StatusStore;
    use embassy_time::Duration;

    fn respond(raw: &[u8], store: &StatusStore, config: &IntervalSignal) -> Response {
        let request = parse_request(raw).unwrap();
        handle(&request, store.view(), Instant::from_secs(90), config)
    }

    #[test]
    fn test_metrics_exposes_exact_fields() {
        let store = StatusStore::new(Instant::from_secs(0));
        store
            .sensor_writer()
            .unwrap()
            .record_reading(Reading::new(23.0, 45.5));
        let config = IntervalSignal::new();

        let response = respond(b"GET /metrics HTTP/1.1\r\n\r\n", &store, &config);
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/json");

        let value: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: alloc::vec::Vec<&str> = object.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "currentHum",
                "currentTemp",
                "lastLoggedHum",
                "lastLoggedTemp",
                "rssi",
                "sensorHealthy",
                "txCount",
                "uptime"
            ]
        );
        assert_eq!(object["currentTemp"], 23.0);
        assert_eq!(object["uptime"], 90_000);
        assert_eq!(object["sensorHealthy"], true);
    }

    #[test]
    fn test_update_config_accepts_valid_interval() {
        let store = StatusStore::new(Instant::from_secs(0));
        let config = IntervalSignal::new();

        let response = respond(
            b"POST /update_config HTTP/1.1\r\nContent-Length: 12\r\n\r\ninterval=120",
            &store,
            &config,
        );

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Config updated: Interval set to 120");
        assert_eq!(config.try_take(), Some(Duration::from_secs(120)));

        let response = respond(b"POST /update_config?interval=45 HTTP/1.1\r\n\r\n", &store, &config);
        assert_eq!(response.status, 200);
        assert_eq!(config.try_take(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_update_config_rejections() {
        let store = StatusStore::new(Instant::from_secs(0));
        let config = IntervalSignal::new();

        let cases: [(&[u8], &str); 3] = [
            (
                b"POST /update_config HTTP/1.1\r\n\r\ninterval=5",
                "Error: Interval out of range (10-3600)",
            ),
            (
                b"POST /update_config HTTP/1.1\r\n\r\ninterval=12a",
                "Error: Invalid numeric input",
            ),
            (
                b"POST /update_config HTTP/1.1\r\n\r\nperiod=60",
                "Error: Missing interval parameter",
            ),
        ];

        for (raw, expected) in cases {
            let response = respond(raw, &store, &config);
            assert_eq!(response.status, 400);
            assert_eq!(response.body, expected);
        }
        assert_eq!(config.try_take(), None);
    }

    #[test]
    fn test_unknown_routes() {
        let store = StatusStore::new(Instant::from_secs(0));
        let config = IntervalSignal::new();

        assert_eq!(respond(b"GET /nope HTTP/1.1\r\n\r\n", &store, &config).status, 404);
        assert_eq!(
            respond(b"GET /update_config HTTP/1.1\r\n\r\n", &store, &config).status,
            405
        );
        assert_eq!(respond(b"GET / HTTP/1.1\r\n\r\n", &store, &config).status, 200);
    }
}
