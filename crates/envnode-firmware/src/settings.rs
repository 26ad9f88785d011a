//! Build-time settings baked in by `build.rs`

use envnode_core::config::{Config, InternetConfig, UploadTarget};

const DEFAULT_UPLOAD_PORT: u16 = 80;

/// Parse a decimal port number at compile time.
const fn parse_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw else {
        return DEFAULT_UPLOAD_PORT;
    };

    let bytes = raw.as_bytes();
    if bytes.is_empty() {
        return DEFAULT_UPLOAD_PORT;
    }

    let mut port: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if !digit.is_ascii_digit() {
            return DEFAULT_UPLOAD_PORT;
        }
        port = port * 10 + (digit - b'0') as u32;
        if port > u16::MAX as u32 {
            return DEFAULT_UPLOAD_PORT;
        }
        i += 1;
    }
    port as u16
}

pub const CONFIG: Config<'static> = Config {
    internet: InternetConfig {
        ssid: env!("WIFI_SSID"),
        password: env!("WIFI_PASSWORD"),
    },
    upload: UploadTarget {
        host: env!("UPLOAD_HOST"),
        port: parse_port(option_env!("UPLOAD_PORT")),
        path: match option_env!("UPLOAD_PATH") {
            Some(path) => path,
            None => "/",
        },
    },
};
