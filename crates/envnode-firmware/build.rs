//! Bakes Wi-Fi credentials and the upload target into the firmware.
//!
//! Values come from a `.env` file next to this crate, or from the build
//! environment. See `src/settings.rs` for which ones are required.

const KEYS: [&str; 5] = [
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "UPLOAD_HOST",
    "UPLOAD_PORT",
    "UPLOAD_PATH",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // A missing .env is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
