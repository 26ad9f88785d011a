//! ESP32-S3 firmware-specific modules for envnode
//!
//! This crate contains the hardware side of the node that cannot compile on
//! desktop targets: the SHT40 driver binding, Wi-Fi station management, the
//! HTTP upload transport with its task pool, the status/config server, and
//! the LCD status screen.

#![no_std]

extern crate alloc;

pub mod screen;
pub mod sensor;
pub mod server;
pub mod settings;
pub mod transport;
pub mod wifi;
