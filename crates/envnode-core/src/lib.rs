//! Hardware-independent core library for envnode
//!
//! This crate contains all platform-agnostic logic for the envnode
//! temperature/humidity sensor node: the cooperative tick loop, windowed
//! sample averaging, connectivity supervision, upload dispatch, the shared
//! status record, and the status/config HTTP surface.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).
//! Hardware sits behind the [`sensors::ClimateSensor`], [`link::LinkLayer`],
//! [`upload::Transport`], [`upload::UploadSpawner`] and
//! [`display::StatusDisplay`] traits.

#![no_std]

extern crate alloc;

pub mod config;
pub mod display;
pub mod error;
pub mod http;
pub mod link;
pub mod sampling;
pub mod scheduler;
pub mod sensors;
pub mod status;
pub mod upload;
pub mod web;
