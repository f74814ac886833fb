//! # roomlog-core
//!
//! Foundation types shared by the roomlog crates:
//!
//! - **Branded IDs**: [`RoomId`] and [`ClientId`] as newtypes over UUID v7 strings
//! - **Timestamps**: the fixed RFC 3339 encoding used for every persisted instant
//! - **Logging**: [`logging::init_subscriber`] and [`logging::init_logging`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod time;

pub use ids::{ClientId, RoomId};
pub use time::{format_timestamp, now_timestamp, parse_timestamp};
