//! Robot Speech Bridge Library Crate
//!
//! A small HTTP service that accepts text and relays it to the robot through an
//! external device-control process. The `bridge` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod forward;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
