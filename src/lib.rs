//! Core library for the rust_scan engine.
//!
//! This library moves a set of actuators through a planned sequence of
//! positions and, after every move, captures the first acquisition frame
//! recorded after the actuators settled. It is used by the `rust_scan`
//! binary and by anything that wants to drive a scan programmatically.
//!
//! - [`positioner`]: raster, zigzag and waypoint position sequences
//! - [`writer`]: puts setpoints and waits for convergence
//! - [`reader`]: synchronized (stream) and plain (channel) readers
//! - [`scan`]: the driver tying them together
//! - [`hardware`]: collaborator traits and in-memory mocks

pub mod config;
pub mod core;
pub mod error;
pub mod error_recovery;
pub mod hardware;
pub mod logging;
pub mod positioner;
pub mod reader;
pub mod scan;
pub mod writer;

pub use error::{AppResult, ConstructionError, ScanError};
