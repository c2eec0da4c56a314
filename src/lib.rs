//! Burgas Sensor Map server library
//!
//! Cache-aside aggregation layer for three upstream sensor feeds (air
//! quality, time-series air quality, traffic), republished as normalized
//! GeoJSON over a small HTTP API. Exposed as a library so integration
//! tests can drive the router directly.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod geo;
pub mod server;
pub mod service;
