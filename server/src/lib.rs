//! # Campsite Server
//!
//! Bootstrapping for the two saga services:
//!
//! - [`config`]: environment configuration
//! - [`telemetry`]: tracing subscriber and Prometheus exporter
//! - [`app`]: wiring of stores, bus, consumer and relay per service
//!
//! The `availability-service` and `reservation-service` binaries connect to
//! `PostgreSQL` and Redpanda and run until SIGTERM.

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::{AvailabilityApp, ReservationApp};
pub use config::{Config, ConfigError};
