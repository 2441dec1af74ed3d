//! # locus-analyzer
//!
//! Constraint-based geolocation from one-way / round-trip latency samples.
//!
//! The analyzer tails an append-only JSONL measurement log produced by the
//! probe, keeps a rolling time window of per-endpoint RTT samples, and
//! derives from it: tail-aware statistics, calibrated RTTs, a weighted
//! grid-search location estimate with confidence bands, and per-endpoint
//! falsification checks against a claimed location. Everything is exposed
//! through one refreshable [`state::StateManager`] snapshot.

pub mod calib_job;
pub mod calibration;
pub mod claims;
pub mod config;
pub mod constants;
pub mod estimator;
pub mod geo;
pub mod log_tail;
pub mod reports;
pub mod state;
pub mod stats;
pub mod store;

pub use calib_job::CalibrationSupervisor;
pub use state::{StateManager, StateOptions};
