//! Forensic case manager
//!
//! A JSON case-record service with an offline-trained case-type classifier.
//! The trainer (`fcm-cli train`) reads every stored case, fits an encoding
//! pipeline plus a gradient-boosted tree ensemble and writes one artifact;
//! the server loads that artifact at startup and answers prediction and
//! feature-importance requests next to plain CRUD over the case store.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod seed;
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
