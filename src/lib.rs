//! watch-hub
//!
//! A multiplexing hub that exposes live updates on remote watched
//! resources to many simultaneous browser sessions without each session
//! opening its own upstream streaming connection. One upstream watch per
//! unique resource selector; events fan out to every subscriber over a
//! push channel.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;

pub use config::Config;
pub use error::{AppError, HubError, Result, UpstreamError};
pub use hub::{Hub, HubConfig};
