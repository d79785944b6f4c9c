pub mod handlers;
pub mod routes;
pub mod ws;

pub use routes::*;

use std::sync::Arc;

use crate::hub::Hub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}
