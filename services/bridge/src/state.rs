//! Shared Application State

use crate::{config::Config, forward::Forwarder};
use std::sync::Arc;

/// Created once at startup and handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            forwarder: Arc::new(Forwarder::new(&config)),
            config: Arc::new(config),
        }
    }
}
