//! Shared application state.

use std::sync::Arc;

use cerberus_core::Instance;

use crate::settings::Settings;

/// State shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub settings: Arc<Settings>,

    /// The Cerberus instance this gate screens against
    pub instance: Arc<Instance>,
}

impl AppState {
    pub fn new(settings: Settings, instance: Arc<Instance>) -> Self {
        Self {
            settings: Arc::new(settings),
            instance,
        }
    }
}
