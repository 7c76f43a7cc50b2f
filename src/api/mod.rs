pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::InferenceService;
use crate::state::CaseStore;
use std::sync::Arc;
use std::time::Instant;

/// Everything a request handler may touch, built once at startup
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn CaseStore>,
    pub inference: Arc<InferenceService>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(store: Arc<dyn CaseStore>, inference: InferenceService) -> Self {
        Self {
            store,
            inference: Arc::new(inference),
            started_at: Instant::now(),
        }
    }
}
