//! Application state.

use std::sync::Arc;

use vconv_queue::{JobProducer, PipelineContext};

use crate::auth::IdentityValidator;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub context: PipelineContext,
    pub producer: JobProducer,
    pub validator: Arc<dyn IdentityValidator>,
}

impl AppState {
    pub fn new(config: ApiConfig, context: PipelineContext, validator: Arc<dyn IdentityValidator>) -> Self {
        Self {
            config,
            producer: JobProducer::new(context.clone()),
            context,
            validator,
        }
    }
}
