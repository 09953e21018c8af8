use std::sync::Arc;

use azure_provider::AzureProvider;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<AzureProvider>,
    pub config: AppConfig,
}
