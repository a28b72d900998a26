use std::sync::Arc;

use crate::config::Config;
use crate::cover_letter::generator::CoverLetterGenerator;
use crate::uploads::UploadStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Where résumés are staged while a request is in flight.
    pub uploads: UploadStore,
    /// Pluggable generator. Default: AssistantCoverLetterGenerator backed by the provider.
    pub generator: Arc<dyn CoverLetterGenerator>,
}

#[cfg(test)]
impl AppState {
    /// State for router tests: uploads land in `upload_dir`, no provider configured.
    pub fn for_tests(
        upload_dir: &std::path::Path,
        generator: Arc<dyn CoverLetterGenerator>,
    ) -> Self {
        let config = Config {
            openai_api_key: "test-api-key".to_string(),
            openai_base_url: crate::config::DEFAULT_OPENAI_BASE_URL.to_string(),
            upload_dir: upload_dir.to_path_buf(),
            port: 0,
            max_upload_bytes: 1024 * 1024,
            run_poll_interval_ms: 10,
            run_timeout_secs: 5,
            rust_log: "debug".to_string(),
        };
        Self {
            uploads: UploadStore::new(&config.upload_dir),
            config,
            generator,
        }
    }
}
