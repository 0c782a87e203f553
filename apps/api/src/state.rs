use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::applications::scraper::ScraperService;
use crate::config::Config;
use crate::documents::parser::DocumentParser;
use crate::jobs::queue::JobQueue;
use crate::llm_client::TextGenerator;

/// Shared application state injected into all route handlers via Axum extractors.
/// Workers run jobs against the same state.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    /// Pluggable text generator. Production: `LlmClient` (Gemini).
    pub llm: Arc<dyn TextGenerator>,
    pub config: Config,
    pub queue: Arc<dyn JobQueue>,
    pub parser: DocumentParser,
    pub scraper: ScraperService,
}

#[cfg(test)]
impl AppState {
    /// State whose pool, S3 client and scraper never dial out until used.
    pub fn for_tests(queue: Arc<dyn JobQueue>, llm: Arc<dyn TextGenerator>) -> Self {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
        use sqlx::postgres::PgPoolOptions;

        let config = Config::for_tests();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool from a well-formed URL");
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "trackly-test"))
            .endpoint_url(&config.s3_endpoint)
            .force_path_style(true)
            .build();

        AppState {
            db,
            s3: S3Client::from_conf(s3_config),
            llm,
            parser: DocumentParser::new(config.tesseract_bin.clone()),
            scraper: ScraperService::new(std::time::Duration::from_secs(config.scrape_timeout_secs))
                .expect("scraper client"),
            queue,
            config,
        }
    }
}
