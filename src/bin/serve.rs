use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use docqa::oracle::{JudgmentOracle, OpenAiClient};
use docqa::tokenize::BpeTokenCounter;
use docqa::{run_server, AppConfig, DocQaService};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;

    let oracle: Arc<dyn JudgmentOracle> = Arc::new(OpenAiClient::new(config.oracle.clone()));
    let counter = Arc::new(BpeTokenCounter::new()?);
    let service = DocQaService::new(config.clone(), oracle, counter);

    run_server(&config.bind_addr, config.qa_log_dir.clone(), service).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
