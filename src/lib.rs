pub mod advisory;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
mod error;
pub mod estimator;
pub mod history;
pub mod knowledge;
pub mod orchestrator;

pub use error::{
    AdvisoryError, ConfigError, HistoryError, KnowledgeError, RoofMateError, ValidationError,
};
pub use estimator::{CalculationRequest, CalculationResult, Estimator, Source};
pub use orchestrator::{Orchestrator, Strategy};

use clap::Parser;

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::context::AppContext;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        config,
        user,
        command,
    } = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let config = AppConfig::load(config.as_deref())?;
        let ctx = AppContext::from_config(config)?;
        let output = cli::execute(&ctx, &user, command).await?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok::<(), anyhow::Error>(())
    })
}
