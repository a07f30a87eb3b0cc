//! Golden Prompt CLI entry point.

use clap::Parser;

use golden_prompt::cli::{commands, handle_error, Cli, Commands};
use golden_prompt::infrastructure::config::ConfigLoader;
use golden_prompt::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LogConfig::try_from(&config.logging)
        .map_err(anyhow::Error::from)
        .and_then(|log_config| LoggerImpl::init(&log_config))
    {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Optimize(args) => commands::optimize::execute(args, &config, cli.json).await,
        Commands::Predict(args) => commands::predict::execute(args, &config, cli.json).await,
        Commands::Config => commands::config::execute(&config, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
