use anyhow::Result;
use clap::Parser;
use tracing::info;

mod config;
mod db;
mod error;
mod features;
mod model;

use config::{Config, Stage};
use db::Database;

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let mut db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match config.stage() {
        Stage::Features => {
            features::run(&config, &mut db)?;
        }
        Stage::Train => {
            model::run(&config, &db)?;
        }
        Stage::Predict => {
            model::predict(&config, &mut db)?;
        }
        Stage::Run => {
            features::run(&config, &mut db)?;
            model::run(&config, &db)?;
        }
    }

    info!("Stage {:?} complete", config.stage());
    Ok(())
}
