use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::{fmt, EnvFilter};

use shopweaver::application::config::EngineConfig;
use shopweaver::presentation::cli::commands::{
    HealthCommand, ImportCommand, InitDbCommand, SolveCommand,
};
use shopweaver::presentation::cli::{Cli, Commands};

fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("shopweaver=debug,info")
    } else {
        EnvFilter::new("shopweaver=info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = EngineConfig::from_env();

    match &cli.command {
        Commands::Solve {
            request,
            output,
            db,
            no_progress,
        } => SolveCommand::execute(
            request,
            output.as_ref(),
            db.as_ref().or(config.database_path.as_ref()),
            !no_progress,
            &config,
        )?,
        Commands::Import { input, db } => ImportCommand::execute(input, db, &config)?,
        Commands::Health { db } => {
            HealthCommand::execute(db.as_ref().or(config.database_path.as_ref()), &config)?
        }
        Commands::InitDb { db } => InitDbCommand::execute(db)?,
    }

    Ok(())
}
