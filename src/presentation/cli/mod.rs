pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shopweaver")]
#[command(author = "ShopWeaver Team")]
#[command(version = "0.1.0")]
#[command(about = "Resource-constrained production scheduling engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Solve a scheduling request and print the schedule")]
    Solve {
        #[arg(short, long, value_name = "FILE", help = "Solve request JSON file")]
        request: PathBuf,

        #[arg(short, long, value_name = "FILE", help = "Write the full response JSON here")]
        output: Option<PathBuf>,

        #[arg(long, value_name = "FILE", help = "SQLite database with the resource roster")]
        db: Option<PathBuf>,

        #[arg(long, help = "Disable the live incumbent progress bar")]
        no_progress: bool,
    },

    #[command(about = "Import jobs and tasks from a CSV file into the database")]
    Import {
        #[arg(short, long, value_name = "FILE", help = "Input CSV file")]
        input: PathBuf,

        #[arg(long, value_name = "FILE", default_value = "shopweaver.db", help = "SQLite database file")]
        db: PathBuf,
    },

    #[command(about = "Print the engine health report as JSON")]
    Health {
        #[arg(long, value_name = "FILE", help = "SQLite database file")]
        db: Option<PathBuf>,
    },

    #[command(about = "Create the database schema")]
    InitDb {
        #[arg(long, value_name = "FILE", default_value = "shopweaver.db", help = "SQLite database file")]
        db: PathBuf,
    },
}
