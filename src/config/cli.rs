use crate::domain::model::IdentificationStep;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "identhub-flow")]
#[command(about = "Inspect and maintain IdentHub identification flows")]
pub struct CliArgs {
    #[arg(long, short, default_value = "identhub.toml", global = true)]
    pub config: PathBuf,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List the modules a method needs and whether this build provides them
    Plan {
        #[arg(long)]
        first_step: IdentificationStep,

        #[arg(long)]
        fallback_step: Option<IdentificationStep>,
    },
    /// Ask the backend which identification method the session uses
    FetchMethod,
    /// Wipe every module's stored values and files
    ClearData,
}
