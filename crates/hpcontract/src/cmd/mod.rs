use clap::{Args, Subcommand};
use std::path::PathBuf;

use hpcontract_runtime::{ClientProtocol, PATCH_CONFIG_PATH};

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod check_config;
pub mod echo;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the built-in echo contract against the host's descriptors.
    Echo(EchoArgs),
    /// Load and validate a patch config file.
    CheckConfig(CheckConfigArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::CheckConfig(args) => check_config::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Single-threaded runtime for one command.
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime startup failed", err))
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Serialization for user output.
    #[arg(long, default_value = "json")]
    pub protocol: ClientProtocol,
    /// Interrupt the process once every channel is closed.
    #[arg(long)]
    pub force_terminate: bool,
    /// Patch config file exposed to the contract.
    #[arg(long, value_name = "PATH", default_value = PATCH_CONFIG_PATH)]
    pub patch_config: PathBuf,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Patch config file to check.
    #[arg(default_value = PATCH_CONFIG_PATH)]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
