use std::fmt;
use std::io;

use hpcontract_runtime::{ConfigError, InitError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => FAILURE,
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn init_error(context: &str, err: InitError) -> CliError {
    match err {
        InitError::Interactive => CliError::new(USAGE, format!("{context}: {err}")),
        InitError::ReadArgs(source) => io_error(context, source),
        InitError::Args(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        InitError::Transport(_) | InitError::Channel(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        InitError::AlreadyInitialized => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Io(source) => io_error(context, source),
        ConfigError::NotFound(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}
