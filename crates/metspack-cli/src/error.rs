use metspack_config::error::ConfigError;
use metspack_core::PackError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to render JSON output")]
    #[diagnostic(code(metspack_cli::json))]
    Json(#[from] serde_json::Error),

    #[error("Error while {action}")]
    #[diagnostic(code(metspack_cli::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

pub type CliResult<T> = std::result::Result<T, CliError>;
