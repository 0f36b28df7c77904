use metspack_utils::error::{BytesError, FileSystemError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(metspack_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(metspack_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(metspack_config::already_exists),
        help("Remove the existing config file or point METSPACK_CONFIG elsewhere")
    )]
    ConfigAlreadyExists,

    #[error("Missing default packager: {0}")]
    #[diagnostic(
        code(metspack_config::missing_default_packager),
        help("Ensure default_packager names a table under [packager]")
    )]
    MissingDefaultPackager(String),

    #[error("Unknown packager: {0}")]
    #[diagnostic(
        code(metspack_config::missing_packager),
        help("Add a [packager.{0}] table or use one of the configured packagers")
    )]
    MissingPackager(String),

    #[error("Packager `{0}` has an empty METS profile string")]
    #[diagnostic(
        code(metspack_config::empty_profile),
        help("Set `profile` to the PROFILE attribute packages of this kind carry")
    )]
    EmptyProfile(String),

    #[error("Packager `{packager}` lists metadata type `{spec}` more than once")]
    #[diagnostic(code(metspack_config::duplicate_type_spec))]
    DuplicateTypeSpec { packager: String, spec: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(metspack_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(metspack_config::utils))]
    Utils(#[from] UtilsError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(metspack_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(metspack_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<BytesError> for ConfigError {
    fn from(err: BytesError) -> Self {
        Self::Utils(UtilsError::Bytes(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
