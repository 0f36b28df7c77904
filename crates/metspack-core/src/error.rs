//! Error types for metspack-core.

use miette::Diagnostic;
use metspack_config::error::ConfigError;
use metspack_mets::MetsError;
use metspack_utils::error::{FileSystemError, HashError, UtilsError};
use thiserror::Error;

use crate::crosswalk::CrosswalkError;

#[derive(Error, Diagnostic, Debug)]
pub enum PackError {
    #[error("Invalid package: {0}")]
    #[diagnostic(
        code(metspack::validation),
        help("The manifest is malformed or does not describe an object this packager can build")
    )]
    Validation(String),

    #[error("Package profile `{found}` does not match `{expected}`")]
    #[diagnostic(
        code(metspack::profile_mismatch),
        help("Use the packager whose profile matches the manifest's PROFILE attribute")
    )]
    ProfileMismatch { expected: String, found: String },

    #[error("Not authorized to read {0}")]
    #[diagnostic(
        code(metspack::authorization),
        help("Re-run with the unauthorized policy set to `skip` or `zero` to withhold the content instead")
    )]
    Authorization(String),

    #[error("Crosswalk `{name}` failed: {source}")]
    #[diagnostic(code(metspack::crosswalk))]
    Crosswalk {
        name: String,
        #[source]
        source: CrosswalkError,
    },

    #[error("Packaging misconfiguration: {0}")]
    #[diagnostic(
        code(metspack::configuration),
        help("Register the crosswalk or fix the metadata type list of the packager")
    )]
    Configuration(String),

    #[error("Error while {action}")]
    #[diagnostic(code(metspack::io), help("Check file permissions and disk space"))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(metspack::archive), help("The package is not a readable zip archive"))]
    Archive(#[from] zip::result::ZipError),

    #[error("Failed to fetch {url}")]
    #[diagnostic(
        code(metspack::network),
        help("Check the URL referenced by the manifest and your network connection")
    )]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Object with handle {0} already exists")]
    #[diagnostic(
        code(metspack::object_exists),
        help("Use replace mode to overwrite it, or keep-existing mode to skip it")
    )]
    ObjectExists(String),

    #[error("Object not found: {0}")]
    #[diagnostic(code(metspack::object_not_found))]
    ObjectNotFound(String),

    #[error("Cannot resolve parent object {0}")]
    #[diagnostic(
        code(metspack::parent_unresolved),
        help("Ingest the parent first, or supply a parent explicitly")
    )]
    ParentUnresolved(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mets(MetsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(metspack::utils))]
    Utils(#[from] UtilsError),
}

impl PackError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for conflicts that keep-existing mode may downgrade to a skip.
    pub fn is_object_exists(&self) -> bool {
        matches!(self, Self::ObjectExists(_))
    }
}

impl From<MetsError> for PackError {
    fn from(err: MetsError) -> Self {
        match err {
            MetsError::ProfileMismatch { expected, found } => {
                Self::ProfileMismatch { expected, found }
            }
            MetsError::Validation(message) => Self::Validation(message),
            other => Self::Mets(other),
        }
    }
}

impl From<FileSystemError> for PackError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(err.into())
    }
}

impl From<HashError> for PackError {
    fn from(err: HashError) -> Self {
        Self::Utils(err.into())
    }
}

/// Attaches the action being performed to an IO error.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> PackResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> PackResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            PackError::Io {
                action: context(),
                source: err,
            }
        })
    }
}

pub type PackResult<T> = std::result::Result<T, PackError>;
