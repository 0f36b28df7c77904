use std::{error::Error, fmt, path::PathBuf};

#[derive(Debug)]
pub enum BytesError {
    ParseFailed { input: String, reason: String },
}

impl fmt::Display for BytesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytesError::ParseFailed { input, reason } => {
                write!(f, "Cannot read `{input}` as a byte size: {reason}")
            }
        }
    }
}

impl Error for BytesError {}

#[derive(Debug)]
pub enum HashError {
    UnsupportedAlgorithm(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::UnsupportedAlgorithm(name) => {
                write!(f, "Checksum algorithm `{name}` is not supported")
            }
        }
    }
}

impl Error for HashError {}

#[derive(Debug)]
pub enum PathError {
    CurrentDir { source: std::io::Error },

    Empty,

    MissingEnvVar { var: String, input: String },

    UnclosedVariable { input: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::CurrentDir { source } => {
                write!(f, "Unable to determine the working directory: {source}")
            }
            PathError::Empty => write!(f, "Path is empty"),
            PathError::MissingEnvVar { var, input } => {
                write!(f, "`{input}` refers to unset environment variable `{var}`")
            }
            PathError::UnclosedVariable { input } => {
                write!(f, "Unterminated `${{` in `{input}`")
            }
        }
    }
}

impl Error for PathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PathError::CurrentDir { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum FileSystemError {
    File {
        path: PathBuf,
        action: &'static str,
        source: std::io::Error,
    },

    Directory {
        path: PathBuf,
        action: &'static str,
        source: std::io::Error,
    },

    NotADirectory {
        path: PathBuf,
    },
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::File {
                path,
                action,
                source,
            } => write!(f, "Failed to {action} file `{}`: {source}", path.display()),
            FileSystemError::Directory {
                path,
                action,
                source,
            } => {
                write!(
                    f,
                    "Failed to {action} directory `{}`: {source}",
                    path.display()
                )
            }
            FileSystemError::NotADirectory { path } => {
                write!(f, "`{}` exists and is not a directory", path.display())
            }
        }
    }
}

impl Error for FileSystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FileSystemError::File { source, .. } | FileSystemError::Directory { source, .. } => {
                Some(source)
            }
            FileSystemError::NotADirectory { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum UtilsError {
    Bytes(BytesError),
    FileSystem(FileSystemError),
    Hash(HashError),
    Path(PathError),
}

impl fmt::Display for UtilsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UtilsError::Bytes(err) => err.fmt(f),
            UtilsError::FileSystem(err) => err.fmt(f),
            UtilsError::Hash(err) => err.fmt(f),
            UtilsError::Path(err) => err.fmt(f),
        }
    }
}

impl Error for UtilsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            UtilsError::Bytes(err) => Some(err),
            UtilsError::FileSystem(err) => Some(err),
            UtilsError::Hash(err) => Some(err),
            UtilsError::Path(err) => Some(err),
        }
    }
}

impl From<BytesError> for UtilsError {
    fn from(err: BytesError) -> Self {
        UtilsError::Bytes(err)
    }
}

impl From<FileSystemError> for UtilsError {
    fn from(err: FileSystemError) -> Self {
        UtilsError::FileSystem(err)
    }
}

impl From<HashError> for UtilsError {
    fn from(err: HashError) -> Self {
        UtilsError::Hash(err)
    }
}

impl From<PathError> for UtilsError {
    fn from(err: PathError) -> Self {
        UtilsError::Path(err)
    }
}

pub type BytesResult<T> = std::result::Result<T, BytesError>;
pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
pub type HashResult<T> = std::result::Result<T, HashError>;
pub type PathResult<T> = std::result::Result<T, PathError>;

pub type UtilsResult<T> = std::result::Result<T, UtilsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_algorithm_has_no_source() {
        let err = HashError::UnsupportedAlgorithm("SHA-512".into());
        assert_eq!(err.to_string(), "Checksum algorithm `SHA-512` is not supported");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_path_error_messages() {
        let err = PathError::MissingEnvVar {
            var: "PKG_ROOT".into(),
            input: "$PKG_ROOT/aip".into(),
        };
        assert_eq!(
            err.to_string(),
            "`$PKG_ROOT/aip` refers to unset environment variable `PKG_ROOT`"
        );
        assert_eq!(
            PathError::UnclosedVariable {
                input: "${HOME".into()
            }
            .to_string(),
            "Unterminated `${` in `${HOME`"
        );
    }

    #[test]
    fn test_utils_error_wraps_and_forwards_display() {
        let inner = FileSystemError::NotADirectory {
            path: PathBuf::from("/tmp/out.zip"),
        };
        let message = inner.to_string();
        let err: UtilsError = inner.into();
        assert_eq!(err.to_string(), message);
        assert!(matches!(err, UtilsError::FileSystem(_)));
        assert!(err.source().is_some());
    }
}
