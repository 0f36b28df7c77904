use std::path::PathBuf;

/// Events emitted while packages are written or read.
#[derive(Debug, Clone)]
pub enum PackEvent {
    /// A package is about to be written for an object.
    Disseminating {
        object_type: String,
        handle: Option<String>,
        path: PathBuf,
    },
    /// A package was written.
    Disseminated {
        object_type: String,
        handle: Option<String>,
        path: PathBuf,
        size: u64,
    },
    /// A package is about to be read.
    Ingesting { package: PathBuf },
    /// An object was created or overwritten from a package.
    Ingested {
        package: PathBuf,
        object_type: String,
        handle: Option<String>,
        replaced: bool,
    },
    /// A package or object was not processed.
    Skipped { package: PathBuf, reason: SkipReason },
    /// An already ingested item was mapped into another collection.
    Mapped {
        item_handle: Option<String>,
        collection_handle: Option<String>,
    },
    /// Content the caller may not read was left out or zero-filled.
    ContentWithheld {
        bitstream: String,
        action: WithheldAction,
    },
    /// Progress across a recursive run.
    BatchProgress { completed: u32, skipped: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The same package path was already produced during this run.
    AlreadyWritten,
    /// The object the package describes already exists.
    AlreadyExists { handle: String },
    /// The package's parent is not in the repository yet.
    ParentUnresolved { parent: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithheldAction {
    Skipped,
    ZeroFilled,
}
