pub use error::{PackError, PackResult};

pub mod content;
pub mod crosswalk;
pub mod dispatch;
pub mod disseminate;
pub mod error;
pub mod http;
pub mod ingest;
pub mod memory;
pub mod package;
pub mod params;
pub mod profile;
pub mod recursive;

pub use content::{ObjectId, ObjectType, PackagingContext};
pub use disseminate::Disseminator;
pub use ingest::{IngestOutcome, Ingester};
pub use params::PackageParameters;
