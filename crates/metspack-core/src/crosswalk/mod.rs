//! Metadata crosswalks and the registry that resolves them by name.
//!
//! A crosswalk turns an object into metadata and back. DOM crosswalks
//! produce and consume XML elements that are embedded in the manifest;
//! stream crosswalks produce and consume opaque bytes that travel either as
//! a separate archive entry or base64-encoded inside the manifest.

mod dim;
mod license;
mod premis;

use std::{collections::HashMap, sync::Arc};

use metspack_config::config::Config;
use metspack_mets::{MetsError, XmlElement};
use miette::Diagnostic;
use thiserror::Error;

pub use dim::{DimCrosswalk, DIM_NS};
pub(crate) use license::add_license;
pub use license::{LicenseCrosswalk, LICENSE_BUNDLE};
pub use premis::{PremisCrosswalk, PREMIS_NS};

use crate::{
    content::{ObjectId, ObjectType, PackagingContext},
    error::PackError,
};

#[derive(Error, Diagnostic, Debug)]
pub enum CrosswalkError {
    /// The crosswalk does not apply to this kind of object. Callers treat this
    /// as "no metadata of this type", not as a failure.
    #[error("object type not supported by this crosswalk")]
    #[diagnostic(code(metspack::crosswalk::not_supported))]
    NotSupported,

    #[error("{0}")]
    #[diagnostic(code(metspack::crosswalk::failed))]
    Failed(String),

    #[error(transparent)]
    #[diagnostic(code(metspack::crosswalk::service))]
    Service(Box<PackError>),

    #[error(transparent)]
    #[diagnostic(code(metspack::crosswalk::xml))]
    Xml(#[from] MetsError),
}

impl From<PackError> for CrosswalkError {
    fn from(err: PackError) -> Self {
        Self::Service(Box::new(err))
    }
}

pub type CrosswalkResult<T> = std::result::Result<T, CrosswalkError>;

/// Output of a stream crosswalk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStream {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub trait DomCrosswalk: Send + Sync {
    fn can_handle(&self, kind: ObjectType) -> bool;

    fn disseminate(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
    ) -> CrosswalkResult<Vec<XmlElement>>;

    fn ingest(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        metadata: &[XmlElement],
    ) -> CrosswalkResult<()>;
}

pub trait StreamCrosswalk: Send + Sync {
    fn can_handle(&self, kind: ObjectType) -> bool;

    fn disseminate(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
    ) -> CrosswalkResult<MetadataStream>;

    fn ingest(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> CrosswalkResult<()>;
}

/// A resolved crosswalk.
#[derive(Clone)]
pub enum Crosswalk {
    Dom(Arc<dyn DomCrosswalk>),
    Stream(Arc<dyn StreamCrosswalk>),
}

impl Crosswalk {
    pub fn can_handle(&self, kind: ObjectType) -> bool {
        match self {
            Crosswalk::Dom(xwalk) => xwalk.can_handle(kind),
            Crosswalk::Stream(xwalk) => xwalk.can_handle(kind),
        }
    }
}

/// Crosswalks keyed by name, plus MDTYPE aliases used on ingest.
///
/// Lookup tries DOM crosswalks before stream crosswalks of the same name.
#[derive(Clone, Default)]
pub struct CrosswalkRegistry {
    dom: HashMap<String, Arc<dyn DomCrosswalk>>,
    stream: HashMap<String, Arc<dyn StreamCrosswalk>>,
    aliases: HashMap<String, String>,
}

impl CrosswalkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `DIM`, `PREMIS` and `DSPACE_DEPLICENSE` crosswalks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_dom("DIM", Arc::new(DimCrosswalk));
        registry.register_dom("PREMIS", Arc::new(PremisCrosswalk));
        registry.register_stream("DSPACE_DEPLICENSE", Arc::new(LicenseCrosswalk));
        registry
    }

    /// Built-ins plus the configured ingest aliases.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::with_builtins();
        for (md_type, name) in config.crosswalk_aliases() {
            registry.add_alias(&md_type, &name);
        }
        registry
    }

    pub fn register_dom(&mut self, name: &str, crosswalk: Arc<dyn DomCrosswalk>) {
        self.dom.insert(name.to_string(), crosswalk);
    }

    pub fn register_stream(&mut self, name: &str, crosswalk: Arc<dyn StreamCrosswalk>) {
        self.stream.insert(name.to_string(), crosswalk);
    }

    pub fn add_alias(&mut self, md_type: &str, crosswalk: &str) {
        self.aliases
            .insert(md_type.to_string(), crosswalk.to_string());
    }

    pub fn get(&self, name: &str) -> Option<Crosswalk> {
        if let Some(dom) = self.dom.get(name) {
            return Some(Crosswalk::Dom(dom.clone()));
        }
        self.stream
            .get(name)
            .map(|stream| Crosswalk::Stream(stream.clone()))
    }

    /// Configured ingest crosswalk name for an MDTYPE label, if aliased.
    pub fn alias(&self, md_type: &str) -> Option<&str> {
        self.aliases.get(md_type).map(String::as_str)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .dom
            .keys()
            .chain(self.stream.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = CrosswalkRegistry::with_builtins();
        assert!(matches!(registry.get("DIM"), Some(Crosswalk::Dom(_))));
        assert!(matches!(registry.get("PREMIS"), Some(Crosswalk::Dom(_))));
        assert!(matches!(registry.get("DSPACE_DEPLICENSE"), Some(Crosswalk::Stream(_))));
        assert!(registry.get("MODS").is_none());
        assert_eq!(registry.names(), ["DIM", "DSPACE_DEPLICENSE", "PREMIS"]);
    }

    #[test]
    fn test_dom_wins_over_stream_of_same_name() {
        let mut registry = CrosswalkRegistry::new();
        registry.register_stream("DIM", Arc::new(LicenseCrosswalk));
        assert!(matches!(registry.get("DIM"), Some(Crosswalk::Stream(_))));
        registry.register_dom("DIM", Arc::new(DimCrosswalk));
        assert!(matches!(registry.get("DIM"), Some(Crosswalk::Dom(_))));
    }

    #[test]
    fn test_aliases_come_from_config() {
        let mut config = Config::default_config();
        config
            .crosswalk_aliases
            .get_or_insert_with(HashMap::new)
            .insert("DC".into(), "DIM".into());
        let registry = CrosswalkRegistry::from_config(&config);
        assert_eq!(registry.alias("DC"), Some("DIM"));
        assert_eq!(registry.alias("MODS"), None);
    }
}
