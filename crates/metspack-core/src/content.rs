//! Interfaces to the repository that owns the objects being packaged.
//!
//! The engine never stores anything itself. It reads and writes objects
//! through [`ContentService`], resolves persistent identifiers through
//! [`IdentifierService`], and asks [`AuthorizationService`] before exposing
//! content.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::PackResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Site,
    Community,
    Collection,
    Item,
    Bundle,
    Bitstream,
}

const METS_TYPE_PREFIX: &str = "DSpace ";

impl ObjectType {
    pub fn label(self) -> &'static str {
        match self {
            ObjectType::Site => "SITE",
            ObjectType::Community => "COMMUNITY",
            ObjectType::Collection => "COLLECTION",
            ObjectType::Item => "ITEM",
            ObjectType::Bundle => "BUNDLE",
            ObjectType::Bitstream => "BITSTREAM",
        }
    }

    /// Value of the manifest's `TYPE` attribute.
    pub fn mets_type(self) -> String {
        format!("{METS_TYPE_PREFIX}{}", self.label())
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            ObjectType::Site,
            ObjectType::Community,
            ObjectType::Collection,
            ObjectType::Item,
            ObjectType::Bundle,
            ObjectType::Bitstream,
        ]
        .into_iter()
        .find(|t| t.label().eq_ignore_ascii_case(label))
    }

    /// Parses a manifest `TYPE`, with or without the `DSpace ` prefix.
    pub fn from_mets_type(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::from_label(value.strip_prefix(METS_TYPE_PREFIX).unwrap_or(value))
    }

    pub fn is_container(self) -> bool {
        matches!(self, ObjectType::Community | ObjectType::Collection)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One qualified Dublin-Core-style metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataValue {
    pub schema: String,
    pub element: String,
    pub qualifier: Option<String>,
    pub language: Option<String>,
    pub value: String,
}

impl MetadataValue {
    pub fn new(
        schema: impl Into<String>,
        element: impl Into<String>,
        qualifier: Option<&str>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            element: element.into(),
            qualifier: qualifier.map(str::to_string),
            language: None,
            value: value.into(),
        }
    }

    /// `schema.element[.qualifier]`
    pub fn field_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}.{}", self.schema, self.element, q),
            None => format!("{}.{}", self.schema, self.element),
        }
    }

    pub fn is_field(&self, schema: &str, element: &str, qualifier: Option<&str>) -> bool {
        self.schema == schema && self.element == element && self.qualifier.as_deref() == qualifier
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitstreamFormat {
    pub short_name: String,
    pub mime_type: String,
    pub extensions: Vec<String>,
}

impl BitstreamFormat {
    pub fn new(short_name: &str, mime_type: &str, extensions: &[&str]) -> Self {
        Self {
            short_name: short_name.to_string(),
            mime_type: mime_type.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn unknown() -> Self {
        Self::new("Unknown", "application/octet-stream", &[])
    }

    pub fn is_unknown(&self) -> bool {
        self.short_name == "Unknown"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstream {
    pub id: ObjectId,
    pub name: String,
    pub sequence_id: Option<u32>,
    pub size: u64,
    pub checksum: String,
    pub checksum_algorithm: String,
    pub format: BitstreamFormat,
    /// Original this bitstream was derived from (thumbnails, extracted text).
    pub derived_from: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub id: ObjectId,
    pub name: String,
    pub primary_bitstream: Option<ObjectId>,
}

/// How a newly ingested item leaves the submission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishMode {
    /// Install into the archive immediately.
    Install,
    /// Hand over to the collection's review workflow.
    Workflow,
    /// Reinstate an archived item as it was, bypassing workflow.
    Restore,
}

pub trait ContentService {
    fn object_type(&self, id: ObjectId) -> PackResult<ObjectType>;

    fn last_modified(&self, id: ObjectId) -> PackResult<DateTime<Utc>>;

    /// The repository root that top-level communities hang off.
    fn site_root(&self) -> PackResult<ObjectId>;

    /// Creates a community, collection or (in-progress) item owned by `parent`.
    fn create_object(&self, kind: ObjectType, parent: ObjectId) -> PackResult<ObjectId>;

    fn create_template_item(&self, collection: ObjectId) -> PackResult<ObjectId>;

    fn template_item(&self, collection: ObjectId) -> PackResult<Option<ObjectId>>;

    /// Deletes the template item of `collection`; returns false when it had none.
    fn remove_template_item(&self, collection: ObjectId) -> PackResult<bool>;

    /// Disseminable children: top communities of a site, sub-communities then
    /// collections of a community, owned and mapped items of a collection.
    fn children(&self, id: ObjectId) -> PackResult<Vec<ObjectId>>;

    /// Owning parent.
    fn parent(&self, id: ObjectId) -> PackResult<Option<ObjectId>>;

    /// Maps `item` into `collection`; returns false when it was already there.
    fn add_item_mapping(&self, collection: ObjectId, item: ObjectId) -> PackResult<bool>;

    fn metadata(&self, id: ObjectId) -> PackResult<Vec<MetadataValue>>;

    fn add_metadata(&self, id: ObjectId, value: MetadataValue) -> PackResult<()>;

    fn clear_metadata(&self, id: ObjectId) -> PackResult<()>;

    fn bundles(&self, item: ObjectId) -> PackResult<Vec<Bundle>>;

    fn create_bundle(&self, item: ObjectId, name: &str) -> PackResult<Bundle>;

    fn bitstreams(&self, bundle: ObjectId) -> PackResult<Vec<Bitstream>>;

    fn bitstream(&self, id: ObjectId) -> PackResult<Bitstream>;

    /// Stores `data` as a new bitstream; size and MD5 are computed from it.
    fn create_bitstream(&self, bundle: ObjectId, name: &str, data: Vec<u8>)
        -> PackResult<Bitstream>;

    fn update_bitstream(&self, bitstream: &Bitstream) -> PackResult<()>;

    fn retrieve(&self, bitstream: ObjectId) -> PackResult<Vec<u8>>;

    fn set_primary_bitstream(&self, bundle: ObjectId, bitstream: Option<ObjectId>)
        -> PackResult<()>;

    fn logo(&self, container: ObjectId) -> PackResult<Option<Bitstream>>;

    fn set_logo(&self, container: ObjectId, name: &str, data: Vec<u8>) -> PackResult<Bitstream>;

    /// Deletes every bundle and bitstream of an item, or the logo of a container.
    fn remove_all_content(&self, id: ObjectId) -> PackResult<()>;

    fn finish_item(&self, item: ObjectId, mode: FinishMode) -> PackResult<()>;

    /// Commits pending changes and bumps the modification time.
    fn update(&self, id: ObjectId) -> PackResult<()>;

    fn format_for_mime(&self, mime_type: &str) -> PackResult<Option<BitstreamFormat>>;

    fn format_for_filename(&self, name: &str) -> PackResult<Option<BitstreamFormat>>;

    fn format_by_short_name(&self, short_name: &str) -> PackResult<Option<BitstreamFormat>>;
}

pub trait IdentifierService {
    fn resolve(&self, handle: &str) -> PackResult<Option<ObjectId>>;

    fn handle_of(&self, id: ObjectId) -> PackResult<Option<String>>;

    /// Assigns `handle` to `id`, or mints a fresh one when `None`.
    ///
    /// Fails with [`PackError::ObjectExists`](crate::error::PackError::ObjectExists)
    /// when the handle belongs to a different object.
    fn register(&self, id: ObjectId, handle: Option<&str>) -> PackResult<String>;
}

pub trait AuthorizationService {
    /// Whether the current principal may read a bundle or bitstream.
    fn can_read(&self, id: ObjectId) -> PackResult<bool>;
}

/// The collaborators one packaging operation works against.
#[derive(Clone, Copy)]
pub struct PackagingContext<'a> {
    pub content: &'a dyn ContentService,
    pub identifiers: &'a dyn IdentifierService,
    pub authorization: &'a dyn AuthorizationService,
}

impl<'a> PackagingContext<'a> {
    pub fn from_repository<R>(repository: &'a R) -> Self
    where
        R: ContentService + IdentifierService + AuthorizationService,
    {
        Self {
            content: repository,
            identifiers: repository,
            authorization: repository,
        }
    }

    /// Name used in log messages: the handle when there is one.
    pub fn describe(&self, id: ObjectId) -> String {
        match self.identifiers.handle_of(id) {
            Ok(Some(handle)) => handle,
            _ => format!("internal id {id}"),
        }
    }
}
