//! METS manifest model for metspack.
//!
//! [`MetsDocument`] is the typed form of a manifest. It is read from and
//! written to XML by the `codec` module, queried through the structural
//! accessors in `query`, and checked for internal consistency by `validate`.

pub mod codec;
pub mod error;
pub mod ids;
pub mod model;
pub mod query;
pub mod validate;
pub mod xml;

pub use error::{MetsError, Result};
pub use ids::IdGenerator;
pub use model::*;
pub use query::{
    bundle_name_for_group, decode_handle_urn, encode_handle_urn, file_group_for_bundle,
    ChildReference, ContentFile, MetsElementRef,
};
pub use xml::{XmlElement, XmlNode};
