use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum MetsError {
    #[error("Invalid METS manifest: {0}")]
    #[diagnostic(
        code(metspack_mets::validation),
        help("The manifest is missing required structure or references elements that do not exist")
    )]
    Validation(String),

    #[error("Manifest profile `{found}` does not match expected profile `{expected}`")]
    #[diagnostic(
        code(metspack_mets::profile_mismatch),
        help("Use the packager that matches the package's PROFILE attribute")
    )]
    ProfileMismatch { expected: String, found: String },

    #[error("Malformed XML: {0}")]
    #[diagnostic(code(metspack_mets::xml))]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed XML attribute: {0}")]
    #[diagnostic(code(metspack_mets::xml_attribute))]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Manifest is not valid UTF-8")]
    #[diagnostic(code(metspack_mets::encoding))]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid base64 in binData: {0}")]
    #[diagnostic(code(metspack_mets::base64))]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    #[diagnostic(code(metspack_mets::io))]
    Io(#[from] std::io::Error),
}

impl MetsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MetsError>;
