use crate::xml::XmlElement;

/// Name of the manifest entry at the root of a package archive.
pub const MANIFEST_FILE: &str = "mets.xml";

pub const METS_NS: &str = "http://www.loc.gov/METS/";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const METS_SCHEMA_LOCATION: &str =
    "http://www.loc.gov/METS/ http://www.loc.gov/standards/mets/mets.xsd";

/// `LABEL` of the optional structure map that points at the owning parent.
pub const PARENT_STRUCT_MAP: &str = "Parent";

pub const LOCTYPE_URL: &str = "URL";
pub const LOCTYPE_HANDLE: &str = "HANDLE";

/// MDTYPE values defined by the METS schema. Anything else is written as
/// `MDTYPE="OTHER"` with the label in `OTHERMDTYPE`.
const MDTYPE_VOCABULARY: &[&str] = &[
    "MARC",
    "MODS",
    "EAD",
    "DC",
    "NISOIMG",
    "LC-AV",
    "VRA",
    "TEIHDR",
    "DDI",
    "FGDC",
    "LOM",
    "PREMIS",
    "PREMIS:OBJECT",
    "PREMIS:AGENT",
    "PREMIS:RIGHTS",
    "PREMIS:EVENT",
    "TEXTMD",
    "METSRIGHTS",
    "ISO 19115:2003 NAP",
    "EAC-CPF",
    "LIDO",
];

/// The metadata type label of an `mdWrap`/`mdRef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MdType(String);

impl MdType {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn is_standard(&self) -> bool {
        MDTYPE_VOCABULARY.contains(&self.0.as_str())
    }

    /// `(MDTYPE, OTHERMDTYPE)` attribute values for this label.
    pub fn attribute_values(&self) -> (&str, Option<&str>) {
        if self.is_standard() {
            (&self.0, None)
        } else {
            ("OTHER", Some(&self.0))
        }
    }

    /// Reads the label back, resolving `OTHER` through `OTHERMDTYPE`.
    pub fn from_attributes(mdtype: Option<&str>, other: Option<&str>) -> Option<Self> {
        match (mdtype, other) {
            (Some("OTHER"), Some(other)) => Some(Self::new(other)),
            (Some(mdtype), _) => Some(Self::new(mdtype)),
            (None, Some(other)) => Some(Self::new(other)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetsDocument {
    pub id: Option<String>,
    pub objid: Option<String>,
    pub label: Option<String>,
    pub object_type: Option<String>,
    pub profile: Option<String>,
    pub header: Option<MetsHeader>,
    pub dmd_secs: Vec<MdSection>,
    pub amd_secs: Vec<AmdSection>,
    pub file_sec: Option<FileSection>,
    pub struct_maps: Vec<StructMap>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetsHeader {
    pub id: Option<String>,
    pub create_date: Option<String>,
    pub last_mod_date: Option<String>,
    pub agents: Vec<Agent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub role: String,
    pub agent_type: Option<String>,
    pub other_type: Option<String>,
    pub name: String,
}

/// A `dmdSec` or one of the `amdSec` subsections.
#[derive(Debug, Clone, PartialEq)]
pub struct MdSection {
    pub id: String,
    pub group_id: Option<String>,
    pub content: MdContent,
}

impl MdSection {
    pub fn md_type(&self) -> &MdType {
        match &self.content {
            MdContent::Wrap(wrap) => &wrap.md_type,
            MdContent::Ref(reference) => &reference.md_type,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match &self.content {
            MdContent::Wrap(wrap) => wrap.mime_type.as_deref(),
            MdContent::Ref(reference) => reference.mime_type.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MdContent {
    Wrap(MdWrap),
    Ref(MdRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdWrap {
    pub md_type: MdType,
    pub mime_type: Option<String>,
    pub label: Option<String>,
    pub body: WrapBody,
}

/// Payload of an `mdWrap`: `xmlData` children or decoded `binData` bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum WrapBody {
    Xml(Vec<XmlElement>),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdRef {
    pub md_type: MdType,
    pub mime_type: Option<String>,
    pub label: Option<String>,
    pub loc_type: String,
    pub href: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminKind {
    Tech,
    Rights,
    Source,
    DigiProv,
}

impl AdminKind {
    pub const ALL: [AdminKind; 4] = [
        AdminKind::Tech,
        AdminKind::Rights,
        AdminKind::Source,
        AdminKind::DigiProv,
    ];

    pub fn element_name(self) -> &'static str {
        match self {
            AdminKind::Tech => "techMD",
            AdminKind::Rights => "rightsMD",
            AdminKind::Source => "sourceMD",
            AdminKind::DigiProv => "digiprovMD",
        }
    }

    /// Prefix for generated section ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            AdminKind::Tech => "tech",
            AdminKind::Rights => "rights",
            AdminKind::Source => "source",
            AdminKind::DigiProv => "digiprov",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.element_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmdSection {
    pub id: String,
    pub tech_md: Vec<MdSection>,
    pub rights_md: Vec<MdSection>,
    pub source_md: Vec<MdSection>,
    pub digiprov_md: Vec<MdSection>,
}

impl AmdSection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tech_md: Vec::new(),
            rights_md: Vec::new(),
            source_md: Vec::new(),
            digiprov_md: Vec::new(),
        }
    }

    pub fn sections(&self, kind: AdminKind) -> &[MdSection] {
        match kind {
            AdminKind::Tech => &self.tech_md,
            AdminKind::Rights => &self.rights_md,
            AdminKind::Source => &self.source_md,
            AdminKind::DigiProv => &self.digiprov_md,
        }
    }

    pub fn sections_mut(&mut self, kind: AdminKind) -> &mut Vec<MdSection> {
        match kind {
            AdminKind::Tech => &mut self.tech_md,
            AdminKind::Rights => &mut self.rights_md,
            AdminKind::Source => &mut self.source_md,
            AdminKind::DigiProv => &mut self.digiprov_md,
        }
    }

    pub fn is_empty(&self) -> bool {
        AdminKind::ALL.iter().all(|k| self.sections(*k).is_empty())
    }

    /// Every subsection with its kind, in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (AdminKind, &MdSection)> {
        AdminKind::ALL
            .into_iter()
            .flat_map(move |kind| self.sections(kind).iter().map(move |s| (kind, s)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSection {
    pub groups: Vec<FileGroup>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileGroup {
    pub id: Option<String>,
    pub usage: Option<String>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEntry {
    pub id: Option<String>,
    pub seq: Option<u32>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub checksum_type: Option<String>,
    pub mime_type: Option<String>,
    pub group_id: Option<String>,
    pub adm_ids: Vec<String>,
    pub locations: Vec<FileLocation>,
    /// Set when the file carries an inline `FContent` element.
    pub has_inline_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileLocation {
    pub loc_type: Option<String>,
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructMap {
    pub id: Option<String>,
    pub map_type: Option<String>,
    pub label: Option<String>,
    pub divs: Vec<Div>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Div {
    pub id: Option<String>,
    pub div_type: Option<String>,
    pub label: Option<String>,
    pub dmd_ids: Vec<String>,
    pub adm_ids: Vec<String>,
    pub mptrs: Vec<Mptr>,
    pub fptrs: Vec<String>,
    pub children: Vec<Div>,
}

impl Div {
    /// `href` of the first pointer with the given `LOCTYPE`.
    pub fn pointer(&self, loc_type: &str) -> Option<&str> {
        self.mptrs
            .iter()
            .find(|m| m.loc_type.eq_ignore_ascii_case(loc_type))
            .map(|m| m.href.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mptr {
    pub loc_type: String,
    pub href: String,
}

impl Mptr {
    pub fn handle(handle: impl Into<String>) -> Self {
        Self {
            loc_type: LOCTYPE_HANDLE.to_string(),
            href: handle.into(),
        }
    }

    pub fn url(href: impl Into<String>) -> Self {
        Self {
            loc_type: LOCTYPE_URL.to_string(),
            href: href.into(),
        }
    }
}
