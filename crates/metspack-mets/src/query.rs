//! Structural accessors over a parsed manifest.
//!
//! Each accessor checks the substructure it relies on and reports a
//! [`MetsError::Validation`] naming what is missing rather than skipping it.

use tracing::warn;

use crate::{
    error::{MetsError, Result},
    model::*,
    xml::XmlElement,
};

const HANDLE_URN_PREFIX: &str = "hdl:";

pub fn encode_handle_urn(handle: &str) -> String {
    format!("{HANDLE_URN_PREFIX}{handle}")
}

/// Strips the `hdl:` scheme from an OBJID, returning `None` for other schemes.
pub fn decode_handle_urn(urn: &str) -> Option<&str> {
    urn.strip_prefix(HANDLE_URN_PREFIX).filter(|h| !h.is_empty())
}

/// Bundle name for a fileGrp `USE` value.
pub fn bundle_name_for_group(usage: &str) -> String {
    match usage {
        "CONTENT" => "ORIGINAL".to_string(),
        "MANIFESTMD" => "METADATA".to_string(),
        other => other.to_string(),
    }
}

/// fileGrp `USE` value for a bundle name.
pub fn file_group_for_bundle(bundle: &str) -> String {
    match bundle {
        "ORIGINAL" => "CONTENT".to_string(),
        other => other.to_string(),
    }
}

/// Any element that carries an `ID` in the manifest.
#[derive(Debug, Clone, Copy)]
pub enum MetsElementRef<'a> {
    Descriptive(&'a MdSection),
    Administrative(&'a AmdSection),
    AdminSubsection(AdminKind, &'a MdSection),
    FileGroup(&'a FileGroup),
    File(&'a FileEntry),
    StructMap(&'a StructMap),
    Div(&'a Div),
}

/// A content file with its resolved bundle and location.
#[derive(Debug, Clone, Copy)]
pub struct ContentFile<'a> {
    pub group: &'a FileGroup,
    pub bundle: &'a str,
    pub file: &'a FileEntry,
    pub href: &'a str,
}

impl ContentFile<'_> {
    pub fn bundle_name(&self) -> String {
        bundle_name_for_group(self.bundle)
    }
}

/// A child package pointer under the structural root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildReference<'a> {
    pub handle: Option<&'a str>,
    pub href: &'a str,
}

fn find_div<'a>(divs: &'a [Div], id: &str) -> Option<&'a Div> {
    divs.iter().find_map(|div| {
        if div.id.as_deref() == Some(id) {
            Some(div)
        } else {
            find_div(&div.children, id)
        }
    })
}

impl MetsDocument {
    /// First division of the first structure map.
    pub fn locate_structural_root(&self) -> Result<&Div> {
        self.struct_maps
            .first()
            .ok_or_else(|| MetsError::validation("manifest has no structMap"))?
            .divs
            .first()
            .ok_or_else(|| MetsError::validation("first structMap has no div"))
    }

    pub fn find_by_id(&self, id: &str) -> Option<MetsElementRef<'_>> {
        if let Some(dmd) = self.dmd_secs.iter().find(|s| s.id == id) {
            return Some(MetsElementRef::Descriptive(dmd));
        }
        for amd in &self.amd_secs {
            if amd.id == id {
                return Some(MetsElementRef::Administrative(amd));
            }
            if let Some((kind, section)) = amd.iter().find(|(_, s)| s.id == id) {
                return Some(MetsElementRef::AdminSubsection(kind, section));
            }
        }
        if let Some(file_sec) = &self.file_sec {
            for group in &file_sec.groups {
                if group.id.as_deref() == Some(id) {
                    return Some(MetsElementRef::FileGroup(group));
                }
                if let Some(file) = group.files.iter().find(|f| f.id.as_deref() == Some(id)) {
                    return Some(MetsElementRef::File(file));
                }
            }
        }
        for map in &self.struct_maps {
            if map.id.as_deref() == Some(id) {
                return Some(MetsElementRef::StructMap(map));
            }
            if let Some(div) = find_div(&map.divs, id) {
                return Some(MetsElementRef::Div(div));
            }
        }
        None
    }

    pub fn require_by_id(&self, id: &str) -> Result<MetsElementRef<'_>> {
        self.find_by_id(id).ok_or_else(|| {
            MetsError::validation(format!("no element with ID=\"{id}\" in manifest"))
        })
    }

    /// File groups, each required to carry `USE`.
    pub fn file_groups(&self) -> Result<Vec<&FileGroup>> {
        let Some(file_sec) = &self.file_sec else {
            return Ok(Vec::new());
        };
        file_sec
            .groups
            .iter()
            .map(|group| {
                if group.usage.is_none() {
                    return Err(MetsError::validation(format!(
                        "fileGrp {} is missing the USE attribute",
                        group.id.as_deref().unwrap_or("(no ID)")
                    )));
                }
                Ok(group)
            })
            .collect()
    }

    /// Every file with its single URL location.
    pub fn content_files(&self) -> Result<Vec<ContentFile<'_>>> {
        let mut out = Vec::new();
        for group in self.file_groups()? {
            let bundle = group.usage.as_deref().unwrap_or_default();
            for file in &group.files {
                let label = file.id.as_deref().unwrap_or("(no ID)");
                if file.has_inline_content && file.locations.is_empty() {
                    return Err(MetsError::validation(format!(
                        "file {label} carries inline FContent, only FLocat references are supported"
                    )));
                }
                let location = match file.locations.as_slice() {
                    [location] => location,
                    [] => {
                        return Err(MetsError::validation(format!(
                            "file {label} has no FLocat"
                        )))
                    }
                    _ => {
                        return Err(MetsError::validation(format!(
                            "file {label} has more than one FLocat"
                        )))
                    }
                };
                if !location
                    .loc_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(LOCTYPE_URL))
                {
                    return Err(MetsError::validation(format!(
                        "file {label} FLocat must have LOCTYPE=\"URL\""
                    )));
                }
                let href = location.href.as_deref().ok_or_else(|| {
                    MetsError::validation(format!("file {label} FLocat has no xlink:href"))
                })?;
                out.push(ContentFile {
                    group,
                    bundle,
                    file,
                    href,
                });
            }
        }
        Ok(out)
    }

    pub fn file_by_id(&self, id: &str) -> Option<&FileEntry> {
        self.file_sec
            .iter()
            .flat_map(|s| &s.groups)
            .flat_map(|g| &g.files)
            .find(|f| f.id.as_deref() == Some(id))
    }

    pub fn child_divisions(&self) -> Result<&[Div]> {
        Ok(&self.locate_structural_root()?.children)
    }

    /// URL manifest pointers of the structural root's children.
    pub fn child_package_references(&self) -> Result<Vec<ChildReference<'_>>> {
        Ok(self
            .child_divisions()?
            .iter()
            .filter_map(|div| {
                div.pointer(LOCTYPE_URL).map(|href| {
                    ChildReference {
                        handle: div.pointer(LOCTYPE_HANDLE),
                        href,
                    }
                })
            })
            .collect())
    }

    /// Handle of the owning parent, from the structMap labelled `Parent`.
    pub fn parent_pointer(&self) -> Result<Option<&str>> {
        let Some(map) = self
            .struct_maps
            .iter()
            .find(|m| m.label.as_deref() == Some(PARENT_STRUCT_MAP))
        else {
            return Ok(None);
        };
        let div = map
            .divs
            .first()
            .ok_or_else(|| MetsError::validation("Parent structMap has no div"))?;
        div.pointer(LOCTYPE_HANDLE)
            .map(Some)
            .ok_or_else(|| MetsError::validation("Parent structMap div has no HANDLE mptr"))
    }

    pub fn descriptive_section_ids(&self) -> Result<&[String]> {
        let root = self.locate_structural_root()?;
        if root.dmd_ids.is_empty() {
            return Err(MetsError::validation(
                "Missing reference to descriptive metadata on the structural root",
            ));
        }
        Ok(&root.dmd_ids)
    }

    pub fn admin_section_ids(&self) -> Result<&[String]> {
        Ok(&self.locate_structural_root()?.adm_ids)
    }

    pub fn dmd_section(&self, id: &str) -> Option<&MdSection> {
        self.dmd_secs.iter().find(|s| s.id == id)
    }

    pub fn amd_section(&self, id: &str) -> Option<&AmdSection> {
        self.amd_secs.iter().find(|s| s.id == id)
    }

    /// Subsections of `kind` referenced by `ids`, which may name whole
    /// `amdSec`s or individual subsections.
    pub fn admin_sections_of(&self, ids: &[String], kind: AdminKind) -> Result<Vec<&MdSection>> {
        let mut out = Vec::new();
        for id in ids {
            match self.require_by_id(id)? {
                MetsElementRef::Administrative(amd) => out.extend(amd.sections(kind)),
                MetsElementRef::AdminSubsection(found, section) => {
                    if found == kind {
                        out.push(section);
                    }
                }
                _ => {
                    return Err(MetsError::validation(format!(
                        "ADMID \"{id}\" does not refer to administrative metadata"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Descriptive sections referenced by `ids`.
    pub fn dmd_sections_of(&self, ids: &[String]) -> Result<Vec<&MdSection>> {
        ids.iter()
            .map(|id| {
                self.dmd_section(id).ok_or_else(|| {
                    MetsError::validation(format!("DMDID \"{id}\" has no matching dmdSec"))
                })
            })
            .collect()
    }

    /// Direct file pointer on the structural root (primary bitstream or logo).
    pub fn primary_file_id(&self) -> Result<Option<&str>> {
        Ok(self
            .locate_structural_root()?
            .fptrs
            .first()
            .map(String::as_str))
    }

    pub fn object_type_label(&self) -> Result<&str> {
        self.object_type
            .as_deref()
            .ok_or_else(|| MetsError::validation("mets root has no TYPE attribute"))
    }

    pub fn handle(&self) -> Option<&str> {
        self.objid.as_deref().and_then(decode_handle_urn)
    }

    /// The manifest's PROFILE must start with `expected`.
    pub fn check_profile(&self, expected: &str) -> Result<()> {
        let found = self.profile.as_deref().unwrap_or_default();
        if found.starts_with(expected) {
            Ok(())
        } else {
            Err(MetsError::ProfileMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    pub fn find_md_section_mut(&mut self, id: &str) -> Option<&mut MdSection> {
        if let Some(section) = self.dmd_secs.iter_mut().find(|s| s.id == id) {
            return Some(section);
        }
        for amd in &mut self.amd_secs {
            let found = AdminKind::ALL.into_iter().find_map(|kind| {
                amd.sections(kind)
                    .iter()
                    .position(|s| s.id == id)
                    .map(|i| (kind, i))
            });
            if let Some((kind, i)) = found {
                return Some(&mut amd.sections_mut(kind)[i]);
            }
        }
        None
    }
}

impl MdWrap {
    /// Wrapped content as XML, or `None` when it is not XML.
    pub fn xml(&self) -> Result<Option<Vec<XmlElement>>> {
        match &self.body {
            WrapBody::Xml(nodes) => Ok(Some(nodes.clone())),
            WrapBody::Binary(bytes) if self.mime_type.as_deref() == Some("text/xml") => {
                Ok(Some(XmlElement::parse_fragment(bytes)?))
            }
            WrapBody::Binary(_) => {
                warn!(
                    "ignoring non-XML {} content (MIMETYPE {:?}) requested as XML",
                    self.md_type.label(),
                    self.mime_type
                );
                Ok(None)
            }
        }
    }

    /// Wrapped content as raw bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match &self.body {
            WrapBody::Binary(bytes) => Ok(bytes.clone()),
            WrapBody::Xml(nodes) => {
                let mut out = Vec::new();
                for node in nodes {
                    out.extend(node.to_fragment()?);
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetsDocument {
        let xml = r#"<mets OBJID="hdl:123/7" TYPE="DSpace COLLECTION" PROFILE="DSpace METS AIP Profile 1.0 (extended)">
          <dmdSec ID="dmd_1"><mdWrap MDTYPE="DC" MIMETYPE="text/plain"><binData>aGVsbG8=</binData></mdWrap></dmdSec>
          <amdSec ID="amd_2">
            <techMD ID="tech_3"><mdWrap MDTYPE="PREMIS"><xmlData><premis/></xmlData></mdWrap></techMD>
            <rightsMD ID="rights_4"><mdWrap MDTYPE="METSRIGHTS"><xmlData><r/></xmlData></mdWrap></rightsMD>
          </amdSec>
          <fileSec>
            <fileGrp USE="LOGO"><file ID="logo_5"><FLocat LOCTYPE="URL" href="bitstream_9.png"/></file></fileGrp>
          </fileSec>
          <structMap LABEL="DSpace Object">
            <div ID="div_6" DMDID="dmd_1" ADMID="amd_2">
              <fptr FILEID="logo_5"/>
              <div ID="div_7"><mptr LOCTYPE="HANDLE" href="123/8"/><mptr LOCTYPE="URL" href="ITEM@123-8.zip"/></div>
              <div ID="div_8"><mptr LOCTYPE="HANDLE" href="123/9"/></div>
            </div>
          </structMap>
          <structMap LABEL="Parent"><div><mptr LOCTYPE="HANDLE" href="123/1"/></div></structMap>
        </mets>"#;
        MetsDocument::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_handle_urns() {
        assert_eq!(encode_handle_urn("123/4"), "hdl:123/4");
        assert_eq!(decode_handle_urn("hdl:123/4"), Some("123/4"));
        assert_eq!(decode_handle_urn("doi:10.1/x"), None);
        assert_eq!(decode_handle_urn("hdl:"), None);
        assert_eq!(sample().handle(), Some("123/7"));
    }

    #[test]
    fn test_bundle_name_mapping() {
        assert_eq!(bundle_name_for_group("CONTENT"), "ORIGINAL");
        assert_eq!(bundle_name_for_group("MANIFESTMD"), "METADATA");
        assert_eq!(bundle_name_for_group("THUMBNAIL"), "THUMBNAIL");
        assert_eq!(file_group_for_bundle("ORIGINAL"), "CONTENT");
        assert_eq!(file_group_for_bundle("TEXT"), "TEXT");
    }

    #[test]
    fn test_structural_accessors() {
        let doc = sample();
        assert_eq!(doc.locate_structural_root().unwrap().id.as_deref(), Some("div_6"));
        assert_eq!(doc.descriptive_section_ids().unwrap(), ["dmd_1"]);
        assert_eq!(doc.admin_section_ids().unwrap(), ["amd_2"]);
        assert_eq!(doc.primary_file_id().unwrap(), Some("logo_5"));
        assert_eq!(doc.parent_pointer().unwrap(), Some("123/1"));
        assert_eq!(doc.child_divisions().unwrap().len(), 2);
        assert_eq!(
            doc.child_package_references().unwrap(),
            [ChildReference {
                handle: Some("123/8"),
                href: "ITEM@123-8.zip"
            }]
        );
        assert_eq!(doc.content_files().unwrap()[0].href, "bitstream_9.png");
        assert_eq!(doc.content_files().unwrap()[0].bundle_name(), "LOGO");
    }

    #[test]
    fn test_find_by_id_kinds() {
        let doc = sample();
        assert!(matches!(doc.find_by_id("dmd_1"), Some(MetsElementRef::Descriptive(_))));
        assert!(matches!(
            doc.find_by_id("tech_3"),
            Some(MetsElementRef::AdminSubsection(AdminKind::Tech, _))
        ));
        assert!(matches!(doc.find_by_id("logo_5"), Some(MetsElementRef::File(_))));
        assert!(matches!(doc.find_by_id("div_7"), Some(MetsElementRef::Div(_))));
        assert!(doc.find_by_id("nope").is_none());
        assert!(doc.require_by_id("nope").is_err());
    }

    #[test]
    fn test_admin_sections_of_accepts_group_and_subsection_ids() {
        let doc = sample();
        let by_group = doc.admin_sections_of(&["amd_2".into()], AdminKind::Rights).unwrap();
        assert_eq!(by_group[0].id, "rights_4");

        let by_sub = doc.admin_sections_of(&["tech_3".into()], AdminKind::Tech).unwrap();
        assert_eq!(by_sub[0].id, "tech_3");
        assert!(doc.admin_sections_of(&["tech_3".into()], AdminKind::Rights).unwrap().is_empty());
        assert!(doc.admin_sections_of(&["dmd_1".into()], AdminKind::Tech).is_err());
    }

    #[test]
    fn test_profile_check_is_prefix_match() {
        let doc = sample();
        assert!(doc.check_profile("DSpace METS AIP Profile").is_ok());
        assert!(matches!(
            doc.check_profile("DSpace METS SIP Profile"),
            Err(MetsError::ProfileMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_structure_is_reported() {
        let doc = MetsDocument::parse(b"<mets/>").unwrap();
        assert!(doc.locate_structural_root().is_err());
        assert!(doc.object_type_label().is_err());
        assert!(doc.content_files().unwrap().is_empty());

        let no_dmd = MetsDocument::parse(b"<mets><structMap><div/></structMap></mets>").unwrap();
        let err = no_dmd.descriptive_section_ids().unwrap_err();
        assert!(err.to_string().contains("Missing reference to descriptive metadata"));
    }

    #[test]
    fn test_content_file_location_rules() {
        let inline = r#"<mets><fileSec><fileGrp USE="CONTENT"><file ID="f"><FContent/></file></fileGrp></fileSec></mets>"#;
        let err = MetsDocument::parse(inline.as_bytes()).unwrap().content_files().unwrap_err();
        assert!(err.to_string().contains("FContent"));

        let other_loc = r#"<mets><fileSec><fileGrp USE="CONTENT"><file ID="f"><FLocat LOCTYPE="HANDLE" href="1/2"/></file></fileGrp></fileSec></mets>"#;
        assert!(MetsDocument::parse(other_loc.as_bytes()).unwrap().content_files().is_err());

        let no_use = r#"<mets><fileSec><fileGrp><file ID="f"><FLocat LOCTYPE="URL" href="a"/></file></fileGrp></fileSec></mets>"#;
        let err = MetsDocument::parse(no_use.as_bytes()).unwrap().file_groups().unwrap_err();
        assert!(err.to_string().contains("USE"));
    }

    #[test]
    fn test_md_wrap_content_access() {
        let doc = sample();
        let MdContent::Wrap(dc) = &doc.dmd_secs[0].content else {
            panic!("expected mdWrap");
        };
        assert_eq!(dc.bytes().unwrap(), b"hello");
        assert!(dc.xml().unwrap().is_none());

        let MdContent::Wrap(premis) = &doc.amd_secs[0].tech_md[0].content else {
            panic!("expected mdWrap");
        };
        assert_eq!(premis.xml().unwrap().unwrap()[0].name, "premis");
    }

    #[test]
    fn test_find_md_section_mut_patches_reference() {
        let mut doc = sample();
        let section = doc.find_md_section_mut("rights_4").unwrap();
        section.group_id = Some("g".into());
        assert_eq!(doc.amd_secs[0].rights_md[0].group_id.as_deref(), Some("g"));
        assert!(doc.find_md_section_mut("dmd_1").is_some());
        assert!(doc.find_md_section_mut("div_6").is_none());
    }
}
