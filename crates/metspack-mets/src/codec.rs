//! Conversion between [`MetsDocument`] and its XML form.
//!
//! Reading is lenient about elements it does not model (they are dropped)
//! but strict about the attributes the model needs. Writing always binds the
//! METS namespace to the `mets:` prefix.

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::trace;

use crate::{
    error::{MetsError, Result},
    model::*,
    xml::XmlElement,
};

const HREF: &str = "xlink:href";

fn opt(el: &XmlElement, name: &str) -> Option<String> {
    el.attr(name).map(str::to_string)
}

fn required(el: &XmlElement, name: &str) -> Result<String> {
    el.attr(name).map(str::to_string).ok_or_else(|| {
        MetsError::validation(format!("<{}> is missing the {} attribute", el.name, name))
    })
}

fn id_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_number<T: std::str::FromStr>(el: &XmlElement, name: &str) -> Result<Option<T>> {
    match el.attr(name) {
        None => Ok(None),
        Some(raw) => {
            raw.trim().parse().map(Some).map_err(|_| {
                MetsError::validation(format!(
                    "<{}> has a non-numeric {} attribute: {:?}",
                    el.name, name, raw
                ))
            })
        }
    }
}

impl MetsDocument {
    /// Parses a serialized manifest.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let root = XmlElement::parse(bytes)?;
        Self::from_element(&root)
    }

    pub fn from_element(root: &XmlElement) -> Result<Self> {
        if !root.is("mets") {
            return Err(MetsError::validation(format!(
                "root element is <{}>, expected <mets>",
                root.name
            )));
        }

        let mut doc = MetsDocument {
            id: opt(root, "ID"),
            objid: opt(root, "OBJID"),
            label: opt(root, "LABEL"),
            object_type: opt(root, "TYPE"),
            profile: opt(root, "PROFILE"),
            ..Default::default()
        };

        for child in root.elements() {
            match child.local_name() {
                "metsHdr" => doc.header = Some(read_header(child)),
                "dmdSec" => doc.dmd_secs.push(read_md_section(child)?),
                "amdSec" => doc.amd_secs.push(read_amd_section(child)?),
                "fileSec" => doc.file_sec = Some(read_file_sec(child)?),
                "structMap" => doc.struct_maps.push(read_struct_map(child)?),
                other => trace!("ignoring <{}> under mets root", other),
            }
        }

        Ok(doc)
    }

    /// Pretty-printed document bytes.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        self.to_element().to_document()
    }

    pub fn to_element(&self) -> XmlElement {
        let mut root = XmlElement::new("mets:mets")
            .with_attr("xmlns:mets", METS_NS)
            .with_attr("xmlns:xlink", XLINK_NS)
            .with_attr("xmlns:xsi", XSI_NS)
            .with_attr("xsi:schemaLocation", METS_SCHEMA_LOCATION)
            .with_opt_attr("ID", self.id.as_deref())
            .with_opt_attr("OBJID", self.objid.as_deref())
            .with_opt_attr("LABEL", self.label.as_deref())
            .with_opt_attr("TYPE", self.object_type.as_deref())
            .with_opt_attr("PROFILE", self.profile.as_deref());

        if let Some(header) = &self.header {
            root.push(write_header(header));
        }
        for dmd in &self.dmd_secs {
            root.push(write_md_section("mets:dmdSec", dmd));
        }
        for amd in &self.amd_secs {
            root.push(write_amd_section(amd));
        }
        if let Some(file_sec) = &self.file_sec {
            root.push(write_file_sec(file_sec));
        }
        for map in &self.struct_maps {
            root.push(write_struct_map(map));
        }
        root
    }
}

fn read_header(el: &XmlElement) -> MetsHeader {
    MetsHeader {
        id: opt(el, "ID"),
        create_date: opt(el, "CREATEDATE"),
        last_mod_date: opt(el, "LASTMODDATE"),
        agents: el
            .children_named("agent")
            .map(|agent| {
                Agent {
                    role: opt(agent, "ROLE").unwrap_or_default(),
                    agent_type: opt(agent, "TYPE"),
                    other_type: opt(agent, "OTHERTYPE"),
                    name: agent.child("name").map(|n| n.text()).unwrap_or_default(),
                }
            })
            .collect(),
    }
}

fn write_header(header: &MetsHeader) -> XmlElement {
    let mut el = XmlElement::new("mets:metsHdr")
        .with_opt_attr("ID", header.id.as_deref())
        .with_opt_attr("CREATEDATE", header.create_date.as_deref())
        .with_opt_attr("LASTMODDATE", header.last_mod_date.as_deref());
    for agent in &header.agents {
        el.push(
            XmlElement::new("mets:agent")
                .with_attr("ROLE", agent.role.as_str())
                .with_opt_attr("TYPE", agent.agent_type.as_deref())
                .with_opt_attr("OTHERTYPE", agent.other_type.as_deref())
                .with_child(XmlElement::new("mets:name").with_text(agent.name.as_str())),
        );
    }
    el
}

fn read_md_type(el: &XmlElement) -> Result<MdType> {
    MdType::from_attributes(el.attr("MDTYPE"), el.attr("OTHERMDTYPE"))
        .ok_or_else(|| MetsError::validation(format!("<{}> has no MDTYPE", el.name)))
}

fn read_md_section(el: &XmlElement) -> Result<MdSection> {
    let id = required(el, "ID")?;
    let content = if let Some(wrap) = el.child("mdWrap") {
        let body = if let Some(xml) = wrap.child("xmlData") {
            WrapBody::Xml(xml.elements().cloned().collect())
        } else if let Some(bin) = wrap.child("binData") {
            let encoded: String = bin.text().split_whitespace().collect();
            WrapBody::Binary(STANDARD.decode(encoded)?)
        } else {
            return Err(MetsError::validation(format!(
                "mdWrap in section {id} has neither xmlData nor binData"
            )));
        };
        MdContent::Wrap(MdWrap {
            md_type: read_md_type(wrap)?,
            mime_type: opt(wrap, "MIMETYPE"),
            label: opt(wrap, "LABEL"),
            body,
        })
    } else if let Some(reference) = el.child("mdRef") {
        MdContent::Ref(MdRef {
            md_type: read_md_type(reference)?,
            mime_type: opt(reference, "MIMETYPE"),
            label: opt(reference, "LABEL"),
            loc_type: opt(reference, "LOCTYPE").unwrap_or_else(|| LOCTYPE_URL.to_string()),
            href: required(reference, HREF)?,
        })
    } else {
        return Err(MetsError::validation(format!(
            "metadata section {id} has neither mdWrap nor mdRef"
        )));
    };

    Ok(MdSection {
        id,
        group_id: opt(el, "GROUPID"),
        content,
    })
}

fn write_md_section(name: &str, section: &MdSection) -> XmlElement {
    let mut el = XmlElement::new(name)
        .with_attr("ID", section.id.as_str())
        .with_opt_attr("GROUPID", section.group_id.as_deref());

    match &section.content {
        MdContent::Wrap(wrap) => {
            let (mdtype, other) = wrap.md_type.attribute_values();
            let body = match &wrap.body {
                WrapBody::Xml(nodes) => {
                    let mut xml = XmlElement::new("mets:xmlData");
                    for node in nodes {
                        xml.push(node.clone());
                    }
                    xml
                }
                WrapBody::Binary(bytes) => {
                    XmlElement::new("mets:binData").with_text(STANDARD.encode(bytes))
                }
            };
            el.push(
                XmlElement::new("mets:mdWrap")
                    .with_opt_attr("MIMETYPE", wrap.mime_type.as_deref())
                    .with_attr("MDTYPE", mdtype)
                    .with_opt_attr("OTHERMDTYPE", other)
                    .with_opt_attr("LABEL", wrap.label.as_deref())
                    .with_child(body),
            );
        }
        MdContent::Ref(reference) => {
            let (mdtype, other) = reference.md_type.attribute_values();
            el.push(
                XmlElement::new("mets:mdRef")
                    .with_attr("LOCTYPE", reference.loc_type.as_str())
                    .with_attr(HREF, reference.href.as_str())
                    .with_opt_attr("MIMETYPE", reference.mime_type.as_deref())
                    .with_attr("MDTYPE", mdtype)
                    .with_opt_attr("OTHERMDTYPE", other)
                    .with_opt_attr("LABEL", reference.label.as_deref()),
            );
        }
    }
    el
}

fn read_amd_section(el: &XmlElement) -> Result<AmdSection> {
    let mut amd = AmdSection::new(required(el, "ID")?);
    for child in el.elements() {
        if let Some(kind) = AdminKind::from_element_name(child.local_name()) {
            amd.sections_mut(kind).push(read_md_section(child)?);
        }
    }
    Ok(amd)
}

fn write_amd_section(amd: &AmdSection) -> XmlElement {
    let mut el = XmlElement::new("mets:amdSec").with_attr("ID", amd.id.as_str());
    for (kind, section) in amd.iter() {
        el.push(write_md_section(
            &format!("mets:{}", kind.element_name()),
            section,
        ));
    }
    el
}

fn read_file_sec(el: &XmlElement) -> Result<FileSection> {
    let mut groups = Vec::new();
    for group in el.children_named("fileGrp") {
        read_file_group(group, None, &mut groups)?;
    }
    Ok(FileSection { groups })
}

/// Nested groups are flattened; a nested group without `USE` inherits its parent's.
fn read_file_group(
    el: &XmlElement,
    inherited_use: Option<&str>,
    out: &mut Vec<FileGroup>,
) -> Result<()> {
    let usage = opt(el, "USE").or_else(|| inherited_use.map(str::to_string));
    let mut files = Vec::new();
    for file in el.children_named("file") {
        files.push(read_file(file)?);
    }
    out.push(FileGroup {
        id: opt(el, "ID"),
        usage: usage.clone(),
        files,
    });
    for nested in el.children_named("fileGrp") {
        read_file_group(nested, usage.as_deref(), out)?;
    }
    Ok(())
}

fn read_file(el: &XmlElement) -> Result<FileEntry> {
    Ok(FileEntry {
        id: opt(el, "ID"),
        seq: parse_number(el, "SEQ")?,
        size: parse_number(el, "SIZE")?,
        checksum: opt(el, "CHECKSUM"),
        checksum_type: opt(el, "CHECKSUMTYPE"),
        mime_type: opt(el, "MIMETYPE"),
        group_id: opt(el, "GROUPID"),
        adm_ids: id_list(el.attr("ADMID")),
        locations: el
            .children_named("FLocat")
            .map(|loc| {
                FileLocation {
                    loc_type: opt(loc, "LOCTYPE"),
                    href: opt(loc, HREF),
                }
            })
            .collect(),
        has_inline_content: el.child("FContent").is_some(),
    })
}

fn write_file_sec(file_sec: &FileSection) -> XmlElement {
    let mut el = XmlElement::new("mets:fileSec");
    for group in &file_sec.groups {
        let mut grp = XmlElement::new("mets:fileGrp")
            .with_opt_attr("ID", group.id.as_deref())
            .with_opt_attr("USE", group.usage.as_deref());
        for file in &group.files {
            grp.push(write_file(file));
        }
        el.push(grp);
    }
    el
}

fn write_file(file: &FileEntry) -> XmlElement {
    let adm = (!file.adm_ids.is_empty()).then(|| file.adm_ids.join(" "));
    let mut el = XmlElement::new("mets:file")
        .with_opt_attr("ID", file.id.as_deref())
        .with_opt_attr("GROUPID", file.group_id.as_deref())
        .with_opt_attr("ADMID", adm)
        .with_opt_attr("MIMETYPE", file.mime_type.as_deref())
        .with_opt_attr("SEQ", file.seq.map(|s| s.to_string()))
        .with_opt_attr("SIZE", file.size.map(|s| s.to_string()))
        .with_opt_attr("CHECKSUM", file.checksum.as_deref())
        .with_opt_attr("CHECKSUMTYPE", file.checksum_type.as_deref());
    for loc in &file.locations {
        el.push(
            XmlElement::new("mets:FLocat")
                .with_opt_attr("LOCTYPE", loc.loc_type.as_deref())
                .with_opt_attr(HREF, loc.href.as_deref()),
        );
    }
    el
}

fn read_struct_map(el: &XmlElement) -> Result<StructMap> {
    Ok(StructMap {
        id: opt(el, "ID"),
        map_type: opt(el, "TYPE"),
        label: opt(el, "LABEL"),
        divs: el
            .children_named("div")
            .map(read_div)
            .collect::<Result<_>>()?,
    })
}

fn read_div(el: &XmlElement) -> Result<Div> {
    let mut mptrs = Vec::new();
    for mptr in el.children_named("mptr") {
        mptrs.push(Mptr {
            loc_type: opt(mptr, "LOCTYPE").unwrap_or_else(|| LOCTYPE_URL.to_string()),
            href: required(mptr, HREF)?,
        });
    }

    let mut fptrs = Vec::new();
    for fptr in el.children_named("fptr") {
        fptrs.push(required(fptr, "FILEID")?);
    }

    Ok(Div {
        id: opt(el, "ID"),
        div_type: opt(el, "TYPE"),
        label: opt(el, "LABEL"),
        dmd_ids: id_list(el.attr("DMDID")),
        adm_ids: id_list(el.attr("ADMID")),
        mptrs,
        fptrs,
        children: el
            .children_named("div")
            .map(read_div)
            .collect::<Result<_>>()?,
    })
}

fn write_struct_map(map: &StructMap) -> XmlElement {
    let mut el = XmlElement::new("mets:structMap")
        .with_opt_attr("ID", map.id.as_deref())
        .with_opt_attr("LABEL", map.label.as_deref())
        .with_opt_attr("TYPE", map.map_type.as_deref());
    for div in &map.divs {
        el.push(write_div(div));
    }
    el
}

fn write_div(div: &Div) -> XmlElement {
    let dmd = (!div.dmd_ids.is_empty()).then(|| div.dmd_ids.join(" "));
    let adm = (!div.adm_ids.is_empty()).then(|| div.adm_ids.join(" "));
    let mut el = XmlElement::new("mets:div")
        .with_opt_attr("ID", div.id.as_deref())
        .with_opt_attr("DMDID", dmd)
        .with_opt_attr("ADMID", adm)
        .with_opt_attr("LABEL", div.label.as_deref())
        .with_opt_attr("TYPE", div.div_type.as_deref());

    for mptr in &div.mptrs {
        el.push(
            XmlElement::new("mets:mptr")
                .with_attr("LOCTYPE", mptr.loc_type.as_str())
                .with_attr(HREF, mptr.href.as_str()),
        );
    }
    for file_id in &div.fptrs {
        el.push(XmlElement::new("mets:fptr").with_attr("FILEID", file_id.as_str()));
    }
    for child in &div.children {
        el.push(write_div(child));
    }
    el
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mets xmlns="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink"
      ID="DSpace_ITEM_123-45" OBJID="hdl:123/45" TYPE="DSpace ITEM"
      PROFILE="DSpace METS SIP Profile 1.0">
  <metsHdr CREATEDATE="2024-01-02T03:04:05Z">
    <agent ROLE="CUSTODIAN" TYPE="ORGANIZATION"><name>Test Archive</name></agent>
  </metsHdr>
  <dmdSec ID="dmd_1" GROUPID="group_dmd_0">
    <mdWrap MDTYPE="MODS">
      <xmlData><mods:mods xmlns:mods="http://www.loc.gov/mods/v3"><mods:title>A</mods:title></mods:mods></xmlData>
    </mdWrap>
  </dmdSec>
  <dmdSec ID="dmd_2" GROUPID="group_dmd_0">
    <mdWrap MDTYPE="OTHER" OTHERMDTYPE="DIM" MIMETYPE="text/xml">
      <binData>PGRpbS8+</binData>
    </mdWrap>
  </dmdSec>
  <amdSec ID="amd_3">
    <rightsMD ID="rights_4">
      <mdRef LOCTYPE="URL" MDTYPE="OTHER" OTHERMDTYPE="DSPACE_DEPLICENSE" MIMETYPE="text/plain" xlink:href="metadata_rights_4.txt"/>
    </rightsMD>
  </amdSec>
  <fileSec>
    <fileGrp USE="CONTENT">
      <file ID="bitstream_1" SEQ="1" SIZE="12" CHECKSUM="abc" CHECKSUMTYPE="MD5" MIMETYPE="application/pdf" GROUPID="GROUP_bitstream_1" ADMID="amd_5 amd_6">
        <FLocat LOCTYPE="URL" xlink:href="bitstream_1.pdf"/>
      </file>
    </fileGrp>
  </fileSec>
  <structMap ID="struct_7" TYPE="LOGICAL" LABEL="DSpace">
    <div ID="div_8" TYPE="DSpace ITEM" DMDID="dmd_1 dmd_2" ADMID="amd_3">
      <fptr FILEID="bitstream_1"/>
      <div ID="div_9" TYPE="DSpace Content Bitstream"><fptr FILEID="bitstream_1"/></div>
    </div>
  </structMap>
  <structMap ID="struct_10" TYPE="LOGICAL" LABEL="Parent">
    <div ID="div_11" TYPE="AIP Parent Link"><mptr LOCTYPE="HANDLE" xlink:href="123/1"/></div>
  </structMap>
</mets>"#;

    #[test]
    fn test_parse_reads_every_section() {
        let doc = MetsDocument::parse(ITEM_MANIFEST.as_bytes()).unwrap();
        assert_eq!(doc.objid.as_deref(), Some("hdl:123/45"));
        assert_eq!(doc.object_type.as_deref(), Some("DSpace ITEM"));
        assert_eq!(doc.header.as_ref().unwrap().agents[0].name, "Test Archive");

        assert_eq!(doc.dmd_secs.len(), 2);
        assert_eq!(doc.dmd_secs[0].md_type().label(), "MODS");
        assert_eq!(doc.dmd_secs[1].md_type().label(), "DIM");
        match &doc.dmd_secs[1].content {
            MdContent::Wrap(wrap) => assert_eq!(wrap.body, WrapBody::Binary(b"<dim/>".to_vec())),
            other => panic!("unexpected content {other:?}"),
        }

        let rights = &doc.amd_secs[0].rights_md[0];
        assert_eq!(rights.md_type().label(), "DSPACE_DEPLICENSE");

        let file = &doc.file_sec.as_ref().unwrap().groups[0].files[0];
        assert_eq!(file.size, Some(12));
        assert_eq!(file.adm_ids, ["amd_5", "amd_6"]);
        assert_eq!(file.locations[0].href.as_deref(), Some("bitstream_1.pdf"));

        let root = &doc.struct_maps[0].divs[0];
        assert_eq!(root.dmd_ids, ["dmd_1", "dmd_2"]);
        assert_eq!(root.fptrs, ["bitstream_1"]);
        assert_eq!(doc.struct_maps[1].divs[0].pointer(LOCTYPE_HANDLE), Some("123/1"));
    }

    #[test]
    fn test_write_then_parse_is_stable() {
        let doc = MetsDocument::parse(ITEM_MANIFEST.as_bytes()).unwrap();
        let first = doc.to_xml().unwrap();
        let reparsed = MetsDocument::parse(&first).unwrap();
        assert_eq!(reparsed, doc);
        assert_eq!(reparsed.to_xml().unwrap(), first);

        let text = String::from_utf8(first).unwrap();
        assert!(text.contains("<mets:mets"));
        assert!(text.contains(r#"MDTYPE="OTHER" OTHERMDTYPE="DIM""#));
        assert!(text.contains("<mets:binData>PGRpbS8+</mets:binData>"));
    }

    #[test]
    fn test_parse_rejects_wrong_root() {
        let err = MetsDocument::parse(b"<mods/>").unwrap_err();
        assert!(matches!(err, MetsError::Validation(_)));
    }

    #[test]
    fn test_parse_rejects_bad_numbers_and_missing_ids() {
        let bad_size = r#"<mets><fileSec><fileGrp USE="CONTENT">
            <file ID="f" SIZE="big"><FLocat LOCTYPE="URL" href="x"/></file>
            </fileGrp></fileSec></mets>"#;
        assert!(MetsDocument::parse(bad_size.as_bytes()).is_err());

        let no_id = r#"<mets><dmdSec><mdWrap MDTYPE="DC"><xmlData/></mdWrap></dmdSec></mets>"#;
        assert!(MetsDocument::parse(no_id.as_bytes()).is_err());

        let empty_wrap = r#"<mets><dmdSec ID="d"><mdWrap MDTYPE="DC"/></dmdSec></mets>"#;
        assert!(MetsDocument::parse(empty_wrap.as_bytes()).is_err());
    }

    #[test]
    fn test_xlink_bound_to_another_prefix() {
        let xml = r#"<m:mets xmlns:m="http://www.loc.gov/METS/" xmlns:xl="http://www.w3.org/1999/xlink">
            <m:fileSec><m:fileGrp USE="CONTENT">
              <m:file ID="f1"><m:FLocat LOCTYPE="URL" xl:href="a.txt"/></m:file>
            </m:fileGrp></m:fileSec>
            <m:structMap><m:div><m:div><m:mptr LOCTYPE="URL" xl:href="ITEM@1-2.zip"/></m:div></m:div></m:structMap>
          </m:mets>"#;
        let doc = MetsDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.content_files().unwrap()[0].href, "a.txt");
        assert_eq!(doc.child_package_references().unwrap()[0].href, "ITEM@1-2.zip");

        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(written.contains(r#"xlink:href="a.txt""#));
    }

    #[test]
    fn test_nested_file_groups_inherit_use() {
        let xml = r#"<mets><fileSec><fileGrp USE="THUMBNAIL">
            <fileGrp ID="inner"><file ID="t"><FLocat LOCTYPE="URL" href="t.jpg"/></file></fileGrp>
            </fileGrp></fileSec></mets>"#;
        let doc = MetsDocument::parse(xml.as_bytes()).unwrap();
        let groups = &doc.file_sec.unwrap().groups;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].usage.as_deref(), Some("THUMBNAIL"));
        assert_eq!(groups[1].files[0].id.as_deref(), Some("t"));
    }
}
