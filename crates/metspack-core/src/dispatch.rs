//! Builds metadata sections by running crosswalks, and feeds sections back
//! into crosswalks on ingest.

use metspack_mets::{
    AdminKind, IdGenerator, MdContent, MdRef, MdSection, MdType, MdWrap, MetsDocument,
    WrapBody, XmlElement, LOCTYPE_URL,
};
use tracing::{debug, warn};

use crate::{
    content::{ObjectId, PackagingContext},
    crosswalk::{Crosswalk, CrosswalkError, CrosswalkRegistry},
    error::{PackError, PackResult},
    package::ReferenceResolver,
    params::PackageParameters,
};

const XML_MIME: &str = "text/xml";

/// A metadata type as written in packager settings: `LABEL` or `LABEL:crosswalk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec<'a> {
    pub label: &'a str,
    pub crosswalk: &'a str,
}

impl<'a> TypeSpec<'a> {
    pub fn parse(spec: &'a str) -> Self {
        match spec.split_once(':') {
            Some((label, crosswalk)) if !crosswalk.is_empty() => Self { label, crosswalk },
            Some((label, _)) => {
                Self {
                    label,
                    crosswalk: label,
                }
            }
            None => {
                Self {
                    label: spec,
                    crosswalk: spec,
                }
            }
        }
    }
}

/// Where a built section goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Descriptive,
    Admin(AdminKind),
}

impl SectionKind {
    pub fn id_prefix(self) -> &'static str {
        match self {
            SectionKind::Descriptive => "dmd",
            SectionKind::Admin(kind) => kind.id_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryStream {
    pub section_id: String,
    pub md_type: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Stream crosswalk output waiting to be written as separate archive entries.
#[derive(Debug, Default)]
pub struct AuxiliaryStreams {
    entries: Vec<AuxiliaryStream>,
}

fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "text/plain" => "txt",
        "text/xml" | "application/xml" => "xml",
        "application/pdf" => "pdf",
        "text/html" => "html",
        _ => "bin",
    }
}

impl AuxiliaryStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stream: AuxiliaryStream) {
        self.entries.push(stream);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names every pending stream, points its `mdRef` at that name and
    /// returns the entries to write, in the order they were produced.
    pub fn assign_names(self, doc: &mut MetsDocument) -> PackResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let name = format!(
                "metadata_{}.{}",
                entry.section_id,
                extension_for(&entry.mime_type)
            );
            let section = doc.find_md_section_mut(&entry.section_id).ok_or_else(|| {
                PackError::validation(format!(
                    "no metadata section {} for {} stream",
                    entry.section_id, entry.md_type
                ))
            })?;
            match &mut section.content {
                MdContent::Ref(reference) => reference.href = name.clone(),
                MdContent::Wrap(_) => {
                    return Err(PackError::validation(format!(
                        "metadata section {} is wrapped, not a reference",
                        entry.section_id
                    )))
                }
            }
            out.push((name, entry.bytes));
        }
        Ok(out)
    }
}

/// Resolves metadata types to crosswalks and turns their output into sections.
#[derive(Clone, Copy)]
pub struct CrosswalkDispatcher<'r> {
    registry: &'r CrosswalkRegistry,
}

impl<'r> CrosswalkDispatcher<'r> {
    pub fn new(registry: &'r CrosswalkRegistry) -> Self {
        Self { registry }
    }

    fn lookup(&self, label: &str, name: &str) -> PackResult<Crosswalk> {
        self.registry.get(name).ok_or_else(|| {
            PackError::configuration(format!(
                "no crosswalk named `{name}` is registered for metadata type {label}"
            ))
        })
    }

    /// Runs the crosswalk for `spec` over `object`.
    ///
    /// Returns `None` when the crosswalk does not apply to the object or
    /// produced nothing. Stream output goes to `aux` as a pending `mdRef`
    /// when a sink is given, and is wrapped inline as `binData` otherwise.
    pub fn build_section(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        spec: &str,
        kind: SectionKind,
        ids: &mut IdGenerator,
        aux: Option<&mut AuxiliaryStreams>,
    ) -> PackResult<Option<MdSection>> {
        let spec = TypeSpec::parse(spec);
        let crosswalk = self.lookup(spec.label, spec.crosswalk)?;
        let object_type = ctx.content.object_type(object)?;
        let failed = |source: CrosswalkError| {
            PackError::Crosswalk {
                name: spec.crosswalk.to_string(),
                source,
            }
        };

        if !crosswalk.can_handle(object_type) {
            debug!(
                crosswalk = spec.crosswalk,
                "crosswalk does not apply to a {object_type}"
            );
            return Ok(None);
        }

        let content = match crosswalk {
            Crosswalk::Dom(xwalk) => {
                let nodes = match xwalk.disseminate(ctx, object) {
                    Ok(nodes) => nodes,
                    Err(CrosswalkError::NotSupported) => return Ok(None),
                    Err(err) => return Err(failed(err)),
                };
                if nodes.is_empty() {
                    return Ok(None);
                }
                MdContent::Wrap(MdWrap {
                    md_type: MdType::new(spec.label),
                    mime_type: Some(XML_MIME.to_string()),
                    label: None,
                    body: WrapBody::Xml(nodes),
                })
            }
            Crosswalk::Stream(xwalk) => {
                let stream = match xwalk.disseminate(ctx, object) {
                    Ok(stream) => stream,
                    Err(CrosswalkError::NotSupported) => return Ok(None),
                    Err(err) => return Err(failed(err)),
                };
                let id = ids.next_id(kind.id_prefix());
                let content = match aux {
                    Some(aux) => {
                        aux.push(AuxiliaryStream {
                            section_id: id.clone(),
                            md_type: spec.label.to_string(),
                            mime_type: stream.mime_type.clone(),
                            bytes: stream.bytes,
                        });
                        MdContent::Ref(MdRef {
                            md_type: MdType::new(spec.label),
                            mime_type: Some(stream.mime_type),
                            label: None,
                            loc_type: LOCTYPE_URL.to_string(),
                            href: String::new(),
                        })
                    }
                    None => {
                        MdContent::Wrap(MdWrap {
                            md_type: MdType::new(spec.label),
                            mime_type: Some(stream.mime_type),
                            label: None,
                            body: WrapBody::Binary(stream.bytes),
                        })
                    }
                };
                return Ok(Some(MdSection {
                    id,
                    group_id: None,
                    content,
                }));
            }
        };

        Ok(Some(MdSection {
            id: ids.next_id(kind.id_prefix()),
            group_id: None,
            content,
        }))
    }

    /// Name of the ingest crosswalk for a section label.
    ///
    /// A per-call override wins, then a configured alias, then the crosswalk
    /// named by the profile's type spec, then the label itself.
    pub fn ingest_crosswalk_name<'a>(
        &'a self,
        label: &'a str,
        params: &'a PackageParameters,
        specs: &'a [String],
    ) -> &'a str {
        if let Some(name) = params.crosswalk_override(label) {
            return name;
        }
        if let Some(name) = self.registry.alias(label) {
            return name;
        }
        specs
            .iter()
            .map(|s| TypeSpec::parse(s))
            .find(|s| s.label == label)
            .map(|s| s.crosswalk)
            .unwrap_or(label)
    }

    /// Feeds one metadata section to its ingest crosswalk.
    ///
    /// Returns false when the section was skipped because the crosswalk does
    /// not apply to the object or its content could not be read as XML.
    pub fn ingest_section(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        section: &MdSection,
        resolver: &mut dyn ReferenceResolver,
        params: &PackageParameters,
        specs: &[String],
    ) -> PackResult<bool> {
        let label = section.md_type().label();
        let name = self.ingest_crosswalk_name(label, params, specs);
        let crosswalk = self.lookup(label, name)?;
        debug!(section = %section.id, crosswalk = name, "ingesting metadata section");

        let result = match crosswalk {
            Crosswalk::Dom(xwalk) => {
                let nodes = match &section.content {
                    MdContent::Wrap(wrap) => wrap.xml()?,
                    MdContent::Ref(reference) => {
                        let bytes = resolver.read_reference(&reference.href)?;
                        Some(XmlElement::parse_fragment(&bytes)?)
                    }
                };
                let Some(nodes) = nodes else {
                    return Ok(false);
                };
                xwalk.ingest(ctx, object, &nodes)
            }
            Crosswalk::Stream(xwalk) => {
                let bytes = match &section.content {
                    MdContent::Wrap(wrap) => wrap.bytes()?,
                    MdContent::Ref(reference) => resolver.read_reference(&reference.href)?,
                };
                xwalk.ingest(ctx, object, &bytes, section.mime_type())
            }
        };

        match result {
            Ok(()) => Ok(true),
            Err(CrosswalkError::NotSupported) => {
                warn!(
                    section = %section.id,
                    crosswalk = name,
                    "crosswalk does not support {}, skipping section",
                    ctx.describe(object)
                );
                Ok(false)
            }
            Err(source) => {
                Err(PackError::Crosswalk {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        content::{ContentService, MetadataValue, ObjectType},
        memory::MemoryRepository,
    };

    struct NoReferences;

    impl ReferenceResolver for NoReferences {
        fn read_reference(&mut self, href: &str) -> PackResult<Vec<u8>> {
            Err(PackError::validation(format!("unexpected reference {href}")))
        }
    }

    struct Entries(HashMap<String, Vec<u8>>);

    impl ReferenceResolver for Entries {
        fn read_reference(&mut self, href: &str) -> PackResult<Vec<u8>> {
            self.0
                .get(href)
                .cloned()
                .ok_or_else(|| PackError::validation(href.to_string()))
        }
    }

    fn item(repo: &MemoryRepository) -> ObjectId {
        let community = repo.create_object(ObjectType::Community, repo.site()).unwrap();
        let collection = repo.create_object(ObjectType::Collection, community).unwrap();
        repo.create_object(ObjectType::Item, collection).unwrap()
    }

    #[test]
    fn test_type_spec_parsing() {
        assert_eq!(
            TypeSpec::parse("MODS:DIM"),
            TypeSpec {
                label: "MODS",
                crosswalk: "DIM"
            }
        );
        assert_eq!(TypeSpec::parse("DIM").crosswalk, "DIM");
        assert_eq!(TypeSpec::parse("DIM:").crosswalk, "DIM");
    }

    #[test]
    fn test_dom_section_is_wrapped_xml() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let item = item(&repo);
        repo.add_metadata(item, MetadataValue::new("dc", "title", None, "T"))
            .unwrap();

        let registry = CrosswalkRegistry::with_builtins();
        let dispatcher = CrosswalkDispatcher::new(&registry);
        let mut ids = IdGenerator::new();
        let section = dispatcher
            .build_section(&ctx, item, "DIM", SectionKind::Descriptive, &mut ids, None)
            .unwrap()
            .unwrap();
        assert_eq!(section.id, "dmd_1");
        assert_eq!(section.md_type().label(), "DIM");
        assert_eq!(section.mime_type(), Some("text/xml"));
        assert!(matches!(
            section.content,
            MdContent::Wrap(MdWrap {
                body: WrapBody::Xml(_),
                ..
            })
        ));
    }

    #[test]
    fn test_inapplicable_crosswalk_gives_no_section() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let item = item(&repo);
        let registry = CrosswalkRegistry::with_builtins();
        let dispatcher = CrosswalkDispatcher::new(&registry);
        let mut ids = IdGenerator::new();

        let premis = dispatcher
            .build_section(
                &ctx,
                item,
                "PREMIS",
                SectionKind::Admin(AdminKind::Tech),
                &mut ids,
                None,
            )
            .unwrap();
        assert!(premis.is_none());

        // no license bitstream yet
        let license = dispatcher
            .build_section(
                &ctx,
                item,
                "DSPACE_DEPLICENSE",
                SectionKind::Admin(AdminKind::Rights),
                &mut ids,
                None,
            )
            .unwrap();
        assert!(license.is_none());
        assert_eq!(ids.next_id("x"), "x_1");
    }

    #[test]
    fn test_unknown_crosswalk_is_configuration_error() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let item = item(&repo);
        let registry = CrosswalkRegistry::with_builtins();
        let dispatcher = CrosswalkDispatcher::new(&registry);
        let err = dispatcher
            .build_section(
                &ctx,
                item,
                "MODS:MODS",
                SectionKind::Descriptive,
                &mut IdGenerator::new(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, PackError::Configuration(_)));
    }

    #[test]
    fn test_stream_section_inline_or_pending_reference() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let item = item(&repo);
        repo.add_bitstream(item, "LICENSE", "license.txt", b"terms".to_vec())
            .unwrap();
        let registry = CrosswalkRegistry::with_builtins();
        let dispatcher = CrosswalkDispatcher::new(&registry);
        let rights = SectionKind::Admin(AdminKind::Rights);

        let inline = dispatcher
            .build_section(&ctx, item, "DSPACE_DEPLICENSE", rights, &mut IdGenerator::new(), None)
            .unwrap()
            .unwrap();
        match &inline.content {
            MdContent::Wrap(wrap) => assert_eq!(wrap.body, WrapBody::Binary(b"terms".to_vec())),
            other => panic!("expected binData, got {other:?}"),
        }

        let mut aux = AuxiliaryStreams::new();
        let pending = dispatcher
            .build_section(
                &ctx,
                item,
                "DSPACE_DEPLICENSE",
                rights,
                &mut IdGenerator::new(),
                Some(&mut aux),
            )
            .unwrap()
            .unwrap();
        assert_eq!(pending.id, "rights_1");
        assert_eq!(aux.len(), 1);

        let mut amd = metspack_mets::AmdSection::new("amd_2");
        amd.rights_md.push(pending);
        let mut doc = MetsDocument {
            amd_secs: vec![amd],
            ..Default::default()
        };
        let entries = aux.assign_names(&mut doc).unwrap();
        assert_eq!(entries, [("metadata_rights_1.txt".to_string(), b"terms".to_vec())]);
        match &doc.amd_secs[0].rights_md[0].content {
            MdContent::Ref(reference) => assert_eq!(reference.href, "metadata_rights_1.txt"),
            other => panic!("expected mdRef, got {other:?}"),
        }
    }

    #[test]
    fn test_ingest_resolves_names_and_references() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let item = item(&repo);
        let mut registry = CrosswalkRegistry::with_builtins();
        registry.add_alias("DC", "DIM");
        let dispatcher = CrosswalkDispatcher::new(&registry);
        let params = PackageParameters::new();

        let specs = vec!["MODS:DIM".to_string()];
        assert_eq!(dispatcher.ingest_crosswalk_name("DC", &params, &specs), "DIM");
        assert_eq!(dispatcher.ingest_crosswalk_name("MODS", &params, &specs), "DIM");
        assert_eq!(dispatcher.ingest_crosswalk_name("PREMIS", &params, &specs), "PREMIS");
        let overridden = PackageParameters::new().with("crosswalk.DC", "PREMIS");
        assert_eq!(dispatcher.ingest_crosswalk_name("DC", &overridden, &specs), "PREMIS");

        let section = MdSection {
            id: "dmd_1".into(),
            group_id: None,
            content: MdContent::Ref(MdRef {
                md_type: MdType::new("DC"),
                mime_type: Some("text/xml".into()),
                label: None,
                loc_type: LOCTYPE_URL.into(),
                href: "dc.xml".into(),
            }),
        };
        let mut entries = Entries(HashMap::from([(
            "dc.xml".to_string(),
            br#"<dim:dim xmlns:dim="x"><dim:field mdschema="dc" element="title">Ref</dim:field></dim:dim>"#
                .to_vec(),
        )]));
        assert!(dispatcher
            .ingest_section(&ctx, item, &section, &mut entries, &params, &[])
            .unwrap());
        assert_eq!(repo.metadata(item).unwrap()[0].value, "Ref");
    }

    #[test]
    fn test_ingest_unsupported_object_is_skipped() {
        let repo = MemoryRepository::new();
        let ctx = PackagingContext::from_repository(&repo);
        let item = item(&repo);
        let registry = CrosswalkRegistry::with_builtins();
        let dispatcher = CrosswalkDispatcher::new(&registry);
        let section = MdSection {
            id: "tech_1".into(),
            group_id: None,
            content: MdContent::Wrap(MdWrap {
                md_type: MdType::new("PREMIS"),
                mime_type: Some("text/xml".into()),
                label: None,
                body: WrapBody::Xml(vec![XmlElement::new("premis:object")]),
            }),
        };
        let applied = dispatcher
            .ingest_section(
                &ctx,
                item,
                &section,
                &mut NoReferences,
                &PackageParameters::new(),
                &[],
            )
            .unwrap();
        assert!(!applied);
    }
}
