//! Writing an object out as a METS package.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::Arc,
};

use metspack_config::config::Config;
use metspack_events::{EventSinkHandle, NullSink, PackEvent, WithheldAction};
use metspack_mets::{
    encode_handle_urn, file_group_for_bundle, AdminKind, AmdSection, Div, FileEntry, FileGroup,
    FileLocation, FileSection, IdGenerator, MetsDocument, Mptr, StructMap, LOCTYPE_URL,
    MANIFEST_FILE,
};
use metspack_utils::{
    bytes::format_bytes,
    fs::{ensure_parent_dir, safe_remove},
    hash::{EMPTY_MD5, MD5},
};
use tracing::{debug, info, warn};

use crate::{
    content::{Bitstream, ObjectId, ObjectType, PackagingContext},
    crosswalk::CrosswalkRegistry,
    dispatch::{AuxiliaryStreams, CrosswalkDispatcher, SectionKind},
    error::{ErrorContext, PackError, PackResult},
    package::{archive_entry_name, content_location, package_extension, package_name, ArchiveWriter},
    params::{PackageParameters, UnauthorizedPolicy},
    profile::{profile_for, PackagingProfile},
};

pub const ORIGINAL_BUNDLE: &str = "ORIGINAL";
pub const LOGO_GROUP: &str = "LOGO";
pub const CONTENT_DIV: &str = "DSpace Content Bitstream";
pub const TEMPLATE_DIV: &str = "DSpace Item Template";
const OBJECT_STRUCT_MAP: &str = "DSpace Object";
const ARCHIVE_COMMENT: &str = "METS archive";

/// A content bitstream to copy into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub name: String,
    pub bitstream: ObjectId,
    /// Withheld content, written as an empty entry.
    pub zero_filled: bool,
}

/// A manifest together with the content it references.
#[derive(Debug)]
pub struct BuiltPackage {
    pub document: MetsDocument,
    pub content: Vec<ContentEntry>,
    pub auxiliary: Option<AuxiliaryStreams>,
}

/// How one bitstream made it past the read check.
enum Access {
    Readable,
    ZeroFilled,
    Withheld,
}

/// Builds and writes packages for one packaging profile.
pub struct Disseminator<'a> {
    ctx: PackagingContext<'a>,
    registry: CrosswalkRegistry,
    profile: Arc<dyn PackagingProfile>,
    site_name: String,
    retrieval_base_url: Option<String>,
    events: EventSinkHandle,
}

impl<'a> Disseminator<'a> {
    pub fn new(
        ctx: PackagingContext<'a>,
        registry: CrosswalkRegistry,
        profile: Arc<dyn PackagingProfile>,
    ) -> Self {
        Self {
            ctx,
            registry,
            profile,
            site_name: "metspack".to_string(),
            retrieval_base_url: None,
            events: Arc::new(NullSink),
        }
    }

    /// A disseminator for the named packager, with crosswalks and site
    /// settings taken from `config`.
    pub fn from_config(
        ctx: PackagingContext<'a>,
        config: &Config,
        packager: &str,
    ) -> PackResult<Self> {
        let mut disseminator = Self::new(
            ctx,
            CrosswalkRegistry::from_config(config),
            profile_for(config, packager)?,
        );
        disseminator.site_name = config.site_name.clone();
        disseminator.retrieval_base_url = config.retrieval_base_url.clone();
        Ok(disseminator)
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    pub fn with_site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    pub fn with_retrieval_base_url(mut self, base: Option<String>) -> Self {
        self.retrieval_base_url = base;
        self
    }

    pub fn context(&self) -> &PackagingContext<'a> {
        &self.ctx
    }

    pub fn events(&self) -> &EventSinkHandle {
        &self.events
    }

    pub fn profile(&self) -> &dyn PackagingProfile {
        self.profile.as_ref()
    }

    /// File name of the package for `object` under the given parameters.
    pub fn package_name(&self, object: ObjectId, params: &PackageParameters) -> PackResult<String> {
        let kind = self.ctx.content.object_type(object)?;
        let handle = self.ctx.identifiers.handle_of(object)?;
        Ok(package_name(
            kind,
            handle.as_deref(),
            object,
            package_extension(params.manifest_only()),
        ))
    }

    /// Writes the package for `object` to `target` and returns its size.
    ///
    /// Nothing is left at `target` when any step fails.
    pub fn disseminate(
        &self,
        object: ObjectId,
        params: &PackageParameters,
        target: &Path,
    ) -> PackResult<u64> {
        let kind = self.ctx.content.object_type(object)?;
        let handle = self.ctx.identifiers.handle_of(object)?;
        info!(
            handle = handle.as_deref().unwrap_or("-"),
            "disseminating {kind} to {}",
            target.display()
        );
        self.events.emit(PackEvent::Disseminating {
            object_type: kind.label().to_string(),
            handle: handle.clone(),
            path: target.to_path_buf(),
        });

        let built = self.build(object, params)?;
        let mut document = built.document;
        let auxiliary = match built.auxiliary {
            Some(aux) => aux.assign_names(&mut document)?,
            None => Vec::new(),
        };
        if params.validate() {
            document.validate_structure()?;
        }
        let manifest = document.to_xml()?;

        ensure_parent_dir(target)?;
        let written = if params.manifest_only() {
            fs::write(target, &manifest)
                .with_context(|| format!("writing {}", target.display()))
                .map(|_| manifest.len() as u64)
        } else {
            self.write_archive(object, target, &auxiliary, &manifest, &built.content)
        };

        let size = match written {
            Ok(size) => size,
            Err(err) => {
                if let Err(cleanup) = safe_remove(target) {
                    warn!("failed to remove partial package {}: {cleanup}", target.display());
                }
                return Err(err);
            }
        };
        debug!("wrote {} ({})", target.display(), format_bytes(size, 1));

        self.events.emit(PackEvent::Disseminated {
            object_type: kind.label().to_string(),
            handle,
            path: target.to_path_buf(),
            size,
        });
        Ok(size)
    }

    fn write_archive(
        &self,
        object: ObjectId,
        target: &Path,
        auxiliary: &[(String, Vec<u8>)],
        manifest: &[u8],
        content: &[ContentEntry],
    ) -> PackResult<u64> {
        let modified = self.ctx.content.last_modified(object)?;
        let mut archive = ArchiveWriter::create(target, ARCHIVE_COMMENT, modified)?;
        for (name, bytes) in auxiliary {
            archive.add(name, bytes)?;
        }
        archive.add(MANIFEST_FILE, manifest)?;
        for entry in content {
            if entry.zero_filled {
                archive.add(&entry.name, &[])?;
            } else {
                let bytes = self.ctx.content.retrieve(entry.bitstream)?;
                archive.add(&entry.name, &bytes)?;
            }
        }
        archive.finish()
    }

    /// Builds the manifest for `object` without writing anything.
    ///
    /// Element ids start from 1 on every call, so unchanged input yields an
    /// identical document.
    pub fn build(&self, object: ObjectId, params: &PackageParameters) -> PackResult<BuiltPackage> {
        let mut ids = IdGenerator::new();
        let mut aux = (!params.manifest_only()).then(AuxiliaryStreams::new);
        let kind = self.ctx.content.object_type(object)?;
        let handle = self.ctx.identifiers.handle_of(object)?;

        let suffix = match &handle {
            Some(handle) => handle.replace('/', "-"),
            None => format!("internal-id-{object}"),
        };
        let mut document = MetsDocument {
            id: Some(format!("DSpace_{}_{}", kind.label(), suffix)),
            objid: handle.as_deref().map(encode_handle_urn),
            label: None,
            object_type: Some(kind.mets_type()),
            profile: Some(self.profile.profile_string().to_string()),
            header: Some(
                self.profile
                    .build_header(&self.site_name, self.ctx.content.last_modified(object)?),
            ),
            ..Default::default()
        };

        let dmd_ids = self.add_descriptive(&mut document, object, params, &mut ids, &mut aux)?;
        let object_admin: Vec<(AdminKind, &[String])> = AdminKind::ALL
            .into_iter()
            .map(|k| (k, self.profile.admin_types(k)))
            .collect();
        let adm_ids = self
            .add_admin(&mut document, object, &object_admin, &mut ids, &mut aux)?
            .into_iter()
            .collect();

        let mut root = Div {
            id: Some(ids.next_id("div")),
            div_type: Some(kind.mets_type()),
            dmd_ids,
            adm_ids,
            ..Default::default()
        };
        let mut groups = Vec::new();
        let mut content = Vec::new();

        match kind {
            ObjectType::Item => {
                self.add_item_content(
                    &mut document,
                    object,
                    params,
                    &mut ids,
                    &mut aux,
                    &mut root,
                    &mut groups,
                    &mut content,
                )?;
            }
            ObjectType::Collection | ObjectType::Community | ObjectType::Site => {
                if kind == ObjectType::Collection && self.profile.config().use_collection_template()
                {
                    if let Some(template) = self.ctx.content.template_item(object)? {
                        let template_dmd = self.add_descriptive(
                            &mut document,
                            template,
                            params,
                            &mut ids,
                            &mut aux,
                        )?;
                        if !template_dmd.is_empty() {
                            root.children.push(Div {
                                id: Some(ids.next_id("div")),
                                div_type: Some(TEMPLATE_DIV.to_string()),
                                dmd_ids: template_dmd,
                                ..Default::default()
                            });
                        }
                    }
                }
                for child in self.ctx.content.children(object)? {
                    root.children.push(self.child_div(child, params, &mut ids)?);
                }
                if kind.is_container() {
                    self.add_logo(object, params, &mut ids, &mut root, &mut groups, &mut content)?;
                }
            }
            ObjectType::Bundle | ObjectType::Bitstream => {
                return Err(PackError::validation(format!(
                    "a {kind} cannot be packaged on its own"
                )))
            }
        }

        if !groups.is_empty() {
            document.file_sec = Some(FileSection { groups });
        }
        document.struct_maps.push(StructMap {
            id: Some(ids.next_id("struct")),
            map_type: Some("LOGICAL".to_string()),
            label: Some(OBJECT_STRUCT_MAP.to_string()),
            divs: vec![root],
        });
        if let Some(extra) = self.profile.extra_struct_map(&self.ctx, object, &mut ids)? {
            document.struct_maps.push(extra);
        }

        Ok(BuiltPackage {
            document,
            content,
            auxiliary: aux,
        })
    }

    /// Descriptive sections for `object`, sharing one GROUPID.
    fn add_descriptive(
        &self,
        document: &mut MetsDocument,
        object: ObjectId,
        params: &PackageParameters,
        ids: &mut IdGenerator,
        aux: &mut Option<AuxiliaryStreams>,
    ) -> PackResult<Vec<String>> {
        let dispatcher = CrosswalkDispatcher::new(&self.registry);
        let group = ids.next_id("group_dmd");
        let mut section_ids = Vec::new();
        for spec in self.profile.dmd_types(params) {
            let section = dispatcher.build_section(
                &self.ctx,
                object,
                spec,
                SectionKind::Descriptive,
                ids,
                aux.as_mut(),
            )?;
            if let Some(mut section) = section {
                section.group_id = Some(group.clone());
                section_ids.push(section.id.clone());
                document.dmd_secs.push(section);
            }
        }
        Ok(section_ids)
    }

    /// One `amdSec` for `object`, or `None` when no crosswalk produced anything.
    fn add_admin(
        &self,
        document: &mut MetsDocument,
        object: ObjectId,
        types: &[(AdminKind, &[String])],
        ids: &mut IdGenerator,
        aux: &mut Option<AuxiliaryStreams>,
    ) -> PackResult<Option<String>> {
        let dispatcher = CrosswalkDispatcher::new(&self.registry);
        let mut amd = AmdSection::new(ids.next_id("amd"));
        for (kind, specs) in types {
            for spec in specs.iter() {
                let section = dispatcher.build_section(
                    &self.ctx,
                    object,
                    spec,
                    SectionKind::Admin(*kind),
                    ids,
                    aux.as_mut(),
                )?;
                if let Some(section) = section {
                    amd.sections_mut(*kind).push(section);
                }
            }
        }
        if amd.is_empty() {
            return Ok(None);
        }
        let id = amd.id.clone();
        document.amd_secs.push(amd);
        Ok(Some(id))
    }

    /// Applies the unauthorized-content policy to one bitstream.
    fn check_access(
        &self,
        bitstream: &Bitstream,
        readable: bool,
        policy: UnauthorizedPolicy,
    ) -> PackResult<Access> {
        if readable && self.ctx.authorization.can_read(bitstream.id)? {
            return Ok(Access::Readable);
        }
        match policy {
            UnauthorizedPolicy::Fail => {
                Err(PackError::Authorization(format!(
                    "bitstream {} ({})",
                    bitstream.id, bitstream.name
                )))
            }
            UnauthorizedPolicy::Skip => {
                warn!(bitstream = %bitstream.id, "skipping unreadable bitstream");
                self.events.emit(PackEvent::ContentWithheld {
                    bitstream: bitstream.name.clone(),
                    action: WithheldAction::Skipped,
                });
                Ok(Access::Withheld)
            }
            UnauthorizedPolicy::Zero => {
                warn!(bitstream = %bitstream.id, "writing unreadable bitstream as empty content");
                self.events.emit(PackEvent::ContentWithheld {
                    bitstream: bitstream.name.clone(),
                    action: WithheldAction::ZeroFilled,
                });
                Ok(Access::ZeroFilled)
            }
        }
    }

    fn file_entry(
        &self,
        bitstream: &Bitstream,
        zero_filled: bool,
        params: &PackageParameters,
    ) -> PackResult<FileEntry> {
        let href = content_location(
            bitstream,
            params.manifest_only(),
            self.retrieval_base_url.as_deref(),
        )?;
        let (size, checksum) = if zero_filled {
            (0, EMPTY_MD5.to_string())
        } else {
            (bitstream.size, bitstream.checksum.clone())
        };
        let checksum_type = if zero_filled {
            MD5.to_string()
        } else {
            bitstream.checksum_algorithm.clone()
        };
        Ok(FileEntry {
            id: Some(file_id(bitstream)),
            seq: bitstream.sequence_id,
            size: Some(size),
            checksum: Some(checksum),
            checksum_type: Some(checksum_type),
            mime_type: Some(bitstream.format.mime_type.clone()),
            group_id: None,
            adm_ids: Vec::new(),
            locations: vec![FileLocation {
                loc_type: Some(LOCTYPE_URL.to_string()),
                href: Some(href),
            }],
            has_inline_content: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn add_item_content(
        &self,
        document: &mut MetsDocument,
        item: ObjectId,
        params: &PackageParameters,
        ids: &mut IdGenerator,
        aux: &mut Option<AuxiliaryStreams>,
        root: &mut Div,
        groups: &mut Vec<FileGroup>,
        content: &mut Vec<ContentEntry>,
    ) -> PackResult<()> {
        let policy = params.unauthorized()?;
        let bundles = self.ctx.content.bundles(item)?;

        let mut originals: Vec<Bitstream> = Vec::new();
        for bundle in bundles.iter().filter(|b| b.name == ORIGINAL_BUNDLE) {
            originals.extend(self.ctx.content.bitstreams(bundle.id)?);
        }
        let by_id: HashMap<ObjectId, &Bitstream> = originals.iter().map(|b| (b.id, b)).collect();
        let by_name: HashMap<&str, &Bitstream> =
            originals.iter().map(|b| (b.name.as_str(), b)).collect();

        let bitstream_admin: [(AdminKind, &[String]); 1] =
            [(AdminKind::Tech, self.profile.bitstream_tech_md_types())];

        for bundle in &bundles {
            if !self.profile.include_bundle(&bundle.name, params) {
                debug!(bundle = %bundle.name, "bundle not included by {}", self.profile.name());
                continue;
            }
            let bundle_readable = self.ctx.authorization.can_read(bundle.id)?;
            let is_original = bundle.name == ORIGINAL_BUNDLE;
            let mut group = FileGroup {
                id: Some(ids.next_id("group")),
                usage: Some(file_group_for_bundle(&bundle.name)),
                files: Vec::new(),
            };

            for bitstream in self.ctx.content.bitstreams(bundle.id)? {
                let zero_filled = match self.check_access(&bitstream, bundle_readable, policy)? {
                    Access::Readable => false,
                    Access::ZeroFilled => true,
                    Access::Withheld => continue,
                };

                let mut entry = self.file_entry(&bitstream, zero_filled, params)?;
                let source = if is_original {
                    Some(&bitstream)
                } else {
                    derivative_source(&bitstream, &by_id, &by_name)
                };
                entry.group_id = Some(match source {
                    Some(original) => group_id(original),
                    None => group_id(&bitstream),
                });
                if !zero_filled {
                    if let Some(amd) =
                        self.add_admin(document, bitstream.id, &bitstream_admin, ids, aux)?
                    {
                        entry.adm_ids.push(amd);
                    }
                }

                let id = file_id(&bitstream);
                if is_original {
                    if bundle.primary_bitstream == Some(bitstream.id) {
                        root.fptrs.push(id.clone());
                    }
                    root.children.push(Div {
                        id: Some(ids.next_id("div")),
                        div_type: Some(CONTENT_DIV.to_string()),
                        fptrs: vec![id],
                        ..Default::default()
                    });
                }
                group.files.push(entry);
                content.push(ContentEntry {
                    name: archive_entry_name(&bitstream),
                    bitstream: bitstream.id,
                    zero_filled,
                });
            }

            if !group.files.is_empty() {
                groups.push(group);
            }
        }
        Ok(())
    }

    fn add_logo(
        &self,
        container: ObjectId,
        params: &PackageParameters,
        ids: &mut IdGenerator,
        root: &mut Div,
        groups: &mut Vec<FileGroup>,
        content: &mut Vec<ContentEntry>,
    ) -> PackResult<()> {
        let Some(logo) = self.ctx.content.logo(container)? else {
            return Ok(());
        };
        let zero_filled = match self.check_access(&logo, true, params.unauthorized()?)? {
            Access::Readable => false,
            Access::ZeroFilled => true,
            Access::Withheld => return Ok(()),
        };
        let entry = self.file_entry(&logo, zero_filled, params)?;
        root.fptrs.push(file_id(&logo));
        groups.push(FileGroup {
            id: Some(ids.next_id("group")),
            usage: Some(LOGO_GROUP.to_string()),
            files: vec![entry],
        });
        content.push(ContentEntry {
            name: archive_entry_name(&logo),
            bitstream: logo.id,
            zero_filled,
        });
        Ok(())
    }

    fn child_div(
        &self,
        child: ObjectId,
        params: &PackageParameters,
        ids: &mut IdGenerator,
    ) -> PackResult<Div> {
        let kind = self.ctx.content.object_type(child)?;
        let handle = self.ctx.identifiers.handle_of(child)?;
        let mut mptrs = Vec::new();
        if let Some(handle) = &handle {
            mptrs.push(Mptr::handle(handle.clone()));
        }
        mptrs.push(Mptr::url(package_name(
            kind,
            handle.as_deref(),
            child,
            package_extension(params.manifest_only()),
        )));
        Ok(Div {
            id: Some(ids.next_id("div")),
            div_type: Some(kind.mets_type()),
            mptrs,
            ..Default::default()
        })
    }
}

fn file_id(bitstream: &Bitstream) -> String {
    match bitstream.sequence_id {
        Some(seq) => format!("bitstream_{seq}"),
        None => format!("bitstream_id_{}", bitstream.id),
    }
}

fn group_id(bitstream: &Bitstream) -> String {
    format!("GROUP_{}", file_id(bitstream))
}

/// The original a derivative was made from: the recorded link first, then
/// the name with its last extension removed (`fig1.jpg.txt` -> `fig1.jpg`).
fn derivative_source<'b>(
    bitstream: &Bitstream,
    by_id: &HashMap<ObjectId, &'b Bitstream>,
    by_name: &HashMap<&str, &'b Bitstream>,
) -> Option<&'b Bitstream> {
    if let Some(original) = bitstream.derived_from.and_then(|id| by_id.get(&id).copied()) {
        return Some(original);
    }
    let (stem, _) = bitstream.name.rsplit_once('.')?;
    by_name.get(stem).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::{ContentService, IdentifierService, MetadataValue},
        memory::MemoryRepository,
        params::{MANIFEST_ONLY, UNAUTHORIZED},
    };

    struct Fixture {
        repo: MemoryRepository,
        collection: ObjectId,
        item: ObjectId,
    }

    fn fixture() -> Fixture {
        let repo = MemoryRepository::new();
        let community = repo.create_object(ObjectType::Community, repo.site()).unwrap();
        repo.register(community, None).unwrap();
        let collection = repo.create_object(ObjectType::Collection, community).unwrap();
        repo.register(collection, None).unwrap();
        let item = repo.create_object(ObjectType::Item, collection).unwrap();
        repo.register(item, None).unwrap();
        repo.add_metadata(item, MetadataValue::new("dc", "title", None, "Lakes"))
            .unwrap();
        Fixture {
            repo,
            collection,
            item,
        }
    }

    fn disseminator<'a>(repo: &'a MemoryRepository, packager: &str) -> Disseminator<'a> {
        Disseminator::from_config(
            PackagingContext::from_repository(repo),
            &Config::default_config(),
            packager,
        )
        .unwrap()
    }

    #[test]
    fn test_item_manifest_layout() {
        let f = fixture();
        let pdf = f
            .repo
            .add_bitstream(f.item, "ORIGINAL", "thesis.pdf", b"%PDF".to_vec())
            .unwrap();
        let bundle = f.repo.bundles(f.item).unwrap()[0].clone();
        f.repo.set_primary_bitstream(bundle.id, Some(pdf.id)).unwrap();

        let built = disseminator(&f.repo, "AIP")
            .build(f.item, &PackageParameters::new())
            .unwrap();
        let doc = built.document;
        assert_eq!(doc.object_type.as_deref(), Some("DSpace ITEM"));
        assert!(doc.objid.as_deref().unwrap().starts_with("hdl:"));
        assert_eq!(doc.dmd_secs.len(), 1);

        let files = doc.content_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].bundle, "CONTENT");
        assert_eq!(files[0].href, format!("bitstream_{}.pdf", pdf.id));
        assert_eq!(files[0].file.adm_ids.len(), 1);
        assert_eq!(doc.primary_file_id().unwrap(), Some("bitstream_1"));
        assert_eq!(doc.struct_maps.len(), 2);
        assert!(doc.parent_pointer().unwrap().is_some());
        assert_eq!(built.content.len(), 1);
        doc.validate_structure().unwrap();
    }

    #[test]
    fn test_sip_excludes_bundles_and_inlines_license() {
        let f = fixture();
        f.repo
            .add_bitstream(f.item, "ORIGINAL", "a.txt", b"a".to_vec())
            .unwrap();
        f.repo
            .add_bitstream(f.item, "LICENSE", "license.txt", b"terms".to_vec())
            .unwrap();

        let params = PackageParameters::new().with(MANIFEST_ONLY, true);
        let built = disseminator(&f.repo, "SIP")
            .with_retrieval_base_url(Some("https://repo.example".into()))
            .build(f.item, &params)
            .unwrap();
        let doc = built.document;
        let groups: Vec<_> = doc
            .file_groups()
            .unwrap()
            .iter()
            .map(|g| g.usage.clone().unwrap())
            .collect();
        assert_eq!(groups, ["CONTENT"]);
        assert!(doc.content_files().unwrap()[0]
            .href
            .starts_with("https://repo.example/bitstream/"));
        assert!(built.auxiliary.is_none());
        let rights = &doc.amd_secs[0].rights_md;
        assert_eq!(rights.len(), 1);
        assert_eq!(rights[0].md_type().label(), "DSPACE_DEPLICENSE");
        assert_eq!(doc.struct_maps.len(), 1);
    }

    #[test]
    fn test_bare_manifest_needs_retrieval_base() {
        let f = fixture();
        f.repo
            .add_bitstream(f.item, "ORIGINAL", "a.txt", b"a".to_vec())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("item.xml");

        let params = PackageParameters::new().with(MANIFEST_ONLY, true);
        let err = disseminator(&f.repo, "AIP")
            .disseminate(f.item, &params, &target)
            .unwrap_err();
        assert!(matches!(err, PackError::Configuration(_)));
        assert!(!target.exists());
    }

    #[test]
    fn test_disseminate_creates_missing_directories() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports").join("2024").join("item.zip");

        disseminator(&f.repo, "AIP")
            .disseminate(f.item, &PackageParameters::new(), &target)
            .unwrap();
        assert!(target.is_file());
    }

    #[test]
    fn test_zero_fill_keeps_entry_without_integrity_claim() {
        let f = fixture();
        let secret = f
            .repo
            .add_bitstream(f.item, "ORIGINAL", "secret.pdf", b"classified".to_vec())
            .unwrap();
        f.repo.deny_read(secret.id);

        let params = PackageParameters::new().with(UNAUTHORIZED, "zero");
        let built = disseminator(&f.repo, "AIP").build(f.item, &params).unwrap();
        let files = built.document.content_files().unwrap();
        assert_eq!(files[0].file.size, Some(0));
        assert_eq!(files[0].file.checksum.as_deref(), Some(EMPTY_MD5));
        assert_eq!(files[0].file.mime_type.as_deref(), Some("application/pdf"));
        assert!(files[0].file.adm_ids.is_empty());
        assert!(built.content[0].zero_filled);
    }

    #[test]
    fn test_collection_lists_template_and_items() {
        let f = fixture();
        let template = f.repo.create_template_item(f.collection).unwrap();
        f.repo
            .add_metadata(template, MetadataValue::new("dc", "publisher", None, "Press"))
            .unwrap();

        let built = disseminator(&f.repo, "AIP")
            .build(f.collection, &PackageParameters::new())
            .unwrap();
        let doc = built.document;
        let children = doc.child_divisions().unwrap();
        assert_eq!(children[0].div_type.as_deref(), Some(TEMPLATE_DIV));
        assert_eq!(children[0].dmd_ids.len(), 1);
        let refs = doc.child_package_references().unwrap();
        assert_eq!(refs.len(), 1);
        let handle = f.repo.handle_of(f.item).unwrap().unwrap();
        assert_eq!(refs[0].handle, Some(handle.as_str()));
        assert_eq!(refs[0].href, format!("ITEM@{}.zip", handle.replace('/', "-")));
    }

    #[test]
    fn test_failed_dissemination_leaves_no_file() {
        let f = fixture();
        let secret = f
            .repo
            .add_bitstream(f.item, "ORIGINAL", "secret.pdf", b"x".to_vec())
            .unwrap();
        f.repo.deny_read(secret.id);

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("item.zip");
        let err = disseminator(&f.repo, "AIP")
            .disseminate(f.item, &PackageParameters::new(), &target)
            .unwrap_err();
        assert!(matches!(err, PackError::Authorization(_)));
        assert!(!target.exists());
    }

    #[test]
    fn test_bundles_cannot_be_packaged() {
        let f = fixture();
        let bundle = f.repo.create_bundle(f.item, "ORIGINAL").unwrap();
        assert!(disseminator(&f.repo, "AIP")
            .build(bundle.id, &PackageParameters::new())
            .is_err());
    }

    #[test]
    fn test_derivative_source_matching() {
        let mut original = Bitstream {
            id: ObjectId(10),
            name: "fig1.jpg".into(),
            sequence_id: Some(1),
            size: 1,
            checksum: String::new(),
            checksum_algorithm: MD5.into(),
            format: crate::content::BitstreamFormat::unknown(),
            derived_from: None,
        };
        let mut text = original.clone();
        text.id = ObjectId(11);
        text.name = "fig1.jpg.txt".into();
        text.sequence_id = Some(2);

        let originals = [original.clone()];
        let by_id: HashMap<_, _> = originals.iter().map(|b| (b.id, b)).collect();
        let by_name: HashMap<_, _> = originals.iter().map(|b| (b.name.as_str(), b)).collect();
        assert_eq!(
            derivative_source(&text, &by_id, &by_name).map(|b| b.id),
            Some(ObjectId(10))
        );

        text.name = "renamed.txt".into();
        assert!(derivative_source(&text, &by_id, &by_name).is_none());
        text.derived_from = Some(ObjectId(10));
        assert_eq!(group_id(derivative_source(&text, &by_id, &by_name).unwrap()), "GROUP_bitstream_1");

        original.sequence_id = None;
        assert_eq!(file_id(&original), "bitstream_id_10");
    }
}
