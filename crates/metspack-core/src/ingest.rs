//! Reading a METS package back into the repository.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use metspack_config::config::Config;
use metspack_events::{EventSinkHandle, NullSink, PackEvent, SkipReason};
use metspack_mets::{AdminKind, ContentFile, MdSection, MetsDocument};
use metspack_utils::path::resolve_reference;
use tracing::{debug, info, warn};

use crate::{
    content::{Bundle, ObjectId, ObjectType, PackagingContext},
    crosswalk::{add_license, CrosswalkRegistry},
    dispatch::CrosswalkDispatcher,
    disseminate::{ORIGINAL_BUNDLE, TEMPLATE_DIV},
    error::{PackError, PackResult},
    http::FetchClient,
    package::{verify_checksum, PackageReader, ReferenceResolver},
    params::{PackageParameters, RESTORE_MODE},
    profile::{profile_for, PackagingProfile},
};

const METADATA_BUNDLE: &str = "METADATA";
const LICENSE_CROSSWALK: &str = "DSPACE_DEPLICENSE";

/// Source metadata goes first so submitter identity is known before the rest.
const ADMIN_ORDER: [AdminKind; 4] = [
    AdminKind::Source,
    AdminKind::Tech,
    AdminKind::DigiProv,
    AdminKind::Rights,
];

/// What one ingest or replace produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub object: ObjectId,
    pub object_type: ObjectType,
    pub handle: Option<String>,
    /// Child packages referenced by the manifest, resolved against its location.
    pub child_packages: Vec<PathBuf>,
}

/// Creates or overwrites repository objects from packages of one profile.
pub struct Ingester<'a> {
    ctx: PackagingContext<'a>,
    registry: CrosswalkRegistry,
    profile: Arc<dyn PackagingProfile>,
    fetch: FetchClient,
    events: EventSinkHandle,
}

impl<'a> Ingester<'a> {
    pub fn new(
        ctx: PackagingContext<'a>,
        registry: CrosswalkRegistry,
        profile: Arc<dyn PackagingProfile>,
        fetch: FetchClient,
    ) -> Self {
        Self {
            ctx,
            registry,
            profile,
            fetch,
            events: Arc::new(NullSink),
        }
    }

    pub fn from_config(
        ctx: PackagingContext<'a>,
        config: &Config,
        packager: &str,
    ) -> PackResult<Self> {
        Ok(Self::new(
            ctx,
            CrosswalkRegistry::from_config(config),
            profile_for(config, packager)?,
            FetchClient::from_config(config)?,
        ))
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
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

    /// Parses a package and checks it against this ingester's profile.
    fn open(
        &self,
        package: &Path,
        params: &PackageParameters,
    ) -> PackResult<(PackageReader, MetsDocument, ObjectType)> {
        let mut reader = PackageReader::open(package, self.fetch.clone())?;
        let document = reader.read_document()?;
        if params.validate() {
            document.validate_structure()?;
        }
        document.check_profile(self.profile.profile_string())?;

        let label = document.object_type_label()?;
        let kind = ObjectType::from_mets_type(label).ok_or_else(|| {
            PackError::validation(format!("unknown object type `{label}` in manifest"))
        })?;
        Ok((reader, document, kind))
    }

    /// Creates a new object from `package`.
    ///
    /// Returns `None` when the package was skipped because its parent is not
    /// in the repository and the parameters allow skipping.
    pub fn ingest(
        &self,
        parent: Option<ObjectId>,
        package: &Path,
        params: &PackageParameters,
        license: Option<&[u8]>,
    ) -> PackResult<Option<IngestOutcome>> {
        self.events.emit(PackEvent::Ingesting {
            package: package.to_path_buf(),
        });
        let (mut reader, document, kind) = self.open(package, params)?;
        if !kind.is_container() && kind != ObjectType::Item {
            return Err(PackError::validation(format!(
                "a {kind} cannot be created from a package"
            )));
        }

        let Some(parent) = self.resolve_parent(&document, parent, kind, params)? else {
            let pointer = document.parent_pointer()?.map(str::to_string);
            warn!(
                parent = pointer.as_deref().unwrap_or("-"),
                "parent of {} is not in the repository, skipping",
                package.display()
            );
            self.events.emit(PackEvent::Skipped {
                package: package.to_path_buf(),
                reason: SkipReason::ParentUnresolved { parent: pointer },
            });
            return Ok(None);
        };

        let wanted_handle = if params.ignore_handle() {
            None
        } else {
            document.handle()
        };
        if let Some(handle) = wanted_handle {
            if self.ctx.identifiers.resolve(handle)?.is_some() {
                return Err(PackError::ObjectExists(handle.to_string()));
            }
        }

        info!(
            parent = %self.ctx.describe(parent),
            "ingesting {kind} from {}",
            package.display()
        );
        let object = self.ctx.content.create_object(kind, parent)?;
        self.populate(&document, &mut reader, object, kind, params)?;
        let handle = self.ctx.identifiers.register(object, wanted_handle)?;

        if kind == ObjectType::Item {
            if self.profile.config().preserve_manifest() {
                self.preserve_manifest(&mut reader, object)?;
            }
            if let Some(license) = license {
                add_license(&self.ctx, object, license.to_vec()).map_err(|source| {
                    PackError::Crosswalk {
                        name: LICENSE_CROSSWALK.to_string(),
                        source,
                    }
                })?;
            }
            self.ctx
                .content
                .finish_item(object, self.profile.finish_mode(params))?;
        }
        self.ctx.content.update(object)?;

        let outcome = IngestOutcome {
            object,
            object_type: kind,
            handle: Some(handle),
            child_packages: child_packages(&document, package, params)?,
        };
        self.events.emit(PackEvent::Ingested {
            package: package.to_path_buf(),
            object_type: kind.label().to_string(),
            handle: outcome.handle.clone(),
            replaced: false,
        });
        Ok(Some(outcome))
    }

    /// Overwrites an existing object with the contents of `package`.
    ///
    /// Without a `target` the manifest's handle picks the object; when that
    /// handle is unknown the package is restored as a new object instead.
    /// Access policies and workflow state of the target are left alone.
    pub fn replace(
        &self,
        target: Option<ObjectId>,
        package: &Path,
        params: &PackageParameters,
    ) -> PackResult<Option<IngestOutcome>> {
        let (mut reader, document, kind) = self.open(package, params)?;

        let target = match target {
            Some(target) => target,
            None => {
                let handle = document.handle().ok_or_else(|| {
                    PackError::validation("no replace target given and the manifest has no handle")
                })?;
                match self.ctx.identifiers.resolve(handle)? {
                    Some(found) => found,
                    None => {
                        info!(handle, "nothing to replace, restoring {}", package.display());
                        let restore = params.clone().with(RESTORE_MODE, true);
                        return self.ingest(None, package, &restore, None);
                    }
                }
            }
        };
        self.events.emit(PackEvent::Ingesting {
            package: package.to_path_buf(),
        });

        let existing = self.ctx.content.object_type(target)?;
        if existing != kind {
            return Err(PackError::validation(format!(
                "cannot replace {} ({existing}) with a {kind} package",
                self.ctx.describe(target)
            )));
        }

        info!(target = %self.ctx.describe(target), "replacing {kind} from {}", package.display());
        self.ctx.content.clear_metadata(target)?;
        self.ctx.content.remove_all_content(target)?;
        self.populate(&document, &mut reader, target, kind, params)?;
        self.ctx.content.update(target)?;

        let outcome = IngestOutcome {
            object: target,
            object_type: kind,
            handle: self.ctx.identifiers.handle_of(target)?,
            child_packages: child_packages(&document, package, params)?,
        };
        self.events.emit(PackEvent::Ingested {
            package: package.to_path_buf(),
            object_type: kind.label().to_string(),
            handle: outcome.handle.clone(),
            replaced: true,
        });
        Ok(Some(outcome))
    }

    fn resolve_parent(
        &self,
        document: &MetsDocument,
        given: Option<ObjectId>,
        kind: ObjectType,
        params: &PackageParameters,
    ) -> PackResult<Option<ObjectId>> {
        if let Some(parent) = given {
            if params.ignore_parent(true) {
                return Ok(Some(parent));
            }
        }
        let pointer = document.parent_pointer()?;
        if let Some(handle) = pointer {
            if let Some(found) = self.ctx.identifiers.resolve(handle)? {
                return Ok(Some(found));
            }
        }
        if given.is_some() {
            return Ok(given);
        }
        if pointer.is_none() && kind == ObjectType::Community {
            return Ok(Some(self.ctx.content.site_root()?));
        }
        if params.skip_if_parent_missing() {
            return Ok(None);
        }
        Err(PackError::ParentUnresolved(
            pointer
                .unwrap_or("no parent given and the manifest has no Parent pointer")
                .to_string(),
        ))
    }

    /// Crosswalks metadata and attaches content to a created or emptied object.
    fn populate(
        &self,
        document: &MetsDocument,
        reader: &mut PackageReader,
        object: ObjectId,
        kind: ObjectType,
        params: &PackageParameters,
    ) -> PackResult<()> {
        let dispatcher = CrosswalkDispatcher::new(&self.registry);

        let adm_ids = document.admin_section_ids()?;
        for admin in ADMIN_ORDER {
            for section in document.admin_sections_of(adm_ids, admin)? {
                dispatcher.ingest_section(
                    &self.ctx,
                    object,
                    section,
                    reader,
                    params,
                    self.profile.admin_types(admin),
                )?;
            }
        }

        let dmd = document.dmd_sections_of(document.descriptive_section_ids()?)?;
        self.ingest_descriptive(&dispatcher, object, &dmd, reader, params)?;

        match kind {
            ObjectType::Item => {
                let has_title = self
                    .ctx
                    .content
                    .metadata(object)?
                    .iter()
                    .any(|v| v.is_field("dc", "title", None));
                if !has_title {
                    return Err(PackError::validation(format!(
                        "ingested item has no dc.title after crosswalking {}",
                        dmd.iter()
                            .map(|s| s.md_type().label())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }
                self.attach_content(&dispatcher, document, reader, object, params)?;
            }
            ObjectType::Collection | ObjectType::Community => {
                self.attach_logo(document, reader, object)?;
                if kind == ObjectType::Collection {
                    self.attach_template(&dispatcher, document, reader, object, params)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies the preferred descriptive section, then every section outside
    /// its group. Sections in the same group are alternates of it.
    fn ingest_descriptive(
        &self,
        dispatcher: &CrosswalkDispatcher<'_>,
        object: ObjectId,
        sections: &[&MdSection],
        reader: &mut PackageReader,
        params: &PackageParameters,
    ) -> PackResult<()> {
        let Some(primary) = self.profile.select_primary_dmd(sections, params) else {
            return Ok(());
        };
        let specs = self.profile.dmd_types(params);
        dispatcher.ingest_section(&self.ctx, object, primary, reader, params, specs)?;

        for section in sections {
            if section.id == primary.id {
                continue;
            }
            if section.group_id.is_some() && section.group_id == primary.group_id {
                debug!(section = %section.id, "skipping alternate of {}", primary.id);
                continue;
            }
            dispatcher.ingest_section(&self.ctx, object, section, reader, params, specs)?;
        }
        Ok(())
    }

    fn attach_content(
        &self,
        dispatcher: &CrosswalkDispatcher<'_>,
        document: &MetsDocument,
        reader: &mut PackageReader,
        item: ObjectId,
        params: &PackageParameters,
    ) -> PackResult<()> {
        let primary = document.primary_file_id()?;
        let mut primary_found = false;
        let mut bundles: HashMap<String, Bundle> = self
            .ctx
            .content
            .bundles(item)?
            .into_iter()
            .map(|b| (b.name.clone(), b))
            .collect();
        let mut originals: HashMap<String, ObjectId> = HashMap::new();
        let mut derivatives: Vec<(ObjectId, String)> = Vec::new();

        for file in document.content_files()? {
            let bundle_name = file.bundle_name();
            let bundle = match bundles.get(&bundle_name) {
                Some(bundle) => bundle.clone(),
                None => {
                    let bundle = self.ctx.content.create_bundle(item, &bundle_name)?;
                    bundles.insert(bundle_name.clone(), bundle.clone());
                    bundle
                }
            };

            let id = self.store_file(dispatcher, document, reader, &file, bundle.id, params)?;

            if let Some(group) = &file.file.group_id {
                if bundle_name == ORIGINAL_BUNDLE {
                    originals.insert(group.clone(), id);
                } else {
                    derivatives.push((id, group.clone()));
                }
            }
            if primary.is_some() && file.file.id.as_deref() == primary {
                self.ctx.content.set_primary_bitstream(bundle.id, Some(id))?;
                primary_found = true;
            }
        }

        for (derivative, group) in derivatives {
            if let Some(original) = originals.get(&group) {
                let mut bitstream = self.ctx.content.bitstream(derivative)?;
                bitstream.derived_from = Some(*original);
                self.ctx.content.update_bitstream(&bitstream)?;
            }
        }

        if let (Some(primary), false) = (primary, primary_found) {
            warn!(primary, "primary bitstream is not among the ingested files");
        }
        Ok(())
    }

    /// Stores one content file with its technical metadata and returns the new bitstream.
    fn store_file(
        &self,
        dispatcher: &CrosswalkDispatcher<'_>,
        document: &MetsDocument,
        reader: &mut PackageReader,
        file: &ContentFile<'_>,
        bundle: ObjectId,
        params: &PackageParameters,
    ) -> PackResult<ObjectId> {
        let bytes = reader.read_reference(file.href)?;
        verify_checksum(file.file, file.href, &bytes)?;

        let name = file.href.rsplit('/').next().unwrap_or(file.href);
        let mut bitstream = self.ctx.content.create_bitstream(bundle, name, bytes)?;
        if let Some(seq) = file.file.seq {
            bitstream.sequence_id = Some(seq);
            self.ctx.content.update_bitstream(&bitstream)?;
        }

        for admin in ADMIN_ORDER {
            let specs = match admin {
                AdminKind::Tech => self.profile.bitstream_tech_md_types(),
                other => self.profile.admin_types(other),
            };
            for section in document.admin_sections_of(&file.file.adm_ids, admin)? {
                dispatcher.ingest_section(&self.ctx, bitstream.id, section, reader, params, specs)?;
            }
        }

        let mut bitstream = self.ctx.content.bitstream(bitstream.id)?;
        if bitstream.format.is_unknown() {
            let guessed = match file.file.mime_type.as_deref() {
                Some(mime) => self.ctx.content.format_for_mime(mime)?,
                None => None,
            };
            let guessed = match guessed {
                Some(format) => Some(format),
                None => self.ctx.content.format_for_filename(&bitstream.name)?,
            };
            if let Some(format) = guessed {
                bitstream.format = format;
                self.ctx.content.update_bitstream(&bitstream)?;
            }
        }
        Ok(bitstream.id)
    }

    fn attach_logo(
        &self,
        document: &MetsDocument,
        reader: &mut PackageReader,
        container: ObjectId,
    ) -> PackResult<()> {
        let Some(logo_id) = document.primary_file_id()? else {
            return Ok(());
        };
        let files = document.content_files()?;
        let Some(logo) = files.iter().find(|f| f.file.id.as_deref() == Some(logo_id)) else {
            warn!(logo = logo_id, "logo file is not in the manifest");
            return Ok(());
        };
        let bytes = reader.read_reference(logo.href)?;
        let name = logo.href.rsplit('/').next().unwrap_or(logo.href);
        self.ctx.content.set_logo(container, name, bytes)?;
        Ok(())
    }

    fn attach_template(
        &self,
        dispatcher: &CrosswalkDispatcher<'_>,
        document: &MetsDocument,
        reader: &mut PackageReader,
        collection: ObjectId,
        params: &PackageParameters,
    ) -> PackResult<()> {
        if !self.profile.config().use_collection_template() {
            return Ok(());
        }
        let Some(div) = document
            .child_divisions()?
            .iter()
            .find(|d| d.div_type.as_deref() == Some(TEMPLATE_DIV))
        else {
            if self.ctx.content.remove_template_item(collection)? {
                debug!(collection = %self.ctx.describe(collection), "dropped template item");
            }
            return Ok(());
        };
        let template = self.ctx.content.create_template_item(collection)?;
        let specs = self.profile.dmd_types(params);
        for section in document.dmd_sections_of(&div.dmd_ids)? {
            dispatcher.ingest_section(&self.ctx, template, section, reader, params, specs)?;
        }
        Ok(())
    }

    fn preserve_manifest(&self, reader: &mut PackageReader, item: ObjectId) -> PackResult<()> {
        let bundle = match self
            .ctx
            .content
            .bundles(item)?
            .into_iter()
            .find(|b| b.name == METADATA_BUNDLE)
        {
            Some(bundle) => bundle,
            None => self.ctx.content.create_bundle(item, METADATA_BUNDLE)?,
        };
        let mut bitstream = self.ctx.content.create_bitstream(
            bundle.id,
            metspack_mets::MANIFEST_FILE,
            reader.manifest_bytes()?,
        )?;
        let format_name = self.profile.config().manifest_bitstream_format();
        match self.ctx.content.format_by_short_name(format_name)? {
            Some(format) => {
                bitstream.format = format;
                self.ctx.content.update_bitstream(&bitstream)?;
            }
            None => warn!(format = format_name, "unknown format for the preserved manifest"),
        }
        Ok(())
    }
}

/// Packages referenced by `mptr`, collected only for recursive runs.
fn child_packages(
    document: &MetsDocument,
    package: &Path,
    params: &PackageParameters,
) -> PackResult<Vec<PathBuf>> {
    if !params.recursive() {
        return Ok(Vec::new());
    }
    Ok(document
        .child_package_references()?
        .iter()
        .map(|child| resolve_reference(package, child.href))
        .collect())
}
