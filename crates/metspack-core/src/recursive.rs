//! Whole-tree dissemination and ingestion.
//!
//! Each walk owns its own visited set; nothing is shared between top-level
//! calls.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use metspack_events::{EventSinkHandle, PackEvent, SkipReason};
use metspack_utils::fs::ensure_dir_exists;
use tracing::{debug, info, warn};

use crate::{
    content::{ObjectId, ObjectType},
    disseminate::Disseminator,
    error::{PackError, PackResult},
    ingest::{IngestOutcome, Ingester},
    params::{PackageParameters, RECURSIVE},
};

#[derive(Default)]
struct Batch {
    completed: u32,
    skipped: u32,
}

impl Batch {
    fn complete(&mut self, events: &EventSinkHandle) {
        self.completed += 1;
        self.report(events);
    }

    fn skip(&mut self, events: &EventSinkHandle) {
        self.skipped += 1;
        self.report(events);
    }

    fn report(&self, events: &EventSinkHandle) {
        events.emit(PackEvent::BatchProgress {
            completed: self.completed,
            skipped: self.skipped,
        });
    }
}

impl Disseminator<'_> {
    /// Writes `object` to `target` and every descendant beside it.
    ///
    /// Objects reachable along more than one path, such as items mapped into
    /// several collections, are written once. Returns the written paths in
    /// the order they were produced.
    pub fn disseminate_all(
        &self,
        object: ObjectId,
        params: &PackageParameters,
        target: &Path,
    ) -> PackResult<Vec<PathBuf>> {
        let dir = target.parent().unwrap_or(Path::new("."));
        ensure_dir_exists(dir)?;
        let params = params.clone().with(RECURSIVE, true);
        let mut written = HashSet::new();
        let mut batch = Batch::default();
        let mut packages = Vec::new();
        self.disseminate_tree(
            object,
            &params,
            target.to_path_buf(),
            dir,
            &mut written,
            &mut batch,
            &mut packages,
        )?;
        info!(
            written = batch.completed,
            skipped = batch.skipped,
            "recursive dissemination finished"
        );
        Ok(packages)
    }

    #[allow(clippy::too_many_arguments)]
    fn disseminate_tree(
        &self,
        object: ObjectId,
        params: &PackageParameters,
        target: PathBuf,
        dir: &Path,
        written: &mut HashSet<PathBuf>,
        batch: &mut Batch,
        packages: &mut Vec<PathBuf>,
    ) -> PackResult<()> {
        if !written.insert(target.clone()) {
            debug!("{} already written, skipping", target.display());
            self.events().emit(PackEvent::Skipped {
                package: target,
                reason: SkipReason::AlreadyWritten,
            });
            batch.skip(self.events());
            return Ok(());
        }

        self.disseminate(object, params, &target)?;
        packages.push(target);
        batch.complete(self.events());

        let content = self.context().content;
        if content.object_type(object)? == ObjectType::Item {
            return Ok(());
        }
        for child in content.children(object)? {
            let child_target = dir.join(self.package_name(child, params)?);
            self.disseminate_tree(child, params, child_target, dir, written, batch, packages)?;
        }
        Ok(())
    }
}

enum Mode {
    Ingest,
    Replace,
}

impl Ingester<'_> {
    /// Ingests `package` and then every child package it points to.
    ///
    /// Returns the created objects. Under keep-existing mode a package whose
    /// handle is already taken is skipped along with its children.
    pub fn ingest_all(
        &self,
        parent: Option<ObjectId>,
        package: &Path,
        params: &PackageParameters,
    ) -> PackResult<Vec<ObjectId>> {
        self.walk(Mode::Ingest, parent, package, params)
    }

    /// Replaces the objects described by `package` and its children.
    ///
    /// Packages whose handle is unknown are restored instead.
    pub fn replace_all(
        &self,
        parent: Option<ObjectId>,
        package: &Path,
        params: &PackageParameters,
    ) -> PackResult<Vec<ObjectId>> {
        self.walk(Mode::Replace, parent, package, params)
    }

    fn walk(
        &self,
        mode: Mode,
        parent: Option<ObjectId>,
        package: &Path,
        params: &PackageParameters,
    ) -> PackResult<Vec<ObjectId>> {
        let params = params.clone().with(RECURSIVE, true);
        let mut visited = HashMap::new();
        let mut batch = Batch::default();
        let mut objects = Vec::new();
        self.walk_tree(
            &mode,
            parent,
            package,
            &params,
            &mut visited,
            &mut batch,
            &mut objects,
        )?;
        info!(
            processed = batch.completed,
            skipped = batch.skipped,
            "recursive ingest finished"
        );
        Ok(objects)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_tree(
        &self,
        mode: &Mode,
        parent: Option<ObjectId>,
        package: &Path,
        params: &PackageParameters,
        visited: &mut HashMap<PathBuf, ObjectId>,
        batch: &mut Batch,
        objects: &mut Vec<ObjectId>,
    ) -> PackResult<()> {
        if let Some(&existing) = visited.get(package) {
            if let Some(parent) = parent {
                self.map_item(parent, existing)?;
            }
            return Ok(());
        }

        let result = match mode {
            Mode::Ingest => match self.ingest(parent, package, params, None) {
                Err(PackError::ObjectExists(handle)) if params.replace_mode() => {
                    info!(handle, "{} already exists, replacing it", package.display());
                    self.replace(None, package, params)
                }
                other => other,
            },
            Mode::Replace => self.replace(None, package, params),
        };
        let outcome = match result {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                batch.skip(self.events());
                return Ok(());
            }
            Err(PackError::ObjectExists(handle)) if params.keep_existing_mode() => {
                warn!(handle, "{} already exists, keeping it", package.display());
                self.events().emit(PackEvent::Skipped {
                    package: package.to_path_buf(),
                    reason: SkipReason::AlreadyExists { handle },
                });
                batch.skip(self.events());
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let IngestOutcome {
            object,
            child_packages,
            ..
        } = outcome;
        visited.insert(package.to_path_buf(), object);
        objects.push(object);
        batch.complete(self.events());
        if let Some(parent) = parent {
            self.map_item(parent, object)?;
        }

        for child in child_packages {
            self.walk_tree(mode, Some(object), &child, params, visited, batch, objects)?;
        }
        Ok(())
    }

    /// Makes sure an item reached from a collection package is a member of it.
    fn map_item(&self, collection: ObjectId, item: ObjectId) -> PackResult<()> {
        let content = self.context().content;
        if content.object_type(collection)? != ObjectType::Collection
            || content.object_type(item)? != ObjectType::Item
        {
            return Ok(());
        }
        if content.add_item_mapping(collection, item)? {
            let identifiers = self.context().identifiers;
            info!(
                item = %self.context().describe(item),
                collection = %self.context().describe(collection),
                "mapped item into collection"
            );
            self.events().emit(PackEvent::Mapped {
                item_handle: identifiers.handle_of(item)?,
                collection_handle: identifiers.handle_of(collection)?,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metspack_config::config::Config;
    use metspack_events::CollectorSink;

    use super::*;
    use crate::{
        content::{ContentService, IdentifierService, MetadataValue, PackagingContext},
        memory::MemoryRepository,
        params::{REPLACE_MODE, RESTORE_MODE},
    };

    fn titled(repo: &MemoryRepository, kind: ObjectType, parent: ObjectId, title: &str) -> ObjectId {
        let id = repo.create_object(kind, parent).unwrap();
        repo.register(id, None).unwrap();
        repo.add_metadata(id, MetadataValue::new("dc", "title", None, title))
            .unwrap();
        id
    }

    #[test]
    fn test_disseminate_all_writes_mapped_item_once() {
        let repo = MemoryRepository::new();
        let community = titled(&repo, ObjectType::Community, repo.site(), "Science");
        let first = titled(&repo, ObjectType::Collection, community, "Maps");
        let second = titled(&repo, ObjectType::Collection, community, "Charts");
        let item = titled(&repo, ObjectType::Item, first, "Coastline");
        repo.add_item_mapping(second, item).unwrap();

        let events = Arc::new(CollectorSink::default());
        let disseminator = Disseminator::from_config(
            PackagingContext::from_repository(&repo),
            &Config::default_config(),
            "AIP",
        )
        .unwrap()
        .with_events(events.clone());

        let dir = tempfile::tempdir().unwrap();
        let params = PackageParameters::new();
        let target = dir.path().join(disseminator.package_name(community, &params).unwrap());
        let written = disseminator
            .disseminate_all(community, &params, &target)
            .unwrap();

        assert_eq!(written.len(), 4);
        assert_eq!(written[0], target);
        assert!(written.iter().all(|p| p.exists()));
        let skips = events.skips();
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].1, SkipReason::AlreadyWritten);
        assert_eq!(events.progress(), Some((4, 1)));
    }

    #[test]
    fn test_ingest_all_restores_tree_and_mappings() {
        let source = MemoryRepository::new();
        let community = titled(&source, ObjectType::Community, source.site(), "Science");
        let first = titled(&source, ObjectType::Collection, community, "Maps");
        let second = titled(&source, ObjectType::Collection, community, "Charts");
        let item = titled(&source, ObjectType::Item, first, "Coastline");
        source.add_item_mapping(second, item).unwrap();

        let config = Config::default_config();
        let disseminator = Disseminator::from_config(
            PackagingContext::from_repository(&source),
            &config,
            "AIP",
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let params = PackageParameters::new();
        let target = dir.path().join(disseminator.package_name(community, &params).unwrap());
        disseminator
            .disseminate_all(community, &params, &target)
            .unwrap();

        let restored = MemoryRepository::new();
        let ingester = Ingester::from_config(
            PackagingContext::from_repository(&restored),
            &config,
            "AIP",
        )
        .unwrap();
        let restore = PackageParameters::new().with(RESTORE_MODE, true);
        let objects = ingester.ingest_all(None, &target, &restore).unwrap();
        assert_eq!(objects.len(), 4);

        let item_handle = source.handle_of(item).unwrap().unwrap();
        let copy = restored.resolve(&item_handle).unwrap().unwrap();
        assert_eq!(restored.mapped_collections(copy).len(), 1);
    }

    #[test]
    fn test_replace_mode_overwrites_existing_tree() {
        let source = MemoryRepository::new();
        let community = titled(&source, ObjectType::Community, source.site(), "Science");
        let collection = titled(&source, ObjectType::Collection, community, "Maps");
        let item = titled(&source, ObjectType::Item, collection, "Coastline");

        let config = Config::default_config();
        let disseminator = Disseminator::from_config(
            PackagingContext::from_repository(&source),
            &config,
            "AIP",
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let params = PackageParameters::new();
        let target = dir.path().join(disseminator.package_name(community, &params).unwrap());
        disseminator
            .disseminate_all(community, &params, &target)
            .unwrap();

        let restored = MemoryRepository::new();
        let events = Arc::new(CollectorSink::default());
        let ingester = Ingester::from_config(
            PackagingContext::from_repository(&restored),
            &config,
            "AIP",
        )
        .unwrap()
        .with_events(events.clone());
        let restore = PackageParameters::new().with(RESTORE_MODE, true);
        let first = ingester.ingest_all(None, &target, &restore).unwrap();

        let item_handle = source.handle_of(item).unwrap().unwrap();
        let copy = restored.resolve(&item_handle).unwrap().unwrap();
        restored
            .add_metadata(copy, MetadataValue::new("dc", "subject", None, "Stale"))
            .unwrap();
        assert!(ingester
            .ingest_all(None, &target, &restore)
            .unwrap_err()
            .is_object_exists());

        let replace = restore.with(REPLACE_MODE, true);
        let again = ingester.ingest_all(None, &target, &replace).unwrap();
        assert_eq!(again, first);
        assert!(!restored
            .metadata(copy)
            .unwrap()
            .iter()
            .any(|value| value.value == "Stale"));
        assert!(events.skips().is_empty());
        assert_eq!(events.progress(), Some((3, 0)));
    }
}
