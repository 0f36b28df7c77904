//! An in-memory repository implementing every collaborator interface.
//!
//! Used by the test suites and by tools that want to inspect what a package
//! would produce without a real repository behind it.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::RwLock,
};

use chrono::{DateTime, Duration, Utc};
use metspack_utils::hash::{checksum_bytes, MD5};

use crate::{
    content::*,
    error::{PackError, PackResult},
};

const DEFAULT_HANDLE_PREFIX: &str = "123456789";

/// Start of the logical clock (2024-01-01T00:00:00Z).
const EPOCH: i64 = 1_704_067_200;

#[derive(Debug, Clone)]
struct Node {
    kind: ObjectType,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    mapped_items: Vec<ObjectId>,
    metadata: Vec<MetadataValue>,
    bundle_name: Option<String>,
    primary: Option<ObjectId>,
    bitstream: Option<(Bitstream, Vec<u8>)>,
    logo: Option<ObjectId>,
    template: Option<ObjectId>,
    finished: Option<FinishMode>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<ObjectId, Node>,
    next_id: u64,
    handles: HashMap<String, ObjectId>,
    handle_prefix: String,
    next_handle: u64,
    unreadable: HashSet<ObjectId>,
    formats: Vec<BitstreamFormat>,
    clock: DateTime<Utc>,
}

impl State {
    fn node(&self, id: ObjectId) -> PackResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| PackError::ObjectNotFound(format!("internal id {id}")))
    }

    fn node_mut(&mut self, id: ObjectId) -> PackResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| PackError::ObjectNotFound(format!("internal id {id}")))
    }

    /// Advances the logical clock by one second per mutation.
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn insert(&mut self, kind: ObjectType, parent: Option<ObjectId>) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let now = self.tick();
        self.nodes.insert(
            id,
            Node {
                kind,
                parent,
                children: Vec::new(),
                mapped_items: Vec::new(),
                metadata: Vec::new(),
                bundle_name: None,
                primary: None,
                bitstream: None,
                logo: None,
                template: None,
                finished: None,
                last_modified: now,
            },
        );
        id
    }

    fn touch(&mut self, id: ObjectId) -> PackResult<()> {
        let now = self.tick();
        self.node_mut(id)?.last_modified = now;
        Ok(())
    }

    fn new_bitstream(&mut self, owner: ObjectId, name: &str, data: Vec<u8>) -> Bitstream {
        let id = self.insert(ObjectType::Bitstream, Some(owner));
        let bitstream = Bitstream {
            id,
            name: name.to_string(),
            sequence_id: None,
            size: data.len() as u64,
            checksum: checksum_bytes(&data),
            checksum_algorithm: MD5.to_string(),
            format: BitstreamFormat::unknown(),
            derived_from: None,
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.bitstream = Some((bitstream.clone(), data));
        }
        bitstream
    }

    fn remove_tree(&mut self, id: ObjectId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.remove_tree(child);
            }
            if let Some(logo) = node.logo {
                self.nodes.remove(&logo);
            }
        }
        self.handles.retain(|_, owner| *owner != id);
    }

    /// Highest sequence id in use on the item owning `bundle`.
    fn max_sequence(&self, bundle: ObjectId) -> u32 {
        let Some(item) = self.nodes.get(&bundle).and_then(|b| b.parent) else {
            return 0;
        };
        self.nodes
            .get(&item)
            .map(|item| {
                item.children
                    .iter()
                    .filter_map(|b| self.nodes.get(b))
                    .flat_map(|b| &b.children)
                    .filter_map(|bs| self.nodes.get(bs))
                    .filter_map(|n| n.bitstream.as_ref().and_then(|(b, _)| b.sequence_id))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

/// Repository state held behind a lock so the service traits can take `&self`.
#[derive(Debug)]
pub struct MemoryRepository {
    state: RwLock<State>,
    site: ObjectId,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_handle_prefix(DEFAULT_HANDLE_PREFIX)
    }

    pub fn with_handle_prefix(prefix: &str) -> Self {
        let mut state = State {
            nodes: BTreeMap::new(),
            next_id: 1,
            handles: HashMap::new(),
            handle_prefix: prefix.to_string(),
            next_handle: 1,
            unreadable: HashSet::new(),
            formats: default_formats(),
            clock: DateTime::from_timestamp(EPOCH, 0).unwrap_or_default(),
        };
        let site = state.insert(ObjectType::Site, None);
        state.handles.insert(format!("{prefix}/0"), site);
        Self {
            state: RwLock::new(state),
            site,
        }
    }

    pub fn site(&self) -> ObjectId {
        self.site
    }

    pub fn register_format(&self, format: BitstreamFormat) {
        self.state.write().unwrap().formats.push(format);
    }

    /// Makes a bundle or bitstream unreadable to the current principal.
    pub fn deny_read(&self, id: ObjectId) {
        self.state.write().unwrap().unreadable.insert(id);
    }

    pub fn set_derived_from(&self, bitstream: ObjectId, original: ObjectId) -> PackResult<()> {
        let mut state = self.state.write().unwrap();
        let node = state.node_mut(bitstream)?;
        if let Some((b, _)) = node.bitstream.as_mut() {
            b.derived_from = Some(original);
        }
        Ok(())
    }

    pub fn finish_mode(&self, item: ObjectId) -> Option<FinishMode> {
        let state = self.state.read().unwrap();
        state.nodes.get(&item).and_then(|n| n.finished)
    }

    /// Whether `id` still exists.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.state.read().unwrap().nodes.contains_key(&id)
    }

    /// Every object of `kind`, in creation order.
    pub fn objects_of_type(&self, kind: ObjectType) -> Vec<ObjectId> {
        let state = self.state.read().unwrap();
        state
            .nodes
            .iter()
            .filter(|(_, n)| n.kind == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Collections an item is mapped into without being owned by them.
    pub fn mapped_collections(&self, item: ObjectId) -> Vec<ObjectId> {
        let state = self.state.read().unwrap();
        state
            .nodes
            .iter()
            .filter(|(_, n)| n.mapped_items.contains(&item))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Adds a bitstream read from disk to a named bundle, creating the bundle.
    pub fn add_file(&self, item: ObjectId, bundle: &str, path: &Path) -> PackResult<Bitstream> {
        let data = std::fs::read(path).map_err(|err| {
            PackError::Io {
                action: format!("reading {}", path.display()),
                source: err,
            }
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add_bitstream(item, bundle, &name, data)
    }

    /// Adds a bitstream to a named bundle, creating the bundle, and guesses its format.
    pub fn add_bitstream(
        &self,
        item: ObjectId,
        bundle: &str,
        name: &str,
        data: Vec<u8>,
    ) -> PackResult<Bitstream> {
        let bundle = match self.bundles(item)?.into_iter().find(|b| b.name == bundle) {
            Some(existing) => existing,
            None => self.create_bundle(item, bundle)?,
        };
        let mut bitstream = self.create_bitstream(bundle.id, name, data)?;
        if let Some(format) = self.format_for_filename(name)? {
            bitstream.format = format;
            self.update_bitstream(&bitstream)?;
        }
        Ok(bitstream)
    }
}

fn default_formats() -> Vec<BitstreamFormat> {
    vec![
        BitstreamFormat::new("Adobe PDF", "application/pdf", &["pdf"]),
        BitstreamFormat::new("JPEG", "image/jpeg", &["jpg", "jpeg"]),
        BitstreamFormat::new("PNG", "image/png", &["png"]),
        BitstreamFormat::new("GIF", "image/gif", &["gif"]),
        BitstreamFormat::new("Text", "text/plain", &["txt", "asc"]),
        BitstreamFormat::new("License", "text/plain; charset=utf-8", &[]),
        BitstreamFormat::new("XML", "text/xml", &["xml"]),
        BitstreamFormat::new("METS", "application/xml", &[]),
        BitstreamFormat::new("HTML", "text/html", &["html", "htm"]),
    ]
}

impl ContentService for MemoryRepository {
    fn object_type(&self, id: ObjectId) -> PackResult<ObjectType> {
        Ok(self.state.read().unwrap().node(id)?.kind)
    }

    fn last_modified(&self, id: ObjectId) -> PackResult<DateTime<Utc>> {
        Ok(self.state.read().unwrap().node(id)?.last_modified)
    }

    fn site_root(&self) -> PackResult<ObjectId> {
        Ok(self.site)
    }

    fn create_object(&self, kind: ObjectType, parent: ObjectId) -> PackResult<ObjectId> {
        let mut state = self.state.write().unwrap();
        let parent_kind = state.node(parent)?.kind;
        let allowed = matches!(
            (parent_kind, kind),
            (ObjectType::Site, ObjectType::Community)
                | (ObjectType::Community, ObjectType::Community)
                | (ObjectType::Community, ObjectType::Collection)
                | (ObjectType::Collection, ObjectType::Item)
        );
        if !allowed {
            return Err(PackError::validation(format!(
                "a {kind} cannot be created inside a {parent_kind}"
            )));
        }
        let id = state.insert(kind, Some(parent));
        state.node_mut(parent)?.children.push(id);
        state.touch(parent)?;
        Ok(id)
    }

    fn create_template_item(&self, collection: ObjectId) -> PackResult<ObjectId> {
        let mut state = self.state.write().unwrap();
        if state.node(collection)?.kind != ObjectType::Collection {
            return Err(PackError::validation("template items belong to collections"));
        }
        if let Some(old) = state.node(collection)?.template {
            state.remove_tree(old);
        }
        let id = state.insert(ObjectType::Item, Some(collection));
        state.node_mut(collection)?.template = Some(id);
        Ok(id)
    }

    fn template_item(&self, collection: ObjectId) -> PackResult<Option<ObjectId>> {
        Ok(self.state.read().unwrap().node(collection)?.template)
    }

    fn remove_template_item(&self, collection: ObjectId) -> PackResult<bool> {
        let mut state = self.state.write().unwrap();
        let Some(old) = state.node_mut(collection)?.template.take() else {
            return Ok(false);
        };
        state.remove_tree(old);
        state.touch(collection)?;
        Ok(true)
    }

    fn children(&self, id: ObjectId) -> PackResult<Vec<ObjectId>> {
        let state = self.state.read().unwrap();
        let node = state.node(id)?;
        let mut children: Vec<ObjectId> = match node.kind {
            ObjectType::Site | ObjectType::Community | ObjectType::Collection => {
                node.children.clone()
            }
            _ => Vec::new(),
        };
        if node.kind == ObjectType::Community {
            // sub-communities before collections
            children.sort_by_key(|c| {
                state
                    .nodes
                    .get(c)
                    .map(|n| n.kind != ObjectType::Community)
                    .unwrap_or(true)
            });
        }
        children.extend(node.mapped_items.iter().copied());
        Ok(children)
    }

    fn parent(&self, id: ObjectId) -> PackResult<Option<ObjectId>> {
        Ok(self.state.read().unwrap().node(id)?.parent)
    }

    fn add_item_mapping(&self, collection: ObjectId, item: ObjectId) -> PackResult<bool> {
        let mut state = self.state.write().unwrap();
        if state.node(item)?.parent == Some(collection) {
            return Ok(false);
        }
        let node = state.node_mut(collection)?;
        if node.mapped_items.contains(&item) {
            return Ok(false);
        }
        node.mapped_items.push(item);
        state.touch(collection)?;
        Ok(true)
    }

    fn metadata(&self, id: ObjectId) -> PackResult<Vec<MetadataValue>> {
        Ok(self.state.read().unwrap().node(id)?.metadata.clone())
    }

    fn add_metadata(&self, id: ObjectId, value: MetadataValue) -> PackResult<()> {
        self.state.write().unwrap().node_mut(id)?.metadata.push(value);
        Ok(())
    }

    fn clear_metadata(&self, id: ObjectId) -> PackResult<()> {
        self.state.write().unwrap().node_mut(id)?.metadata.clear();
        Ok(())
    }

    fn bundles(&self, item: ObjectId) -> PackResult<Vec<Bundle>> {
        let state = self.state.read().unwrap();
        let node = state.node(item)?;
        if node.kind != ObjectType::Item {
            return Ok(Vec::new());
        }
        node.children
            .iter()
            .map(|id| {
                let bundle = state.node(*id)?;
                Ok(Bundle {
                    id: *id,
                    name: bundle.bundle_name.clone().unwrap_or_default(),
                    primary_bitstream: bundle.primary,
                })
            })
            .collect()
    }

    fn create_bundle(&self, item: ObjectId, name: &str) -> PackResult<Bundle> {
        let mut state = self.state.write().unwrap();
        if state.node(item)?.kind != ObjectType::Item {
            return Err(PackError::validation("bundles belong to items"));
        }
        let id = state.insert(ObjectType::Bundle, Some(item));
        state.node_mut(id)?.bundle_name = Some(name.to_string());
        state.node_mut(item)?.children.push(id);
        Ok(Bundle {
            id,
            name: name.to_string(),
            primary_bitstream: None,
        })
    }

    fn bitstreams(&self, bundle: ObjectId) -> PackResult<Vec<Bitstream>> {
        let state = self.state.read().unwrap();
        let node = state.node(bundle)?;
        Ok(node
            .children
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .filter_map(|n| n.bitstream.as_ref().map(|(b, _)| b.clone()))
            .collect())
    }

    fn bitstream(&self, id: ObjectId) -> PackResult<Bitstream> {
        let state = self.state.read().unwrap();
        state
            .node(id)?
            .bitstream
            .as_ref()
            .map(|(b, _)| b.clone())
            .ok_or_else(|| PackError::ObjectNotFound(format!("bitstream {id}")))
    }

    fn create_bitstream(
        &self,
        bundle: ObjectId,
        name: &str,
        data: Vec<u8>,
    ) -> PackResult<Bitstream> {
        let mut state = self.state.write().unwrap();
        if state.node(bundle)?.kind != ObjectType::Bundle {
            return Err(PackError::validation("bitstreams belong to bundles"));
        }
        let sequence = state.max_sequence(bundle) + 1;
        let mut bitstream = state.new_bitstream(bundle, name, data);
        bitstream.sequence_id = Some(sequence);
        if let Some((stored, _)) = state.node_mut(bitstream.id)?.bitstream.as_mut() {
            stored.sequence_id = Some(sequence);
        }
        state.node_mut(bundle)?.children.push(bitstream.id);
        Ok(bitstream)
    }

    fn update_bitstream(&self, bitstream: &Bitstream) -> PackResult<()> {
        let mut state = self.state.write().unwrap();
        let node = state.node_mut(bitstream.id)?;
        let Some((stored, _)) = node.bitstream.as_mut() else {
            return Err(PackError::ObjectNotFound(format!("bitstream {}", bitstream.id)));
        };
        // content-derived fields stay as computed
        let (size, checksum, algorithm) = (
            stored.size,
            stored.checksum.clone(),
            stored.checksum_algorithm.clone(),
        );
        *stored = bitstream.clone();
        stored.size = size;
        stored.checksum = checksum;
        stored.checksum_algorithm = algorithm;
        Ok(())
    }

    fn retrieve(&self, bitstream: ObjectId) -> PackResult<Vec<u8>> {
        let state = self.state.read().unwrap();
        state
            .node(bitstream)?
            .bitstream
            .as_ref()
            .map(|(_, data)| data.clone())
            .ok_or_else(|| PackError::ObjectNotFound(format!("bitstream {bitstream}")))
    }

    fn set_primary_bitstream(
        &self,
        bundle: ObjectId,
        bitstream: Option<ObjectId>,
    ) -> PackResult<()> {
        self.state.write().unwrap().node_mut(bundle)?.primary = bitstream;
        Ok(())
    }

    fn logo(&self, container: ObjectId) -> PackResult<Option<Bitstream>> {
        let state = self.state.read().unwrap();
        let Some(logo) = state.node(container)?.logo else {
            return Ok(None);
        };
        Ok(state
            .node(logo)?
            .bitstream
            .as_ref()
            .map(|(b, _)| b.clone()))
    }

    fn set_logo(&self, container: ObjectId, name: &str, data: Vec<u8>) -> PackResult<Bitstream> {
        let mut state = self.state.write().unwrap();
        if !state.node(container)?.kind.is_container() {
            return Err(PackError::validation("only collections and communities have logos"));
        }
        if let Some(old) = state.node(container)?.logo {
            state.nodes.remove(&old);
        }
        let bitstream = state.new_bitstream(container, name, data);
        state.node_mut(container)?.logo = Some(bitstream.id);
        state.touch(container)?;
        Ok(bitstream)
    }

    fn remove_all_content(&self, id: ObjectId) -> PackResult<()> {
        let mut state = self.state.write().unwrap();
        let node = state.node_mut(id)?;
        match node.kind {
            ObjectType::Item => {
                let bundles = std::mem::take(&mut node.children);
                for bundle in bundles {
                    state.remove_tree(bundle);
                }
            }
            ObjectType::Community | ObjectType::Collection => {
                if let Some(logo) = node.logo.take() {
                    state.nodes.remove(&logo);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_item(&self, item: ObjectId, mode: FinishMode) -> PackResult<()> {
        let mut state = self.state.write().unwrap();
        let node = state.node_mut(item)?;
        if node.kind != ObjectType::Item {
            return Err(PackError::validation("only items are installed"));
        }
        node.finished = Some(mode);
        Ok(())
    }

    fn update(&self, id: ObjectId) -> PackResult<()> {
        self.state.write().unwrap().touch(id)
    }

    fn format_for_mime(&self, mime_type: &str) -> PackResult<Option<BitstreamFormat>> {
        let state = self.state.read().unwrap();
        Ok(state
            .formats
            .iter()
            .find(|f| f.mime_type.eq_ignore_ascii_case(mime_type))
            .cloned())
    }

    fn format_for_filename(&self, name: &str) -> PackResult<Option<BitstreamFormat>> {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return Ok(None);
        };
        let state = self.state.read().unwrap();
        Ok(state
            .formats
            .iter()
            .find(|f| f.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .cloned())
    }

    fn format_by_short_name(&self, short_name: &str) -> PackResult<Option<BitstreamFormat>> {
        let state = self.state.read().unwrap();
        Ok(state
            .formats
            .iter()
            .find(|f| f.short_name == short_name)
            .cloned())
    }
}

impl IdentifierService for MemoryRepository {
    fn resolve(&self, handle: &str) -> PackResult<Option<ObjectId>> {
        let state = self.state.read().unwrap();
        Ok(state.handles.get(handle).copied())
    }

    fn handle_of(&self, id: ObjectId) -> PackResult<Option<String>> {
        let state = self.state.read().unwrap();
        let mut handles: Vec<&String> = state
            .handles
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(h, _)| h)
            .collect();
        handles.sort();
        Ok(handles.first().map(|h| h.to_string()))
    }

    fn register(&self, id: ObjectId, handle: Option<&str>) -> PackResult<String> {
        let mut state = self.state.write().unwrap();
        state.node(id)?;

        let handle = match handle {
            Some(handle) => {
                match state.handles.get(handle) {
                    Some(owner) if *owner != id => {
                        return Err(PackError::ObjectExists(handle.to_string()));
                    }
                    _ => handle.to_string(),
                }
            }
            None => {
                loop {
                    let candidate = format!("{}/{}", state.handle_prefix, state.next_handle);
                    state.next_handle += 1;
                    if !state.handles.contains_key(&candidate) {
                        break candidate;
                    }
                }
            }
        };

        state.handles.retain(|_, owner| *owner != id);
        state.handles.insert(handle.clone(), id);
        Ok(handle)
    }
}

impl AuthorizationService for MemoryRepository {
    fn can_read(&self, id: ObjectId) -> PackResult<bool> {
        Ok(!self.state.read().unwrap().unreadable.contains(&id))
    }
}
