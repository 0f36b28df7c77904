//! Package files on disk: naming, zip archives and bare manifests.

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, Timelike, Utc};
use metspack_mets::{FileEntry, MetsDocument, MANIFEST_FILE};
use metspack_utils::{
    error::HashError,
    fs::read_file,
    hash::{verify_bytes, MD5},
    path::resolve_reference,
};
use tracing::{debug, trace};
use zip::{
    result::ZipError,
    write::SimpleFileOptions,
    CompressionMethod, ZipArchive, ZipWriter,
};

use crate::{
    content::{Bitstream, ObjectId, ObjectType},
    error::{ErrorContext, PackError, PackResult},
    http::FetchClient,
};

pub const ARCHIVE_EXTENSION: &str = "zip";
pub const MANIFEST_EXTENSION: &str = "xml";

pub fn package_extension(manifest_only: bool) -> &'static str {
    if manifest_only {
        MANIFEST_EXTENSION
    } else {
        ARCHIVE_EXTENSION
    }
}

/// `TYPE@prefix-suffix.ext`, or `TYPE@internal-id-N.ext` for objects without a handle.
pub fn package_name(kind: ObjectType, handle: Option<&str>, id: ObjectId, ext: &str) -> String {
    match handle {
        Some(handle) => format!("{}@{}.{}", kind.label(), handle.replace('/', "-"), ext),
        None => format!("{}@internal-id-{}.{}", kind.label(), id, ext),
    }
}

/// In-archive name of a bitstream: `bitstream_<id>` plus the original extension.
pub fn archive_entry_name(bitstream: &Bitstream) -> String {
    match bitstream.name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("bitstream_{}.{}", bitstream.id, ext)
        }
        _ => format!("bitstream_{}", bitstream.id),
    }
}

/// Location written into `FLocat` for a bitstream.
///
/// Bare manifests carry no content, so their locations are absolute URLs
/// under `base_url`, which must then be set.
pub fn content_location(
    bitstream: &Bitstream,
    manifest_only: bool,
    base_url: Option<&str>,
) -> PackResult<String> {
    if !manifest_only {
        return Ok(archive_entry_name(bitstream));
    }
    let base = base_url.ok_or_else(|| {
        PackError::Configuration(format!(
            "bitstream {} needs an absolute location in a bare manifest; set retrieval_base_url",
            bitstream.id
        ))
    })?;
    Ok(format!("{}/bitstream/{}", base.trim_end_matches('/'), bitstream.id))
}

/// Checks `bytes` against the checksum a file entry records.
///
/// Returns `false` when the entry has no checksum or uses an algorithm that
/// cannot be verified here; a mismatch is a validation error.
pub fn verify_checksum(entry: &FileEntry, href: &str, bytes: &[u8]) -> PackResult<bool> {
    let Some(expected) = &entry.checksum else {
        return Ok(false);
    };
    let algorithm = entry.checksum_type.as_deref().unwrap_or(MD5);
    match verify_bytes(bytes, algorithm, expected) {
        Ok(true) => Ok(true),
        Ok(false) => Err(PackError::validation(format!(
            "checksum of {href} does not match the manifest"
        ))),
        Err(HashError::UnsupportedAlgorithm(algorithm)) => {
            debug!(href, "not verifying {algorithm} checksum");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Reads bytes that a manifest refers to by `href`.
pub trait ReferenceResolver {
    fn read_reference(&mut self, href: &str) -> PackResult<Vec<u8>>;
}

enum Source {
    Archive(ZipArchive<File>),
    Manifest(Vec<u8>),
}

/// An opened package: a zip archive holding `mets.xml`, or a bare manifest.
pub struct PackageReader {
    path: PathBuf,
    source: Source,
    fetch: FetchClient,
}

fn is_zip(path: &Path) -> PackResult<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let read = file
        .read(&mut magic)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(read == 4 && (&magic == b"PK\x03\x04" || &magic == b"PK\x05\x06"))
}

impl PackageReader {
    /// Opens `path`, telling archives from bare manifests by content.
    pub fn open(path: &Path, fetch: FetchClient) -> PackResult<Self> {
        let source = if is_zip(path)? {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Source::Archive(ZipArchive::new(file)?)
        } else {
            Source::Manifest(read_file(path)?)
        };
        Ok(Self {
            path: path.to_path_buf(),
            source,
            fetch,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_archive(&self) -> bool {
        matches!(self.source, Source::Archive(_))
    }

    pub fn manifest_bytes(&mut self) -> PackResult<Vec<u8>> {
        match &mut self.source {
            Source::Archive(_) => self.read_entry(MANIFEST_FILE),
            Source::Manifest(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn read_document(&mut self) -> PackResult<MetsDocument> {
        let bytes = self.manifest_bytes()?;
        Ok(MetsDocument::parse(&bytes)?)
    }

    fn read_entry(&mut self, name: &str) -> PackResult<Vec<u8>> {
        let Source::Archive(archive) = &mut self.source else {
            return Err(PackError::validation("package is not an archive"));
        };
        let name = name.trim_start_matches("./");
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(PackError::validation(format!(
                    "package {} has no entry named {name}",
                    self.path.display()
                )))
            }
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading {name} from {}", self.path.display()))?;
        Ok(bytes)
    }
}

impl ReferenceResolver for PackageReader {
    fn read_reference(&mut self, href: &str) -> PackResult<Vec<u8>> {
        trace!(href, "resolving package reference");
        if self.is_archive() {
            return self.read_entry(href);
        }
        if href.contains("://") {
            return self.fetch.fetch(href);
        }
        Ok(read_file(resolve_reference(&self.path, href))?)
    }
}

fn zip_timestamp(modified: DateTime<Utc>) -> zip::DateTime {
    let year = u16::try_from(modified.year()).unwrap_or(1980);
    zip::DateTime::from_date_and_time(
        year,
        modified.month() as u8,
        modified.day() as u8,
        modified.hour() as u8,
        modified.minute() as u8,
        modified.second() as u8,
    )
    .unwrap_or_default()
}

/// Writes a package archive whose entries all carry one timestamp.
pub struct ArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
}

impl ArchiveWriter {
    pub fn create(path: &Path, comment: &str, modified: DateTime<Utc>) -> PackResult<Self> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut zip = ZipWriter::new(file);
        zip.set_comment(comment);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip_timestamp(modified));
        Ok(Self {
            path: path.to_path_buf(),
            zip,
            options,
        })
    }

    pub fn add(&mut self, name: &str, bytes: &[u8]) -> PackResult<()> {
        self.zip.start_file(name, self.options)?;
        self.zip
            .write_all(bytes)
            .with_context(|| format!("writing {name} into {}", self.path.display()))
    }

    /// Finishes the archive and returns its size in bytes.
    pub fn finish(self) -> PackResult<u64> {
        let file = self.zip.finish()?;
        let size = file
            .metadata()
            .with_context(|| format!("reading metadata of {}", self.path.display()))?
            .len();
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use super::*;
    use crate::content::BitstreamFormat;

    fn bitstream(id: u64, name: &str) -> Bitstream {
        Bitstream {
            id: ObjectId(id),
            name: name.to_string(),
            sequence_id: Some(1),
            size: 0,
            checksum: String::new(),
            checksum_algorithm: "MD5".into(),
            format: BitstreamFormat::unknown(),
            derived_from: None,
        }
    }

    fn fetch() -> FetchClient {
        FetchClient::new(Duration::from_secs(5), "metspack-test", 1 << 20)
    }

    #[test]
    fn test_package_names() {
        assert_eq!(
            package_name(ObjectType::Item, Some("123/45"), ObjectId(9), "zip"),
            "ITEM@123-45.zip"
        );
        assert_eq!(
            package_name(ObjectType::Collection, None, ObjectId(9), "xml"),
            "COLLECTION@internal-id-9.xml"
        );
    }

    #[test]
    fn test_entry_names_and_locations() {
        assert_eq!(archive_entry_name(&bitstream(12, "thesis.pdf")), "bitstream_12.pdf");
        assert_eq!(archive_entry_name(&bitstream(12, "README")), "bitstream_12");
        assert_eq!(archive_entry_name(&bitstream(12, ".hidden")), "bitstream_12");
        assert_eq!(
            content_location(&bitstream(3, "a.pdf"), true, Some("https://repo.example/")).unwrap(),
            "https://repo.example/bitstream/3"
        );
        assert!(matches!(
            content_location(&bitstream(3, "a.pdf"), true, None),
            Err(PackError::Configuration(_))
        ));
        assert_eq!(
            content_location(&bitstream(3, "a.pdf"), false, Some("https://repo.example")).unwrap(),
            "bitstream_3.pdf"
        );
        assert_eq!(
            content_location(&bitstream(3, "a.pdf"), false, None).unwrap(),
            "bitstream_3.pdf"
        );
    }

    #[test]
    fn test_checksum_verification() {
        let mut entry = FileEntry {
            checksum: Some(metspack_utils::hash::checksum_bytes(b"content")),
            checksum_type: Some("MD5".into()),
            ..Default::default()
        };
        assert!(verify_checksum(&entry, "a", b"content").unwrap());
        assert!(matches!(
            verify_checksum(&entry, "a", b"tampered"),
            Err(PackError::Validation(_))
        ));

        entry.checksum_type = Some("SHA-256".into());
        assert!(!verify_checksum(&entry, "a", b"tampered").unwrap());
        entry.checksum = None;
        assert!(!verify_checksum(&entry, "a", b"tampered").unwrap());
    }

    #[test]
    fn test_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ITEM@1-2.zip");
        let modified = DateTime::from_timestamp(1_704_067_200, 0).unwrap();

        let mut writer = ArchiveWriter::create(&path, "METS archive", modified).unwrap();
        writer.add(MANIFEST_FILE, b"<mets/>").unwrap();
        writer.add("bitstream_4.txt", b"content").unwrap();
        assert!(writer.finish().unwrap() > 0);

        let mut reader = PackageReader::open(&path, fetch()).unwrap();
        assert!(reader.is_archive());
        assert_eq!(reader.manifest_bytes().unwrap(), b"<mets/>");
        assert_eq!(reader.read_reference("./bitstream_4.txt").unwrap(), b"content");
        assert!(matches!(
            reader.read_reference("missing.txt"),
            Err(PackError::Validation(_))
        ));
    }

    #[test]
    fn test_identical_input_gives_identical_archives() {
        let dir = tempfile::tempdir().unwrap();
        let modified = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        let write = |name: &str| {
            let path = dir.path().join(name);
            let mut writer = ArchiveWriter::create(&path, "c", modified).unwrap();
            writer.add("a", b"1").unwrap();
            writer.finish().unwrap();
            fs::read(path).unwrap()
        };
        assert_eq!(write("one.zip"), write("two.zip"));
    }

    #[test]
    fn test_bare_manifest_references() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("ITEM@1-2.xml");
        fs::write(&manifest, b"<mets/>").unwrap();
        fs::write(dir.path().join("bitstream_4.txt"), b"local").unwrap();

        let mut reader = PackageReader::open(&manifest, fetch()).unwrap();
        assert!(!reader.is_archive());
        assert_eq!(reader.read_document().unwrap(), MetsDocument::default());
        assert_eq!(reader.read_reference("bitstream_4.txt").unwrap(), b"local");
    }
}
