use std::path::{Path, PathBuf};

use metspack_config::config::Config;
use metspack_core::{http::FetchClient, package::PackageReader, PackResult};
use metspack_mets::{bundle_name_for_group, MdContent, MdSection, MetsDocument};
use metspack_utils::bytes::format_bytes;
use nu_ansi_term::Color::{Blue, Cyan, Green, Yellow};
use serde::Serialize;
use tracing::info;

use crate::{
    error::CliResult,
    utils::{or_dash, Colored},
};

#[derive(Debug, Serialize)]
pub struct SectionSummary {
    pub id: String,
    /// `dmdSec`, or the administrative element name.
    pub kind: String,
    pub md_type: String,
    pub group: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub id: Option<String>,
    pub href: Option<String>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub mime_type: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub usage: Option<String>,
    pub bundle: Option<String>,
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
pub struct ChildSummary {
    pub handle: Option<String>,
    pub href: String,
}

#[derive(Debug, Serialize)]
pub struct PackageSummary {
    pub path: PathBuf,
    pub archive: bool,
    pub object_type: Option<String>,
    pub objid: Option<String>,
    pub profile: Option<String>,
    pub created: Option<String>,
    pub agents: Vec<String>,
    pub sections: Vec<SectionSummary>,
    pub file_groups: Vec<GroupSummary>,
    pub children: Vec<ChildSummary>,
    pub parent: Option<String>,
}

fn section(kind: &str, md: &MdSection) -> SectionSummary {
    SectionSummary {
        id: md.id.clone(),
        kind: kind.to_string(),
        md_type: md.md_type().label().to_string(),
        group: md.group_id.clone(),
        reference: match &md.content {
            MdContent::Ref(reference) => Some(reference.href.clone()),
            MdContent::Wrap(_) => None,
        },
    }
}

pub fn summarize(path: &Path, archive: bool, doc: &MetsDocument) -> PackResult<PackageSummary> {
    let mut sections: Vec<SectionSummary> =
        doc.dmd_secs.iter().map(|md| section("dmdSec", md)).collect();
    for amd in &doc.amd_secs {
        sections.extend(
            amd.iter()
                .map(|(kind, md)| section(kind.element_name(), md)),
        );
    }

    let file_groups = doc
        .file_groups()?
        .into_iter()
        .map(|group| GroupSummary {
            usage: group.usage.clone(),
            bundle: group.usage.as_deref().map(bundle_name_for_group),
            files: group
                .files
                .iter()
                .map(|file| FileSummary {
                    id: file.id.clone(),
                    href: file.locations.first().and_then(|l| l.href.clone()),
                    size: file.size,
                    checksum: file.checksum.clone(),
                    mime_type: file.mime_type.clone(),
                    group: file.group_id.clone(),
                })
                .collect(),
        })
        .collect();

    let children = doc
        .child_package_references()?
        .into_iter()
        .map(|child| ChildSummary {
            handle: child.handle.map(str::to_string),
            href: child.href.to_string(),
        })
        .collect();

    let header = doc.header.as_ref();
    Ok(PackageSummary {
        path: path.to_path_buf(),
        archive,
        object_type: doc.object_type.clone(),
        objid: doc.objid.clone(),
        profile: doc.profile.clone(),
        created: header.and_then(|h| h.create_date.clone()),
        agents: header
            .map(|h| {
                h.agents
                    .iter()
                    .map(|a| format!("{} {}", a.role, a.name))
                    .collect()
            })
            .unwrap_or_default(),
        sections,
        file_groups,
        children,
        parent: doc.parent_pointer()?.map(str::to_string),
    })
}

fn print_summary(summary: &PackageSummary) {
    info!(
        "{} {}",
        Colored(Blue, or_dash(summary.object_type.as_deref())),
        Colored(Cyan, or_dash(summary.objid.as_deref()))
    );
    info!(
        "  {} ({})",
        or_dash(summary.profile.as_deref()),
        if summary.archive { "archive" } else { "bare manifest" }
    );
    if let Some(created) = &summary.created {
        info!("  created {created}");
    }
    for agent in &summary.agents {
        info!("  agent {agent}");
    }
    if let Some(parent) = &summary.parent {
        info!("  parent {}", Colored(Cyan, parent));
    }

    info!("Metadata sections: {}", summary.sections.len());
    for section in &summary.sections {
        info!(
            "  {} {} {}{}",
            Colored(Green, &section.id),
            section.kind,
            Colored(Yellow, &section.md_type),
            section
                .reference
                .as_deref()
                .map(|href| format!(" -> {href}"))
                .unwrap_or_default()
        );
    }

    for group in &summary.file_groups {
        info!(
            "File group {} ({} files)",
            Colored(Blue, or_dash(group.bundle.as_deref())),
            group.files.len()
        );
        for file in &group.files {
            info!(
                "  {} {} {} md5:{}",
                Colored(Green, or_dash(file.id.as_deref())),
                or_dash(file.href.as_deref()),
                format_bytes(file.size.unwrap_or_default(), 1),
                or_dash(file.checksum.as_deref())
            );
        }
    }

    if !summary.children.is_empty() {
        info!("Child packages: {}", summary.children.len());
        for child in &summary.children {
            info!(
                "  {} {}",
                Colored(Cyan, or_dash(child.handle.as_deref())),
                child.href
            );
        }
    }
}

pub fn inspect_package(config: &Config, package: &Path, json: bool) -> CliResult<()> {
    let mut reader = PackageReader::open(package, FetchClient::from_config(config)?)?;
    let document = reader.read_document()?;
    let summary = summarize(package, reader.is_archive(), &document)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use metspack_core::{
        content::{ContentService, IdentifierService, MetadataValue},
        memory::MemoryRepository,
        params::MANIFEST_ONLY,
        Disseminator, ObjectType, PackageParameters, PackagingContext,
    };

    use super::*;

    #[test]
    fn test_summary_of_collection_package() {
        let repo = MemoryRepository::new();
        let community = repo.create_object(ObjectType::Community, repo.site()).unwrap();
        repo.register(community, None).unwrap();
        let collection = repo.create_object(ObjectType::Collection, community).unwrap();
        repo.register(collection, None).unwrap();
        repo.add_metadata(collection, MetadataValue::new("dc", "title", None, "Maps"))
            .unwrap();
        let item = repo.create_object(ObjectType::Item, collection).unwrap();
        repo.register(item, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.xml");
        Disseminator::from_config(
            PackagingContext::from_repository(&repo),
            &Config::default_config(),
            "AIP",
        )
        .unwrap()
        .disseminate(
            collection,
            &PackageParameters::new().with(MANIFEST_ONLY, true),
            &path,
        )
        .unwrap();

        let mut reader =
            PackageReader::open(&path, FetchClient::from_config(&Config::default_config()).unwrap())
                .unwrap();
        let doc = reader.read_document().unwrap();
        let summary = summarize(&path, reader.is_archive(), &doc).unwrap();

        assert!(!summary.archive);
        assert_eq!(summary.object_type.as_deref(), Some("DSpace COLLECTION"));
        assert_eq!(summary.parent, repo.handle_of(community).unwrap());
        assert_eq!(summary.children.len(), 1);
        assert!(summary.sections.iter().any(|s| s.md_type == "DIM"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["children"][0]["href"], summary.children[0].href.as_str());
    }
}
