use std::collections::HashSet;

use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const AIP_PROFILE: &str = "DSpace METS AIP Profile 1.0";
pub const SIP_PROFILE: &str = "DSpace METS SIP Profile 1.0";

/// Settings for one packager (a METS profile plus the metadata it carries).
///
/// Metadata types are written either as `LABEL` or `LABEL:crosswalk`, where
/// `LABEL` becomes the section's MDTYPE and `crosswalk` names the registered
/// crosswalk that produces or consumes it.
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct PackagerConfig {
    /// METS PROFILE string written on dissemination and required, as a prefix, on ingest.
    pub profile: String,

    /// Descriptive metadata types written for every object, in order.
    pub dmd_types: Vec<String>,

    /// Object-level technical metadata types.
    pub tech_md_types: Option<Vec<String>>,

    /// Source metadata types. These are crosswalked first on ingest.
    pub source_md_types: Option<Vec<String>>,

    /// Rights metadata types (e.g. the deposit license).
    pub rights_md_types: Option<Vec<String>>,

    /// Digital-provenance metadata types.
    pub digiprov_md_types: Option<Vec<String>>,

    /// Technical metadata types written for each content file.
    pub bitstream_tech_md_types: Option<Vec<String>>,

    /// Descriptive metadata labels preferred on ingest, most preferred first.
    /// Sections in the same group as the chosen one are treated as alternates.
    pub preferred_dmd: Option<Vec<String>>,

    /// Keep the ingested mets.xml as a bitstream in the item's METADATA bundle.
    /// Default: false
    pub preserve_manifest: Option<bool>,

    /// Format name given to a preserved manifest bitstream.
    /// Default: "METS"
    pub manifest_bitstream_format: Option<String>,

    /// Write and restore collection template items.
    /// Default: true
    pub use_collection_template: Option<bool>,

    /// Bundles left out of packages made by this packager.
    pub excluded_bundles: Option<Vec<String>>,
}

impl PackagerConfig {
    pub fn aip() -> Self {
        Self {
            profile: AIP_PROFILE.to_string(),
            dmd_types: vec!["DIM".to_string()],
            tech_md_types: Some(vec!["PREMIS".to_string()]),
            source_md_types: Some(Vec::new()),
            rights_md_types: Some(Vec::new()),
            digiprov_md_types: Some(Vec::new()),
            bitstream_tech_md_types: Some(vec!["PREMIS".to_string()]),
            preferred_dmd: Some(vec!["DIM".to_string(), "MODS".to_string(), "DC".to_string()]),
            preserve_manifest: Some(false),
            manifest_bitstream_format: Some("METS".to_string()),
            use_collection_template: Some(true),
            excluded_bundles: Some(Vec::new()),
        }
    }

    pub fn sip() -> Self {
        Self {
            profile: SIP_PROFILE.to_string(),
            dmd_types: vec!["DIM".to_string()],
            tech_md_types: Some(Vec::new()),
            source_md_types: Some(Vec::new()),
            rights_md_types: Some(vec!["DSPACE_DEPLICENSE".to_string()]),
            digiprov_md_types: Some(Vec::new()),
            bitstream_tech_md_types: Some(vec!["PREMIS".to_string()]),
            preferred_dmd: Some(vec!["DIM".to_string(), "MODS".to_string(), "DC".to_string()]),
            preserve_manifest: Some(false),
            manifest_bitstream_format: Some("METS".to_string()),
            use_collection_template: Some(false),
            excluded_bundles: Some(vec![
                "LICENSE".to_string(),
                "CC-LICENSE".to_string(),
                "METADATA".to_string(),
            ]),
        }
    }

    pub(crate) fn resolve(&mut self, name: &str) -> Result<()> {
        if self.profile.trim().is_empty() {
            return Err(ConfigError::EmptyProfile(name.to_string()));
        }

        self.tech_md_types.get_or_insert_with(Vec::new);
        self.source_md_types.get_or_insert_with(Vec::new);
        self.rights_md_types.get_or_insert_with(Vec::new);
        self.digiprov_md_types.get_or_insert_with(Vec::new);
        self.bitstream_tech_md_types.get_or_insert_with(Vec::new);
        self.preferred_dmd.get_or_insert_with(Vec::new);
        self.preserve_manifest.get_or_insert(false);
        self.manifest_bitstream_format
            .get_or_insert_with(|| "METS".to_string());
        self.use_collection_template.get_or_insert(true);
        self.excluded_bundles.get_or_insert_with(Vec::new);

        let lists: [&[String]; 5] = [
            &self.dmd_types,
            self.tech_md_types(),
            self.source_md_types(),
            self.rights_md_types(),
            self.digiprov_md_types(),
        ];
        for list in lists {
            let mut seen = HashSet::new();
            for spec in list {
                if !seen.insert(spec.as_str()) {
                    return Err(ConfigError::DuplicateTypeSpec {
                        packager: name.to_string(),
                        spec: spec.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn tech_md_types(&self) -> &[String] {
        self.tech_md_types.as_deref().unwrap_or_default()
    }

    pub fn source_md_types(&self) -> &[String] {
        self.source_md_types.as_deref().unwrap_or_default()
    }

    pub fn rights_md_types(&self) -> &[String] {
        self.rights_md_types.as_deref().unwrap_or_default()
    }

    pub fn digiprov_md_types(&self) -> &[String] {
        self.digiprov_md_types.as_deref().unwrap_or_default()
    }

    pub fn bitstream_tech_md_types(&self) -> &[String] {
        self.bitstream_tech_md_types.as_deref().unwrap_or_default()
    }

    pub fn preferred_dmd(&self) -> &[String] {
        self.preferred_dmd.as_deref().unwrap_or_default()
    }

    pub fn excluded_bundles(&self) -> &[String] {
        self.excluded_bundles.as_deref().unwrap_or_default()
    }

    pub fn preserve_manifest(&self) -> bool {
        self.preserve_manifest.unwrap_or(false)
    }

    pub fn manifest_bitstream_format(&self) -> &str {
        self.manifest_bitstream_format.as_deref().unwrap_or("METS")
    }

    pub fn use_collection_template(&self) -> bool {
        self.use_collection_template.unwrap_or(true)
    }
}
