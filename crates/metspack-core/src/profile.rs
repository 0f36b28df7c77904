//! Packaging profiles: what a SIP or AIP carries and how it is laid out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fast_glob::glob_match;
use metspack_config::{config::Config, packager::PackagerConfig};
use metspack_mets::{
    AdminKind, Agent, Div, IdGenerator, MdSection, MetsHeader, Mptr, StructMap,
    PARENT_STRUCT_MAP,
};

use crate::{
    content::{FinishMode, ObjectId, PackagingContext},
    error::PackResult,
    params::PackageParameters,
};

const SOFTWARE_AGENT: &str = concat!("metspack ", env!("CARGO_PKG_VERSION"));

pub fn format_mets_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// The knobs that distinguish one kind of package from another.
///
/// Provided methods read the packager settings; profiles override the
/// hooks where their layout differs.
pub trait PackagingProfile: Send + Sync {
    /// Packager name, as used in configuration.
    fn name(&self) -> &str;

    fn config(&self) -> &PackagerConfig;

    fn profile_string(&self) -> &str {
        &self.config().profile
    }

    /// Descriptive metadata types to write, honouring a per-call override.
    fn dmd_types<'a>(&'a self, params: &'a PackageParameters) -> &'a [String] {
        let requested = params.dmd_override();
        if requested.is_empty() {
            &self.config().dmd_types
        } else {
            requested
        }
    }

    fn admin_types(&self, kind: AdminKind) -> &[String] {
        let config = self.config();
        match kind {
            AdminKind::Tech => config.tech_md_types(),
            AdminKind::Rights => config.rights_md_types(),
            AdminKind::Source => config.source_md_types(),
            AdminKind::DigiProv => config.digiprov_md_types(),
        }
    }

    fn bitstream_tech_md_types(&self) -> &[String] {
        self.config().bitstream_tech_md_types()
    }

    fn include_bundle(&self, bundle: &str, params: &PackageParameters) -> bool {
        let excluded = self
            .config()
            .excluded_bundles()
            .iter()
            .any(|pattern| glob_match(pattern, bundle));
        !excluded && params.bundle_selected(bundle)
    }

    fn build_header(&self, site_name: &str, created: DateTime<Utc>) -> MetsHeader {
        MetsHeader {
            id: None,
            create_date: Some(format_mets_date(created)),
            last_mod_date: None,
            agents: vec![Agent {
                role: "CUSTODIAN".to_string(),
                agent_type: Some("ORGANIZATION".to_string()),
                other_type: None,
                name: site_name.to_string(),
            }],
        }
    }

    /// A structure map written after the contents map, if the profile has one.
    fn extra_struct_map(
        &self,
        _ctx: &PackagingContext<'_>,
        _object: ObjectId,
        _ids: &mut IdGenerator,
    ) -> PackResult<Option<StructMap>> {
        Ok(None)
    }

    /// Picks the descriptive section to apply first on ingest.
    ///
    /// An explicitly requested type wins, then the configured preference
    /// order, then whatever comes first.
    fn select_primary_dmd<'d>(
        &self,
        sections: &[&'d MdSection],
        params: &PackageParameters,
    ) -> Option<&'d MdSection> {
        let preferences = params
            .dmd_override()
            .iter()
            .chain(self.config().preferred_dmd());
        for wanted in preferences {
            if let Some(section) = sections.iter().find(|s| s.md_type().label() == wanted) {
                return Some(section);
            }
        }
        sections.first().copied()
    }

    fn finish_mode(&self, params: &PackageParameters) -> FinishMode {
        if params.restore_mode() {
            FinishMode::Restore
        } else if params.use_workflow() {
            FinishMode::Workflow
        } else {
            FinishMode::Install
        }
    }
}

/// Submission packages: descriptive metadata, content and the deposit license.
pub struct SipProfile {
    name: String,
    config: PackagerConfig,
}

impl SipProfile {
    pub fn new(name: impl Into<String>, config: PackagerConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl PackagingProfile for SipProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &PackagerConfig {
        &self.config
    }
}

/// Archival packages: everything needed to restore the object in place,
/// including a pointer to its owning parent.
pub struct AipProfile {
    name: String,
    config: PackagerConfig,
}

impl AipProfile {
    pub fn new(name: impl Into<String>, config: PackagerConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl PackagingProfile for AipProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &PackagerConfig {
        &self.config
    }

    fn build_header(&self, site_name: &str, created: DateTime<Utc>) -> MetsHeader {
        let mut header = MetsHeader {
            id: None,
            create_date: Some(format_mets_date(created)),
            last_mod_date: None,
            agents: Vec::new(),
        };
        header.agents.push(Agent {
            role: "CUSTODIAN".to_string(),
            agent_type: Some("ORGANIZATION".to_string()),
            other_type: None,
            name: site_name.to_string(),
        });
        header.agents.push(Agent {
            role: "CREATOR".to_string(),
            agent_type: Some("OTHER".to_string()),
            other_type: Some("SOFTWARE".to_string()),
            name: SOFTWARE_AGENT.to_string(),
        });
        header
    }

    fn extra_struct_map(
        &self,
        ctx: &PackagingContext<'_>,
        object: ObjectId,
        ids: &mut IdGenerator,
    ) -> PackResult<Option<StructMap>> {
        let Some(parent) = ctx.content.parent(object)? else {
            return Ok(None);
        };
        let Some(handle) = ctx.identifiers.handle_of(parent)? else {
            return Ok(None);
        };
        let parent_type = ctx.content.object_type(parent)?;
        Ok(Some(StructMap {
            id: Some(ids.next_id("struct")),
            map_type: Some("LOGICAL".to_string()),
            label: Some(PARENT_STRUCT_MAP.to_string()),
            divs: vec![Div {
                id: Some(ids.next_id("div")),
                div_type: Some("AIP Parent Link".to_string()),
                label: Some(parent_type.mets_type()),
                mptrs: vec![Mptr::handle(handle)],
                ..Default::default()
            }],
        }))
    }
}

/// Builds the profile for a configured packager.
///
/// Packagers whose name or PROFILE mentions `AIP` get the archival layout.
pub fn profile_for(config: &Config, name: &str) -> PackResult<Arc<dyn PackagingProfile>> {
    let packager = config.get_packager(name)?.clone();
    let archival = name.to_ascii_uppercase().contains("AIP")
        || packager.profile.to_ascii_uppercase().contains("AIP");
    Ok(if archival {
        Arc::new(AipProfile::new(name, packager))
    } else {
        Arc::new(SipProfile::new(name, packager))
    })
}
