use std::path::Path;

use metspack_config::config::Config;
use metspack_core::{
    http::FetchClient,
    package::{verify_checksum, PackageReader, ReferenceResolver},
    profile::profile_for,
    ObjectType, PackError, PackResult,
};
use nu_ansi_term::Color::Green;
use serde::Serialize;
use tracing::{debug, info};

use crate::{error::CliResult, utils::Colored};

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub object_type: String,
    pub profile: String,
    pub files: usize,
    /// Files whose content was read and matched the recorded checksum.
    pub verified: usize,
}

pub fn validate(
    config: &Config,
    package: &Path,
    packager: Option<&str>,
    manifest_only: bool,
) -> PackResult<ValidationReport> {
    let packager = packager.unwrap_or(&config.default_packager);
    let profile = profile_for(config, packager)?;
    let mut reader = PackageReader::open(package, FetchClient::from_config(config)?)?;
    let document = reader.read_document()?;

    document.check_profile(profile.profile_string())?;
    document.validate_structure()?;
    let label = document.object_type_label()?;
    let kind = ObjectType::from_mets_type(label)
        .ok_or_else(|| PackError::validation(format!("unknown object type `{label}`")))?;

    let files = document.content_files()?;
    let mut verified = 0;
    if !manifest_only {
        for file in &files {
            debug!(href = file.href, "checking content");
            let bytes = reader.read_reference(file.href)?;
            if verify_checksum(file.file, file.href, &bytes)? {
                verified += 1;
            }
        }
    }

    Ok(ValidationReport {
        object_type: kind.label().to_string(),
        profile: profile.profile_string().to_string(),
        files: files.len(),
        verified,
    })
}

pub fn validate_package(
    config: &Config,
    package: &Path,
    packager: Option<&str>,
    manifest_only: bool,
    json: bool,
) -> CliResult<()> {
    let report = validate(config, package, packager, manifest_only)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            "{} {} is a valid {} package ({} files, {} verified)",
            Colored(Green, "OK"),
            package.display(),
            report.object_type,
            report.files,
            report.verified
        );
    }
    Ok(())
}
