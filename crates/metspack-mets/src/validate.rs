//! Structural conformance checks run before a manifest is written or ingested.

use std::collections::HashSet;

use crate::{
    error::{MetsError, Result},
    model::*,
    query::MetsElementRef,
};

fn walk_divs<'a>(divs: &'a [Div], out: &mut Vec<&'a Div>) {
    for div in divs {
        out.push(div);
        walk_divs(&div.children, out);
    }
}

impl MetsDocument {
    /// Every problem found, in document order. Empty means conformant.
    pub fn conformance_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut ids = Vec::new();
        ids.extend(self.dmd_secs.iter().map(|s| s.id.as_str()));
        for amd in &self.amd_secs {
            ids.push(amd.id.as_str());
            ids.extend(amd.iter().map(|(_, s)| s.id.as_str()));
        }
        let groups = self.file_sec.iter().flat_map(|s| &s.groups);
        for group in groups.clone() {
            ids.extend(group.id.as_deref());
            ids.extend(group.files.iter().filter_map(|f| f.id.as_deref()));
        }
        let mut divs = Vec::new();
        for map in &self.struct_maps {
            ids.extend(map.id.as_deref());
            walk_divs(&map.divs, &mut divs);
        }
        ids.extend(divs.iter().filter_map(|d| d.id.as_deref()));

        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                problems.push(format!("ID \"{id}\" is used more than once"));
            }
        }

        if self.locate_structural_root().is_err() {
            problems.push("no structMap with a div".to_string());
        }

        for group in groups {
            let label = group.id.as_deref().unwrap_or("(no ID)");
            if group.usage.is_none() {
                problems.push(format!("fileGrp {label} has no USE"));
            }
            for file in &group.files {
                let file_label = file.id.as_deref().unwrap_or("(no ID)");
                if file.id.is_none() {
                    problems.push(format!("a file in fileGrp {label} has no ID"));
                }
                if file.locations.len() != 1 {
                    problems.push(format!(
                        "file {file_label} has {} FLocat elements, expected exactly one",
                        file.locations.len()
                    ));
                }
                for adm in &file.adm_ids {
                    if !matches!(
                        self.find_by_id(adm),
                        Some(MetsElementRef::Administrative(_) | MetsElementRef::AdminSubsection(..))
                    ) {
                        problems.push(format!(
                            "file {file_label} ADMID \"{adm}\" has no administrative section"
                        ));
                    }
                }
            }
        }

        for div in divs {
            let label = div.id.as_deref().unwrap_or("(no ID)");
            for dmd in &div.dmd_ids {
                if self.dmd_section(dmd).is_none() {
                    problems.push(format!("div {label} DMDID \"{dmd}\" has no dmdSec"));
                }
            }
            for adm in &div.adm_ids {
                if !matches!(
                    self.find_by_id(adm),
                    Some(MetsElementRef::Administrative(_) | MetsElementRef::AdminSubsection(..))
                ) {
                    problems.push(format!(
                        "div {label} ADMID \"{adm}\" has no administrative section"
                    ));
                }
            }
            for fptr in &div.fptrs {
                if self.file_by_id(fptr).is_none() {
                    problems.push(format!("div {label} FILEID \"{fptr}\" has no file"));
                }
            }
        }

        problems
    }

    /// Fails with every conformance problem joined into one message.
    pub fn validate_structure(&self) -> Result<()> {
        let problems = self.conformance_problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(MetsError::validation(problems.join("; ")))
        }
    }
}
