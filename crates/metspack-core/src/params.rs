//! Options carried through one top-level packaging operation.

use std::collections::BTreeMap;

use fast_glob::glob_match;

use crate::error::{PackError, PackResult};

pub const MANIFEST_ONLY: &str = "manifest_only";
pub const VALIDATE: &str = "validate";
pub const UNAUTHORIZED: &str = "unauthorized";
pub const IGNORE_HANDLE: &str = "ignore_handle";
pub const IGNORE_PARENT: &str = "ignore_parent";
pub const RESTORE_MODE: &str = "restore_mode";
pub const REPLACE_MODE: &str = "replace_mode";
pub const KEEP_EXISTING_MODE: &str = "keep_existing_mode";
pub const RECURSIVE: &str = "recursive";
pub const SKIP_IF_PARENT_MISSING: &str = "skip_if_parent_missing";
pub const USE_WORKFLOW: &str = "use_workflow";
pub const INCLUDE_BUNDLES: &str = "include_bundles";
pub const EXCLUDE_BUNDLES: &str = "exclude_bundles";
pub const DMD: &str = "dmd";
const CROSSWALK_PREFIX: &str = "crosswalk.";

/// What to do with content the caller may not read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnauthorizedPolicy {
    /// Abort the dissemination.
    #[default]
    Fail,
    /// Leave the content out of the package.
    Skip,
    /// Keep the file entry but write zero-length content.
    Zero,
}

/// A string multimap of packaging options.
///
/// Keys are the constants in this module; values are parsed on access so an
/// unknown value surfaces where it is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageParameters {
    values: BTreeMap<String, Vec<String>>,
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl PackageParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every value of `key`.
    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.values
            .insert(key.to_string(), vec![value.to_string()]);
        self
    }

    /// Appends a value to `key`.
    pub fn add(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_bool)
    }

    /// Parses `key=value` pairs, as given on a command line.
    pub fn from_pairs<I, S>(pairs: I) -> PackResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                PackError::configuration(format!("parameter `{pair}` is not in key=value form"))
            })?;
            params.add(key.trim(), value.trim());
        }
        Ok(params)
    }

    pub fn manifest_only(&self) -> bool {
        self.get_bool(MANIFEST_ONLY).unwrap_or(false)
    }

    pub fn validate(&self) -> bool {
        self.get_bool(VALIDATE).unwrap_or(true)
    }

    pub fn unauthorized(&self) -> PackResult<UnauthorizedPolicy> {
        match self.get(UNAUTHORIZED).map(str::to_ascii_lowercase).as_deref() {
            None | Some("fail") => Ok(UnauthorizedPolicy::Fail),
            Some("skip") => Ok(UnauthorizedPolicy::Skip),
            Some("zero") => Ok(UnauthorizedPolicy::Zero),
            Some(other) => {
                Err(PackError::configuration(format!(
                    "unknown unauthorized policy `{other}`, expected fail, skip or zero"
                )))
            }
        }
    }

    pub fn restore_mode(&self) -> bool {
        self.get_bool(RESTORE_MODE).unwrap_or(false)
    }

    pub fn replace_mode(&self) -> bool {
        self.get_bool(REPLACE_MODE).unwrap_or(false)
    }

    pub fn keep_existing_mode(&self) -> bool {
        self.get_bool(KEEP_EXISTING_MODE).unwrap_or(false)
    }

    pub fn recursive(&self) -> bool {
        self.get_bool(RECURSIVE).unwrap_or(false)
    }

    /// Ignore the manifest's handle. Defaults to true unless restoring.
    pub fn ignore_handle(&self) -> bool {
        self.get_bool(IGNORE_HANDLE)
            .unwrap_or(!self.restore_mode())
    }

    /// Ignore the manifest's parent pointer. Defaults to true when the caller
    /// supplied a parent.
    pub fn ignore_parent(&self, parent_given: bool) -> bool {
        self.get_bool(IGNORE_PARENT).unwrap_or(parent_given)
    }

    pub fn skip_if_parent_missing(&self) -> bool {
        self.get_bool(SKIP_IF_PARENT_MISSING).unwrap_or(false)
    }

    pub fn use_workflow(&self) -> bool {
        self.get_bool(USE_WORKFLOW).unwrap_or(false)
    }

    /// Whether a bundle passes the include/exclude glob filters.
    pub fn bundle_selected(&self, bundle: &str) -> bool {
        let includes = self.get_all(INCLUDE_BUNDLES);
        if !includes.is_empty() && !includes.iter().any(|p| glob_match(p, bundle)) {
            return false;
        }
        !self
            .get_all(EXCLUDE_BUNDLES)
            .iter()
            .any(|p| glob_match(p, bundle))
    }

    /// Descriptive metadata types requested instead of the profile's.
    pub fn dmd_override(&self) -> &[String] {
        self.get_all(DMD)
    }

    /// Ingest crosswalk requested for an MDTYPE label.
    pub fn crosswalk_override(&self, md_type: &str) -> Option<&str> {
        self.get(&format!("{CROSSWALK_PREFIX}{md_type}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = PackageParameters::new();
        assert!(!params.manifest_only());
        assert!(params.validate());
        assert_eq!(params.unauthorized().unwrap(), UnauthorizedPolicy::Fail);
        assert!(params.ignore_handle());
        assert!(params.ignore_parent(true));
        assert!(!params.ignore_parent(false));
        assert!(params.bundle_selected("ORIGINAL"));
    }

    #[test]
    fn test_restore_mode_keeps_handles() {
        let params = PackageParameters::new().with(RESTORE_MODE, true);
        assert!(!params.ignore_handle());
        let params = params.with(IGNORE_HANDLE, "yes");
        assert!(params.ignore_handle());
    }

    #[test]
    fn test_unauthorized_policy_parsing() {
        let zero = PackageParameters::new().with(UNAUTHORIZED, "ZERO");
        assert_eq!(zero.unauthorized().unwrap(), UnauthorizedPolicy::Zero);
        let skip = PackageParameters::new().with(UNAUTHORIZED, "skip");
        assert_eq!(skip.unauthorized().unwrap(), UnauthorizedPolicy::Skip);
        let bad = PackageParameters::new().with(UNAUTHORIZED, "maybe");
        assert!(matches!(bad.unauthorized(), Err(PackError::Configuration(_))));
    }

    #[test]
    fn test_bundle_filters_use_globs() {
        let mut params = PackageParameters::new();
        params.add(INCLUDE_BUNDLES, "ORIGINAL").add(INCLUDE_BUNDLES, "TEXT*");
        params.add(EXCLUDE_BUNDLES, "TEXT_OCR");
        assert!(params.bundle_selected("ORIGINAL"));
        assert!(params.bundle_selected("TEXT"));
        assert!(!params.bundle_selected("TEXT_OCR"));
        assert!(!params.bundle_selected("THUMBNAIL"));
    }

    #[test]
    fn test_from_pairs_and_multi_values() {
        let params =
            PackageParameters::from_pairs(["dmd=MODS", "dmd = DIM", "crosswalk.MODS=MODS2DIM"])
                .unwrap();
        assert_eq!(params.dmd_override(), ["MODS", "DIM"]);
        assert_eq!(params.crosswalk_override("MODS"), Some("MODS2DIM"));
        assert!(PackageParameters::from_pairs(["novalue"]).is_err());
    }
}
