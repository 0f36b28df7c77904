use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, Item, RawString, Table};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Prepends `docs` as `#` comment lines to whatever prefix `decor` already has.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let comments: String = docs
        .lines()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect();

    let existing = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default()
        .to_string();

    let prefix = if existing.is_empty() || existing.ends_with("\n\n") {
        format!("{existing}{comments}")
    } else if existing.ends_with('\n') {
        format!("{existing}#\n{comments}")
    } else {
        format!("{existing}\n{comments}")
    };
    decor.set_prefix(prefix);
}

/// Writes the field docs of `T` above the matching keys of `table`.
///
/// The struct-level doc comment is attached to the table header unless the
/// table is the document root.
pub fn annotate_toml_table<T>(table: &mut Table, is_root: bool) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if !is_root {
        append_docs_as_toml_comments(table.decor_mut(), T::DOCS);
    }

    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            debug!(
                "no documentation for key `{}` on `{}`",
                name,
                type_name::<T>()
            );
            continue;
        };

        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            Item::Table(sub) => append_docs_as_toml_comments(sub.decor_mut(), docs),
            Item::ArrayOfTables(array) => {
                if let Some(first) = array.iter_mut().next() {
                    append_docs_as_toml_comments(first.decor_mut(), docs);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use toml_edit::Decor;

    use super::*;
    use crate::config::Config;

    fn prefix_of(decor: &Decor) -> String {
        decor
            .prefix()
            .and_then(|p| p.as_str())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_append_docs_single_and_blank_lines() {
        let mut decor = Decor::new("", "");
        append_docs_as_toml_comments(&mut decor, "Custodian name\n\nShown in metsHdr");
        assert_eq!(prefix_of(&decor), "# Custodian name\n#\n# Shown in metsHdr\n");
    }

    #[test]
    fn test_append_docs_after_existing_comment() {
        let mut decor = Decor::new("# existing\n", "");
        append_docs_as_toml_comments(&mut decor, "more");
        assert_eq!(prefix_of(&decor), "# existing\n#\n# more\n");
    }

    #[test]
    fn test_annotated_default_config_has_comments() {
        let doc = Config::default_config().to_annotated_document().unwrap();
        let rendered = doc.to_string();
        assert!(rendered.contains("# Name of the archive"));
        assert!(rendered.contains("[packager.AIP]"));
    }
}
