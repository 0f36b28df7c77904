use std::{
    env,
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

use crate::error::{PathError, PathResult};

/// Expands `$VAR`, `${VAR}` and a leading `~`, then makes the result absolute
/// against the current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] for blank input.
/// * [`PathError::MissingEnvVar`] when a referenced variable is unset.
/// * [`PathError::UnclosedVariable`] for `${` without a closing brace.
/// * [`PathError::CurrentDir`] if the working directory is unavailable.
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let expanded = PathBuf::from(expand_variables(path)?);
    if expanded.is_absolute() {
        return Ok(expanded);
    }

    env::current_dir()
        .map(|cwd| cwd.join(expanded))
        .map_err(|source| PathError::CurrentDir { source })
}

/// `$HOME`, or `/` when it is unset.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"))
}

/// Resolves a package reference found inside a manifest against the package
/// that contained it.
///
/// Child packages are written beside their parent, so a relative reference is
/// joined onto the parent package's directory. Absolute references are kept.
pub fn resolve_reference(package: &Path, reference: &str) -> PathBuf {
    let reference = Path::new(reference);
    if reference.is_absolute() {
        return reference.to_path_buf();
    }
    match package.parent() {
        Some(dir) => dir.join(reference),
        None => reference.to_path_buf(),
    }
}

fn expand_variables(input: &str) -> PathResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    if chars.peek() == Some(&'~') {
        chars.next();
        out.push_str(&home_dir().to_string_lossy());
    }

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name = if chars.peek() == Some(&'{') {
            chars.next();
            braced_name(&mut chars).ok_or_else(|| {
                PathError::UnclosedVariable {
                    input: input.to_string(),
                }
            })?
        } else {
            bare_name(&mut chars)
        };

        if name.is_empty() {
            out.push('$');
            continue;
        }

        let value = match name.as_str() {
            "HOME" => home_dir().to_string_lossy().into_owned(),
            "XDG_CONFIG_HOME" => xdg_config_home().to_string_lossy().into_owned(),
            _ => {
                env::var(&name).map_err(|_| {
                    PathError::MissingEnvVar {
                        var: name.clone(),
                        input: input.to_string(),
                    }
                })?
            }
        };
        out.push_str(&value);
    }

    Ok(out)
}

fn braced_name(chars: &mut Peekable<Chars>) -> Option<String> {
    let mut name = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            return Some(name);
        }
        name.push(c);
    }
    None
}

fn bare_name(chars: &mut Peekable<Chars>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}
