use std::path::Path;

use crate::config::CONFIG_PATH;

/// Points [`CONFIG_PATH`] at `path` for the duration of `f`.
pub fn with_config_path<F>(path: &Path, f: F)
where
    F: FnOnce(),
{
    let previous = {
        let mut guard = CONFIG_PATH.write().unwrap();
        std::mem::replace(&mut *guard, path.to_path_buf())
    };

    f();

    *CONFIG_PATH.write().unwrap() = previous;
}
