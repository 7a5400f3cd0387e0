use std::path::{Component, Path};

pub const KEY_SEPARATOR: char = '/';

/// `<root>/<app>/`: parent of every version directory of the app.
pub fn app_root(storage_root: &str, app: &str) -> String {
    format!("{}/{app}/", storage_root.trim_end_matches(KEY_SEPARATOR))
}

/// `<root>/<app>/<version>`: no trailing separator.
pub fn version_root(storage_root: &str, app: &str, version: u64) -> String {
    format!("{}{version}", app_root(storage_root, app))
}

/// `<version_root>/<index>/`: destination of the `index`-th synced static.
pub fn static_dest(version_root: &str, index: usize) -> String {
    format!("{}/{index}/", version_root.trim_end_matches(KEY_SEPARATOR))
}

/// Normalize a directory key: forward slashes and a trailing separator.
pub fn directory_prefix(dir: &str) -> String {
    let mut prefix = dir.replace('\\', "/");
    if !prefix.ends_with(KEY_SEPARATOR) {
        prefix.push(KEY_SEPARATOR);
    }
    prefix
}

/// Object key for a file at `relative` below the directory `dest`.
pub fn object_key(dest: &str, relative: &Path) -> String {
    let rel = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().replace('\\', "/")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("{}{rel}", directory_prefix(dest))
}

/// Version number encoded in a common prefix such as `<root>/<app>/12/`.
pub fn parse_version(app_root: &str, prefix: &str) -> Option<u64> {
    let rest = prefix.strip_prefix(app_root)?;
    let segment = rest.split(KEY_SEPARATOR).next()?;
    segment.parse().ok()
}
