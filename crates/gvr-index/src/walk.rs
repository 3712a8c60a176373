//! Source tree walking and path normalisation shared by both indexers.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

/// Which files a directory walk picks up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// File extensions (without the dot) to index
    pub extensions: Vec<String>,
    /// Directory names never descended into; dot-directories are always skipped
    pub skip_dirs: Vec<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            extensions: ["ts", "tsx", "js", "jsx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_dirs: vec!["node_modules".to_string(), "dist".to_string()],
        }
    }
}

impl IndexOptions {
    pub fn is_indexable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        // Never skip the walk root itself, even if it is "."
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return true;
        }
        entry.file_type().is_dir() && self.skip_dirs.iter().any(|d| d == name.as_ref())
    }

    /// Collect indexable files under `root` as `(absolute-or-joined path, key)`
    /// pairs, sorted by key. The key is the path relative to `root`.
    pub fn collect_files(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let mut files: Vec<(PathBuf, String)> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_indexable(e.path()))
            .filter_map(|e| {
                let relative = e.path().strip_prefix(root).ok()?;
                let key = normalize_path(&relative.to_string_lossy());
                Some((e.path().to_path_buf(), key))
            })
            .collect();
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files
    }
}

/// Lexically normalise a path: `/` separators, `.` dropped, `..` resolved
/// where possible. No filesystem access.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<String> = Vec::new();

    for component in Path::new(&unified).components() {
        match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if parts.last().map_or(false, |p| p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Directory portion of a normalised path ("" for a bare file name).
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}
