use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Flat-file record store. One JSON document per record, addressed by
/// store-relative paths produced from persistence templates.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.full_path(rel).is_file()
    }

    pub fn read(&self, rel: &str) -> io::Result<String> {
        fs::read_to_string(self.full_path(rel))
    }

    pub fn write(&self, rel: &str, contents: &str) -> io::Result<()> {
        let path = self.full_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "record written");
        fs::write(path, contents)
    }

    /// Removes a record; a record that is already gone is not an error.
    pub fn delete(&self, rel: &str) -> io::Result<()> {
        match fs::remove_file(self.full_path(rel)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Store-relative paths of the records in `folder` whose filename
    /// matches the wildcard pattern, sorted by filename. A folder that
    /// does not exist yet simply has no records.
    pub fn list(&self, folder: &str, pattern: &str) -> io::Result<Vec<String>> {
        let dir = if folder.is_empty() {
            self.root.clone()
        } else {
            self.root.join(folder)
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if wild_match(&name, pattern) {
                names.push(name);
            }
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| {
                if folder.is_empty() {
                    name
                } else {
                    format!("{folder}/{name}")
                }
            })
            .collect())
    }
}

/// Filename match against a pattern where `*` spans any run of
/// characters. The pattern is anchored at both ends.
pub fn wild_match(name: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return name == pattern;
    }

    let pieces: Vec<&str> = pattern.split('*').collect();
    let Some((first, tail)) = pieces.split_first() else {
        return name.is_empty();
    };
    let Some((last, middle)) = tail.split_last() else {
        return name == *first;
    };

    // The leading and trailing literals are anchored; the middle pieces
    // just have to appear in order in what remains.
    let Some(rest) = name.strip_prefix(first) else {
        return false;
    };
    let Some(mut rest) = rest.strip_suffix(last) else {
        return false;
    };

    for piece in middle {
        if piece.is_empty() {
            continue;
        }
        let Some(found) = rest.find(piece) else {
            return false;
        };
        rest = &rest[found + piece.len()..];
    }

    true
}
