//! Directory traversal for snapshot data files.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Minimum depth of reported files (root = 0)
    pub min_depth: usize,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// Only report files with this extension (including the dot)
    pub extension: Option<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            min_depth: 0,
            max_depth: None,
            extension: None,
        }
    }
}

/// Information about a regular file discovered during walking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last modified time (whole seconds since Unix epoch)
    pub modified: i64,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Self {
            path,
            relative_path,
            size: metadata.len(),
            modified,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Walk a directory tree and collect regular files, sorted by path.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let mut walker = WalkDir::new(root).min_depth(options.min_depth);

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    for entry in walker {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        if !matches_extension(&entry, options.extension.as_deref()) {
            continue;
        }

        files.push(FileInfo::from_entry(&entry, root)?);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn matches_extension(entry: &DirEntry, extension: Option<&str>) -> bool {
    match extension {
        Some(ext) => entry.file_name().to_string_lossy().ends_with(ext),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.dat"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.dat"), b"content2")?;

        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.modified > 0));

        Ok(())
    }

    #[test]
    fn test_depth_and_extension_filter() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir_all(temp_dir.path().join("seed/deeper"))?;
        fs::write(temp_dir.path().join("top.dat"), b"skip: too shallow")?;
        fs::write(temp_dir.path().join("seed/block.dat"), b"keep")?;
        fs::write(temp_dir.path().join("seed/notes.txt"), b"skip: extension")?;
        fs::write(temp_dir.path().join("seed/deeper/block.dat"), b"skip: too deep")?;

        let options = WalkOptions {
            min_depth: 2,
            max_depth: Some(2),
            extension: Some(".dat".to_string()),
            ..WalkOptions::default()
        };
        let files = walk_directory(temp_dir.path(), &options)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("seed/block.dat"));
        assert_eq!(files[0].size, 4);
        assert_eq!(files[0].file_name(), "block.dat");

        Ok(())
    }
}
