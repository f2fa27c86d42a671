//! Remote name codec.
//!
//! A data file `<stem><ext>` modified at `<mtime>` is stored remotely as
//! `<stem>.<mtime><ext>`. The name is stable across retries of the same run
//! and changes whenever the file is rewritten.
//!
//! The extension is either empty or a dot followed by a non-numeric segment
//! without further dots, so the trailing integer can always be found again.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteName {
    stem: String,
    mtime: i64,
    extension: String,
}

impl RemoteName {
    /// Build a name from its parts. Returns None for an extension that
    /// could not be told apart from the mtime segment.
    pub fn new(stem: impl Into<String>, mtime: i64, extension: impl Into<String>) -> Option<Self> {
        let extension = extension.into();
        if !extension.is_empty() {
            match extension.strip_prefix('.') {
                Some(segment) if is_extension(segment) => {}
                _ => return None,
            }
        }
        Some(Self {
            stem: stem.into(),
            mtime,
            extension,
        })
    }

    /// Split `file_name` into stem and extension the way the codec expects.
    pub fn from_file_name(file_name: &str, mtime: i64) -> Self {
        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && is_extension(ext) => {
                (stem.to_string(), format!(".{}", ext))
            }
            _ => (file_name.to_string(), String::new()),
        };
        Self {
            stem,
            mtime,
            extension,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}.{}{}", self.stem, self.mtime, self.extension)
    }

    pub fn decode(name: &str) -> Option<Self> {
        if let Some((rest, ext)) = name.rsplit_once('.') {
            if is_extension(ext) {
                if let Some((stem, mtime)) = split_mtime(rest) {
                    return Some(Self {
                        stem: stem.to_string(),
                        mtime,
                        extension: format!(".{}", ext),
                    });
                }
            }
        }
        let (stem, mtime) = split_mtime(name)?;
        Some(Self {
            stem: stem.to_string(),
            mtime,
            extension: String::new(),
        })
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for RemoteName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s).ok_or_else(|| format!("not a remote name: {}", s))
    }
}

/// Whether a remote name belongs to the tracked data file set.
pub fn is_tracked(remote_name: &str, extension: &str) -> bool {
    remote_name.ends_with(extension) && remote_name.len() > extension.len()
}

fn is_extension(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains('.')
        && !segment.contains('/')
        && segment.parse::<i64>().is_err()
}

fn split_mtime(s: &str) -> Option<(&str, i64)> {
    let (stem, mtime) = s.rsplit_once('.')?;
    Some((stem, mtime.parse().ok()?))
}
