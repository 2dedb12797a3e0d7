//! Blob ID to directory mapping.
//!
//! A blob's files live under a 4-level fan-out derived from the first
//! four hex characters of its UUID, one character per level. 16^4
//! buckets keep directory listings small at any realistic blob count.

use cairn_core::BlobId;
use std::path::PathBuf;

/// Formatter override hook: maps `(base, id)` to the blob directory.
pub type PathFormatter = dyn Fn(&str, BlobId) -> PathBuf + Send + Sync;

/// Maps a blob ID to its directory under a drive's base folder.
pub struct PathMapper {
    formatter: Option<Box<PathFormatter>>,
}

impl PathMapper {
    /// Mapper with the standard 4-level hex fan-out.
    pub fn new() -> Self {
        PathMapper { formatter: None }
    }

    /// Mapper with a host-supplied formatter.
    pub fn with_formatter(formatter: Box<PathFormatter>) -> Self {
        PathMapper {
            formatter: Some(formatter),
        }
    }

    /// Directory holding every file of blob `id` under `base`.
    ///
    /// `<base>/<h0>/<h1>/<h2>/<h3>` where `h0..h3` are the first four
    /// lowercase-hex characters of the UUID. A trailing separator on
    /// `base` is not doubled.
    pub fn blob_dir(&self, base: &str, id: BlobId) -> PathBuf {
        if let Some(f) = &self.formatter {
            return f(base, id);
        }
        let hex = id.simple().to_string();
        let mut dir = PathBuf::from(base);
        for level in hex.chars().take(4) {
            dir.push(level.to_string());
        }
        dir
    }
}

impl Default for PathMapper {
    fn default() -> Self {
        PathMapper::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn four_levels_from_uuid_hex() {
        let id = Uuid::parse_str("ab12cd34-0000-0000-0000-000000000000").unwrap();
        let dir = PathMapper::new().blob_dir("/data/d0", id);
        assert_eq!(dir, PathBuf::from("/data/d0/a/b/1/2"));
    }

    #[test]
    fn trailing_separator_not_doubled() {
        let id = Uuid::parse_str("ab12cd34-0000-0000-0000-000000000000").unwrap();
        let dir = PathMapper::new().blob_dir("/data/d0/", id);
        assert_eq!(dir, PathBuf::from("/data/d0/a/b/1/2"));
    }

    #[test]
    fn formatter_override_wins() {
        let mapper = PathMapper::with_formatter(Box::new(|base, _| PathBuf::from(base).join("flat")));
        let dir = mapper.blob_dir("/data/d0", Uuid::new_v4());
        assert_eq!(dir, PathBuf::from("/data/d0/flat"));
    }
}
