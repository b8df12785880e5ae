//! Hash-to-name dictionary for display purposes
//!
//! Property identities are 32-bit hashes; a JSON side file can map them to
//! readable names for the editor. Two shapes are accepted:
//!
//! ```json
//! { "hashes": { "0xDEADBEEF": "SomeProperty" } }
//! { "0xDEADBEEF": "SomeProperty" }
//! ```
//!
//! Keys may be 0x-prefixed hex or decimal. Malformed entries are skipped
//! with a warning and a missing file is not an error worth failing over;
//! the codec itself never consults this table.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::format::types::section_hash;

#[derive(Deserialize)]
struct NamesDocument {
    #[serde(default)]
    hashes: HashMap<String, String>,
    #[serde(flatten)]
    flat: HashMap<String, serde_json::Value>,
}

/// In-memory hash-to-name table.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<u32, String>,
}

impl NameTable {
    /// Create a table pre-seeded with the known section root hashes.
    pub fn new() -> Self {
        let mut table = NameTable {
            names: HashMap::new(),
        };
        table.register(section_hash::SAVE_GAME, "SaveGame");
        table.register(section_hash::PLAYER_OPTIONS, "PlayerOptionsSaveData");
        table.register(section_hash::SINGLE_PROFILE, "AssassinSingleProfileData");
        table.register(section_hash::MULTI_PROFILE, "AssassinMultiProfileData");
        table
    }

    /// Add or replace one mapping.
    pub fn register(&mut self, hash: u32, name: impl Into<String>) {
        self.names.insert(hash, name.into());
    }

    /// Look up the name for a hash.
    pub fn lookup(&self, hash: u32) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    /// Number of known names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Load mappings from a JSON file, merging into the table. Returns the
    /// number of entries added.
    ///
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be read
    /// and a malformed-data error if it is not JSON at all; individually
    /// bad entries are skipped, not fatal.
    pub fn load_from_json<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let text = std::fs::read_to_string(&path)?;
        let document: NamesDocument = serde_json::from_str(&text).map_err(|e| {
            crate::error::Error::Malformed {
                offset: 0,
                message: format!("hash dictionary is not valid JSON: {e}"),
            }
        })?;

        let mut added = 0usize;

        for (key, name) in &document.hashes {
            added += usize::from(self.insert_entry(key, name));
        }
        for (key, value) in &document.flat {
            match value.as_str() {
                Some(name) => added += usize::from(self.insert_entry(key, name)),
                None => warn!("hash dictionary entry {key:?} has a non-string value, skipped"),
            }
        }

        Ok(added)
    }

    fn insert_entry(&mut self, key: &str, name: &str) -> bool {
        match parse_hash_key(key) {
            Some(hash) => {
                self.register(hash, name);
                true
            }
            None => {
                warn!("hash dictionary key {key:?} is not a number, skipped");
                false
            }
        }
    }
}

/// Parse a `0x…` hex or decimal hash key.
fn parse_hash_key(key: &str) -> Option<u32> {
    let key = key.trim();
    if let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        key.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn seeded_with_section_names() {
        let table = NameTable::new();
        assert_eq!(table.lookup(section_hash::SAVE_GAME), Some("SaveGame"));
        assert_eq!(
            table.lookup(section_hash::MULTI_PROFILE),
            Some("AssassinMultiProfileData")
        );
    }

    #[test]
    fn parse_hex_and_decimal_keys() {
        assert_eq!(parse_hash_key("0xDEADBEEF"), Some(0xDEAD_BEEF));
        assert_eq!(parse_hash_key("0Xdeadbeef"), Some(0xDEAD_BEEF));
        assert_eq!(parse_hash_key("305419896"), Some(0x1234_5678));
        assert_eq!(parse_hash_key("not a number"), None);
    }

    #[test]
    fn load_wrapped_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "hashes": {{ "0xDEADBEEF": "TheProperty", "16": "Sixteen" }} }}"#
        )
        .unwrap();

        let mut table = NameTable::new();
        let added = table.load_from_json(file.path()).unwrap();
        assert_eq!(added, 2);
        assert_eq!(table.lookup(0xDEAD_BEEF), Some("TheProperty"));
        assert_eq!(table.lookup(16), Some("Sixteen"));
    }

    #[test]
    fn load_flat_shape_skips_bad_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "0x10": "Good", "junk": "Skipped", "0x20": 5 }}"#
        )
        .unwrap();

        let mut table = NameTable::new();
        let added = table.load_from_json(file.path()).unwrap();
        assert_eq!(added, 1);
        assert_eq!(table.lookup(0x10), Some("Good"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut table = NameTable::new();
        assert!(matches!(
            table.load_from_json("/nonexistent/names.json"),
            Err(crate::Error::Io(_))
        ));
    }
}
