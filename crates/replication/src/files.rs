//! Small per-folder record files consumed by replication collaborators:
//! the registry hash-mod value and the store list.

use cairn_core::{CancelToken, Error, FileIo, Result};
use std::path::Path;

const REGISTRY_HASH_MOD_FILE: &str = "reghashmod.txt";
const STORE_LIST_FILE: &str = "storelist.txt";

/// Read `<base>/reghashmod.txt` (ASCII integer). `None` when absent.
pub fn read_registry_hash_mod(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
) -> Result<Option<i32>> {
    let path = base.join(REGISTRY_HASH_MOD_FILE);
    if !io.exists(tok, &path) {
        return Ok(None);
    }
    let bytes = io.read_file(tok, &path)?;
    let text = String::from_utf8_lossy(&bytes);
    text.trim()
        .parse::<i32>()
        .map(Some)
        .map_err(|e| Error::Serialization(format!("registry hash-mod value: {e}")))
}

/// Write `<base>/reghashmod.txt`.
pub fn write_registry_hash_mod(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
    value: i32,
) -> Result<()> {
    io.write_file(
        tok,
        &base.join(REGISTRY_HASH_MOD_FILE),
        value.to_string().as_bytes(),
    )
}

/// Read `<base>/storelist.txt` (JSON string array). Empty when absent.
pub fn read_store_list(io: &dyn FileIo, tok: &CancelToken, base: &Path) -> Result<Vec<String>> {
    let path = base.join(STORE_LIST_FILE);
    if !io.exists(tok, &path) {
        return Ok(Vec::new());
    }
    let bytes = io.read_file(tok, &path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write `<base>/storelist.txt`.
pub fn write_store_list(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
    stores: &[String],
) -> Result<()> {
    let bytes = serde_json::to_vec(stores)?;
    io.write_file(tok, &base.join(STORE_LIST_FILE), &bytes)
}
