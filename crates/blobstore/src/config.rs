//! Per-table erasure configuration.

use cairn_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Erasure geometry and drive layout for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureOptions {
    /// Number of data shards.
    pub data_shards: u16,
    /// Number of parity shards; also the write/read fault tolerance.
    pub parity_shards: u16,
    /// One base folder per shard, `data_shards + parity_shards` of them.
    pub drive_roots: Vec<String>,
    /// Write reconstructed shards back to their drives during reads.
    pub auto_repair: bool,
}

impl ErasureOptions {
    /// Options with repair disabled.
    pub fn new(data_shards: u16, parity_shards: u16, drive_roots: Vec<String>) -> Self {
        ErasureOptions {
            data_shards,
            parity_shards,
            drive_roots,
            auto_repair: false,
        }
    }

    /// Toggle shard repair on reads.
    pub fn with_repair(mut self, auto_repair: bool) -> Self {
        self.auto_repair = auto_repair;
        self
    }

    /// Total shard count.
    pub fn total_shards(&self) -> usize {
        self.data_shards as usize + self.parity_shards as usize
    }

    /// Structural validation: geometry bounds and one drive per shard.
    pub fn validate(&self) -> Result<()> {
        if self.data_shards == 0 || self.parity_shards == 0 {
            return Err(Error::Codec(format!(
                "invalid shard geometry: d={}, p={}",
                self.data_shards, self.parity_shards
            )));
        }
        if self.total_shards() > 256 {
            return Err(Error::Codec(format!(
                "total shards {} exceed the field limit of 256",
                self.total_shards()
            )));
        }
        if self.drive_roots.len() != self.total_shards() {
            return Err(Error::Codec(format!(
                "{} drive roots configured for {} shards",
                self.drive_roots.len(),
                self.total_shards()
            )));
        }
        Ok(())
    }
}

/// Table-keyed erasure configuration with an `""` default fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErasureSettings {
    tables: HashMap<String, ErasureOptions>,
}

impl ErasureSettings {
    /// Empty settings.
    pub fn new() -> Self {
        ErasureSettings::default()
    }

    /// Set the default entry, used when a table has no entry of its own.
    pub fn with_default(self, options: ErasureOptions) -> Self {
        self.with_table("", options)
    }

    /// Set a per-table entry.
    pub fn with_table(mut self, table: &str, options: ErasureOptions) -> Self {
        self.tables.insert(table.to_string(), options);
        self
    }

    /// Options for `table`, falling back to the `""` entry.
    pub fn lookup(&self, table: &str) -> Result<&ErasureOptions> {
        self.tables
            .get(table)
            .or_else(|| self.tables.get(""))
            .ok_or_else(|| Error::ConfigMissing {
                table: table.to_string(),
            })
    }

    /// Iterate all configured entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ErasureOptions)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }
}
