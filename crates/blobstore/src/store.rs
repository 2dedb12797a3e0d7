//! Sharded blob orchestration across drive roots.

use cairn_codec::{PathMapper, ShardCodec, ShardMetadata, METADATA_SIZE};
use cairn_concurrency::{Job, TaskRunner};
use cairn_core::{BlobId, CancelToken, Error, FileIo, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ErasureOptions, ErasureSettings};

/// One table's worth of blob writes.
#[derive(Debug, Clone)]
pub struct BlobBatch {
    /// Target table.
    pub table: String,
    /// Blob IDs and payloads.
    pub blobs: Vec<(BlobId, Vec<u8>)>,
}

struct TableRuntime {
    options: ErasureOptions,
    codec: ShardCodec,
}

/// Erasure-coded blob store over `FileIo`.
///
/// One instance serves every configured table; per-table codecs are
/// built once at construction. All shard fan-out runs under a bounded
/// [`TaskRunner`], one group per operation.
pub struct BlobStore {
    file_io: Arc<dyn FileIo>,
    runner: TaskRunner,
    mapper: PathMapper,
    tables: HashMap<String, TableRuntime>,
}

/// Builder for [`BlobStore`].
pub struct BlobStoreBuilder {
    file_io: Option<Arc<dyn FileIo>>,
    settings: ErasureSettings,
    max_workers: usize,
    mapper: PathMapper,
}

impl BlobStoreBuilder {
    /// Builder with defaults: 7 workers, standard path fan-out.
    pub fn new() -> Self {
        BlobStoreBuilder {
            file_io: None,
            settings: ErasureSettings::new(),
            max_workers: TaskRunner::DEFAULT_MAX_WORKERS,
            mapper: PathMapper::new(),
        }
    }

    /// File IO implementation to use.
    pub fn file_io(mut self, io: Arc<dyn FileIo>) -> Self {
        self.file_io = Some(io);
        self
    }

    /// Erasure configuration.
    pub fn settings(mut self, settings: ErasureSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Worker bound per operation.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Path mapper override.
    pub fn path_mapper(mut self, mapper: PathMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Validate every table entry and build the store.
    pub fn build(self) -> Result<BlobStore> {
        let file_io = self
            .file_io
            .ok_or_else(|| Error::InvalidConfig("blob store requires a FileIo".into()))?;
        let mut tables = HashMap::new();
        for (name, options) in self.settings.iter() {
            options.validate()?;
            let codec =
                ShardCodec::new(options.data_shards as usize, options.parity_shards as usize)?;
            tables.insert(
                name.to_string(),
                TableRuntime {
                    options: options.clone(),
                    codec,
                },
            );
        }
        Ok(BlobStore {
            file_io,
            runner: TaskRunner::new(self.max_workers),
            mapper: self.mapper,
            tables,
        })
    }
}

impl Default for BlobStoreBuilder {
    fn default() -> Self {
        BlobStoreBuilder::new()
    }
}

impl BlobStore {
    /// Builder entry point.
    pub fn builder() -> BlobStoreBuilder {
        BlobStoreBuilder::new()
    }

    fn runtime(&self, table: &str) -> Result<&TableRuntime> {
        self.tables
            .get(table)
            .or_else(|| self.tables.get(""))
            .ok_or_else(|| Error::ConfigMissing {
                table: table.to_string(),
            })
    }

    fn shard_path(&self, drive: &str, table: &str, id: BlobId, index: usize) -> PathBuf {
        let base = format!("{}/{}", drive.trim_end_matches('/'), table);
        self.mapper.blob_dir(&base, id).join(format!("{id}_{index}"))
    }

    /// Read one blob, reconstructing shards as needed.
    ///
    /// Tolerates up to `p` missing or bit-rotted shards. When repair is
    /// enabled for the table and reconstruction happened, the rebuilt
    /// shard files are written back best-effort; a repair failure never
    /// fails the read.
    pub fn get_one(&self, tok: &CancelToken, table: &str, id: BlobId) -> Result<Vec<u8>> {
        let rt = self.runtime(table)?;
        let total = rt.codec.total_shards();
        let io = self.file_io.as_ref();

        let paths: Vec<PathBuf> = (0..total)
            .map(|i| self.shard_path(&rt.options.drive_roots[i], table, id, i))
            .collect();
        let jobs: Vec<Job<Vec<u8>>> = paths
            .iter()
            .map(|path| Box::new(move || io.read_file(tok, path)) as Job<Vec<u8>>)
            .collect();
        let reads = self.runner.run(tok, jobs);

        let mut last_err: Option<Error> = None;
        let mut shards: Vec<Option<Vec<u8>>> = Vec::with_capacity(total);
        let mut meta: Vec<Option<ShardMetadata>> = Vec::with_capacity(total);
        for (i, read) in reads.into_iter().enumerate() {
            match read {
                Ok(bytes) if bytes.len() >= METADATA_SIZE => {
                    let mut header = [0u8; METADATA_SIZE];
                    header.copy_from_slice(&bytes[..METADATA_SIZE]);
                    meta.push(Some(header));
                    shards.push(Some(bytes[METADATA_SIZE..].to_vec()));
                }
                Ok(bytes) => {
                    warn!(blob = %id, shard = i, len = bytes.len(), "shard file shorter than its header, treating as missing");
                    meta.push(None);
                    shards.push(None);
                }
                Err(e) => {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    debug!(blob = %id, shard = i, error = %e, "shard read failed");
                    last_err = Some(e);
                    meta.push(None);
                    shards.push(None);
                }
            }
        }

        if shards.iter().all(|s| s.is_none()) {
            return Err(last_err.unwrap_or(Error::AllShardsUnavailable { id }));
        }

        let outcome = rt.codec.decode(shards, &meta)?;
        if rt.options.auto_repair && !outcome.reconstructed.is_empty() {
            self.repair(tok, rt, table, id, &outcome.data, &outcome.reconstructed);
        }
        Ok(outcome.data)
    }

    /// Write blobs. Each blob tolerates up to `p` failed shard writes;
    /// beyond that the blob write fails with a quorum error.
    pub fn add(&self, tok: &CancelToken, batches: &[BlobBatch]) -> Result<()> {
        for batch in batches {
            let rt = self.runtime(&batch.table)?;
            for (id, value) in &batch.blobs {
                self.add_one(tok, rt, &batch.table, *id, value)?;
            }
        }
        Ok(())
    }

    /// Full-replacement update; identical semantics to [`BlobStore::add`].
    pub fn update(&self, tok: &CancelToken, batches: &[BlobBatch]) -> Result<()> {
        self.add(tok, batches)
    }

    fn add_one(
        &self,
        tok: &CancelToken,
        rt: &TableRuntime,
        table: &str,
        id: BlobId,
        value: &[u8],
    ) -> Result<()> {
        let shards = rt.codec.encode(value)?;
        let parity = rt.codec.parity_shards();
        let io = self.file_io.as_ref();

        let files: Vec<(PathBuf, Vec<u8>)> = shards
            .iter()
            .enumerate()
            .map(|(i, shard)| {
                let header = rt.codec.metadata(value.len(), shard);
                let mut buf = Vec::with_capacity(METADATA_SIZE + shard.len());
                buf.extend_from_slice(&header);
                buf.extend_from_slice(shard);
                (
                    self.shard_path(&rt.options.drive_roots[i], table, id, i),
                    buf,
                )
            })
            .collect();
        let jobs: Vec<Job<()>> = files
            .into_iter()
            .map(|(path, buf)| Box::new(move || io.write_file(tok, &path, &buf)) as Job<()>)
            .collect();

        let results = self.runner.run(tok, jobs);
        let mut failed = 0usize;
        for (i, result) in results.iter().enumerate() {
            if let Err(e) = result {
                if e.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                failed += 1;
                warn!(blob = %id, shard = i, error = %e, "shard write failed");
            }
        }
        if failed > parity {
            return Err(Error::WriteQuorumExceeded {
                id,
                failed,
                parity,
            });
        }
        Ok(())
    }

    /// Remove blobs. Individual shard removal failures are tolerated and
    /// logged; erasure tolerance covers leftovers.
    pub fn remove(&self, tok: &CancelToken, batches: &[(String, Vec<BlobId>)]) -> Result<()> {
        for (table, ids) in batches {
            let rt = self.runtime(table)?;
            let io = self.file_io.as_ref();
            for &id in ids {
                tok.ensure_active()?;
                let paths: Vec<PathBuf> = (0..rt.codec.total_shards())
                    .map(|i| self.shard_path(&rt.options.drive_roots[i], table, id, i))
                    .collect();
                let jobs: Vec<Job<()>> = paths
                    .iter()
                    .map(|path| {
                        Box::new(move || {
                            if io.exists(tok, path) {
                                io.remove(tok, path)
                            } else {
                                Ok(())
                            }
                        }) as Job<()>
                    })
                    .collect();
                for (i, result) in self.runner.run(tok, jobs).iter().enumerate() {
                    if let Err(e) = result {
                        warn!(blob = %id, shard = i, error = %e, "shard remove failed, tolerated");
                    }
                }
            }
        }
        Ok(())
    }

    /// Recursively delete every drive's root for `table`.
    ///
    /// Attempts every root; returns the last error encountered, if any.
    pub fn remove_store(&self, tok: &CancelToken, table: &str) -> Result<()> {
        let rt = self.runtime(table)?;
        let mut last: Option<Error> = None;
        for drive in &rt.options.drive_roots {
            let root = PathBuf::from(format!("{}/{}", drive.trim_end_matches('/'), table));
            if let Err(e) = self.file_io.remove_all(tok, &root) {
                warn!(table, root = %root.display(), error = %e, "store root removal failed");
                last = Some(e);
            }
        }
        match last {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn repair(
        &self,
        tok: &CancelToken,
        rt: &TableRuntime,
        table: &str,
        id: BlobId,
        data: &[u8],
        reconstructed: &[usize],
    ) {
        let shards = match rt.codec.encode(data) {
            Ok(shards) => shards,
            Err(e) => {
                warn!(blob = %id, error = %e, "re-encode for shard repair failed");
                return;
            }
        };
        for &i in reconstructed {
            let header = rt.codec.metadata(data.len(), &shards[i]);
            let mut buf = Vec::with_capacity(METADATA_SIZE + shards[i].len());
            buf.extend_from_slice(&header);
            buf.extend_from_slice(&shards[i]);
            let path = self.shard_path(&rt.options.drive_roots[i], table, id, i);
            match self.file_io.write_file(tok, &path, &buf) {
                Ok(()) => debug!(blob = %id, shard = i, "repaired shard rewritten"),
                Err(e) => warn!(blob = %id, shard = i, error = %e, "shard repair write failed"),
            }
        }
    }
}
