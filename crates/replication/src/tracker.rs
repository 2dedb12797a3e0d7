//! The replication tracker: failover decisions, status persistence, and
//! commit-log fast-forward.

use cairn_core::{
    CancelToken, CommitChangeRecord, Error, FileIo, Handle, L2Cache, L2CacheExt, Registry,
    RegistryPayload, ReplicationStatus, Result, StoreCopier, StoreInfo, StoreRepository, Tid,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::commitlog;
use crate::status::{
    process_cell, read_status_file, status_file_mtime, write_status_file, StatusCell,
    REPLICATION_STATUS_CACHE_KEY,
};

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct ReplicationTrackerOptions {
    /// The two base folders; index 0 is active while the toggler is set.
    pub base_folders: Vec<String>,
    /// Master switch; when off, every tracker operation is a no-op.
    pub replicate: bool,
    /// TTL of the status mirror in the shared cache.
    pub cache_ttl: Duration,
}

impl ReplicationTrackerOptions {
    /// Options for an active/passive folder pair, 5-minute cache TTL.
    pub fn new(active: &str, passive: &str) -> Self {
        ReplicationTrackerOptions {
            base_folders: vec![active.to_string(), passive.to_string()],
            replicate: true,
            cache_ttl: Duration::from_secs(300),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.replicate && self.base_folders.len() != 2 {
            return Err(Error::InvalidConfig(format!(
                "replication needs exactly two base folders, got {}",
                self.base_folders.len()
            )));
        }
        Ok(())
    }
}

/// Builder for [`ReplicationTracker`].
pub struct ReplicationTrackerBuilder {
    options: ReplicationTrackerOptions,
    cell: Option<Arc<StatusCell>>,
    file_io: Option<Arc<dyn FileIo>>,
    cache: Option<Arc<dyn L2Cache>>,
    store_repo: Option<Arc<dyn StoreRepository>>,
    registry: Option<Arc<dyn Registry>>,
    copier: Option<Arc<dyn StoreCopier>>,
}

impl ReplicationTrackerBuilder {
    /// Builder over the given options.
    pub fn new(options: ReplicationTrackerOptions) -> Self {
        ReplicationTrackerBuilder {
            options,
            cell: None,
            file_io: None,
            cache: None,
            store_repo: None,
            registry: None,
            copier: None,
        }
    }

    /// Status cell override; defaults to the process-wide cell.
    pub fn status_cell(mut self, cell: Arc<StatusCell>) -> Self {
        self.cell = Some(cell);
        self
    }

    /// File IO implementation.
    pub fn file_io(mut self, io: Arc<dyn FileIo>) -> Self {
        self.file_io = Some(io);
        self
    }

    /// Shared cache.
    pub fn cache(mut self, cache: Arc<dyn L2Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Store repository seam for fast-forward.
    pub fn store_repository(mut self, repo: Arc<dyn StoreRepository>) -> Self {
        self.store_repo = Some(repo);
        self
    }

    /// Registry seam for fast-forward.
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Copier driving active→passive seeding during reinstatement.
    pub fn store_copier(mut self, copier: Arc<dyn StoreCopier>) -> Self {
        self.copier = Some(copier);
        self
    }

    /// Validate, read the on-disk status, and build the tracker.
    pub fn build(self, tok: &CancelToken) -> Result<ReplicationTracker> {
        self.options.validate()?;
        let missing = |what: &str| Error::InvalidConfig(format!("tracker requires {what}"));
        let tracker = ReplicationTracker {
            tid: Uuid::new_v4(),
            options: self.options,
            cell: self.cell.unwrap_or_else(process_cell),
            local: Mutex::new(ReplicationStatus::default()),
            file_io: self.file_io.ok_or_else(|| missing("a FileIo"))?,
            cache: self.cache.ok_or_else(|| missing("an L2Cache"))?,
            store_repo: self.store_repo.ok_or_else(|| missing("a StoreRepository"))?,
            registry: self.registry.ok_or_else(|| missing("a Registry"))?,
            copier: self.copier.ok_or_else(|| missing("a StoreCopier"))?,
        };
        tracker.read_status_on_init(tok)?;
        Ok(tracker)
    }
}

/// Active/passive replication controller.
///
/// One tracker is typically constructed per transaction scope; every
/// tracker in a process shares the same [`StatusCell`], and trackers
/// across processes coordinate through the shared cache.
pub struct ReplicationTracker {
    tid: Tid,
    options: ReplicationTrackerOptions,
    cell: Arc<StatusCell>,
    local: Mutex<ReplicationStatus>,
    file_io: Arc<dyn FileIo>,
    cache: Arc<dyn L2Cache>,
    store_repo: Arc<dyn StoreRepository>,
    registry: Arc<dyn Registry>,
    copier: Arc<dyn StoreCopier>,
}

impl ReplicationTracker {
    /// Builder entry point.
    pub fn builder(options: ReplicationTrackerOptions) -> ReplicationTrackerBuilder {
        ReplicationTrackerBuilder::new(options)
    }

    /// This tracker's TID (names its commit-change log).
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Value copy of the tracker's local status.
    pub fn status(&self) -> ReplicationStatus {
        *self.local.lock()
    }

    fn folder_for(&self, toggler: bool) -> PathBuf {
        let index = if toggler { 0 } else { 1 };
        PathBuf::from(&self.options.base_folders[index])
    }

    /// Currently authoritative base folder.
    pub fn active_folder(&self) -> PathBuf {
        self.folder_for(self.local.lock().active_folder_toggler)
    }

    /// Currently passive base folder.
    pub fn passive_folder(&self) -> PathBuf {
        self.folder_for(!self.local.lock().active_folder_toggler)
    }

    /// Status-file convergence on bring-up.
    ///
    /// A status file on the passive side that is newer than the active
    /// side's (or the only one present) marks a failover this process
    /// missed; the toggler flips before the file is read.
    fn read_status_on_init(&self, tok: &CancelToken) -> Result<()> {
        if !self.options.replicate {
            return Ok(());
        }
        let io = self.file_io.as_ref();
        let mut status = ReplicationStatus::default();

        let active = self.folder_for(status.active_folder_toggler);
        let passive = self.folder_for(!status.active_folder_toggler);
        let active_mtime = status_file_mtime(io, tok, &active).unwrap_or(None);
        let passive_mtime = status_file_mtime(io, tok, &passive).unwrap_or(None);

        let flip = match (active_mtime, passive_mtime) {
            (None, Some(_)) => true,
            (Some(a), Some(p)) => p > a,
            _ => false,
        };
        if flip {
            status.active_folder_toggler = !status.active_folder_toggler;
        }

        let authoritative = self.folder_for(status.active_folder_toggler);
        match read_status_file(io, tok, &authoritative)? {
            Some(on_disk) => status = on_disk,
            None => {
                // First bring-up: persist the defaults on the active side.
                write_status_file(io, tok, &authoritative, &status)?;
            }
        }

        *self.local.lock() = status;
        self.cell.set(status);
        Ok(())
    }

    fn pull_cache_into(&self, tok: &CancelToken, slot: &mut ReplicationStatus) {
        match self.cache.get_struct::<ReplicationStatus>(
            tok,
            REPLICATION_STATUS_CACHE_KEY,
            Some(self.options.cache_ttl),
        ) {
            Ok(Some(cached)) => *slot = cached,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "replication status cache pull failed"),
        }
    }

    fn push_cache_from(&self, tok: &CancelToken, current: &ReplicationStatus) {
        let cached = self
            .cache
            .get_struct::<ReplicationStatus>(
                tok,
                REPLICATION_STATUS_CACHE_KEY,
                Some(self.options.cache_ttl),
            )
            .unwrap_or_else(|e| {
                warn!(error = %e, "replication status cache read failed");
                None
            });
        if cached.as_ref() == Some(current) {
            return;
        }
        if let Err(e) = self.cache.set_struct(
            tok,
            REPLICATION_STATUS_CACHE_KEY,
            current,
            Some(self.options.cache_ttl),
        ) {
            warn!(error = %e, "replication status cache push failed");
        }
    }

    /// Sync the global status with the shared cache.
    ///
    /// Pull overwrites the global copy when the cache has an entry; push
    /// writes the global copy out when the cache is absent or stale.
    /// Cache failures are warned and swallowed.
    pub fn sync_with_cache(&self, tok: &CancelToken, push: bool) -> Result<()> {
        tok.ensure_active()?;
        if push {
            let current = self.cell.get();
            self.push_cache_from(tok, &current);
        } else {
            let mut guard = self.cell.lock();
            self.pull_cache_into(tok, &mut guard);
        }
        Ok(())
    }

    /// Record that replication to the passive target failed.
    ///
    /// If another process already recorded the failure (visible through
    /// the cache), only the local copy is marked; otherwise the flag is
    /// set globally, persisted to the active folder, and pushed out.
    pub fn handle_failed_to_replicate(&self, tok: &CancelToken) -> Result<()> {
        tok.ensure_active()?;
        if !self.options.replicate || self.local.lock().failed_to_replicate {
            return Ok(());
        }

        let mut guard = self.cell.lock();
        self.pull_cache_into(tok, &mut guard);
        if guard.failed_to_replicate {
            self.local.lock().failed_to_replicate = true;
            return Ok(());
        }

        guard.failed_to_replicate = true;
        let snapshot = *guard;
        *self.local.lock() = snapshot;
        drop(guard);

        let active = self.folder_for(snapshot.active_folder_toggler);
        if let Err(e) = write_status_file(self.file_io.as_ref(), tok, &active, &snapshot) {
            warn!(error = %e, "persisting failed-to-replicate status failed");
        }
        self.push_cache_from(tok, &snapshot);
        Ok(())
    }

    /// Flip the active/passive toggler in response to a failure.
    ///
    /// Idempotent across concurrent callers: the toggler comparison is
    /// checked before and after taking the global mutex (with a cache
    /// re-pull in between), so one logical failure event flips at most
    /// once. The post-flip status is persisted to the current passive
    /// folder FIRST; that write failing is the only fatal outcome.
    pub fn failover(&self, tok: &CancelToken) -> Result<()> {
        tok.ensure_active()?;
        if !self.options.replicate {
            return Ok(());
        }
        {
            let local = *self.local.lock();
            let global = self.cell.get();
            if global.active_folder_toggler != local.active_folder_toggler
                || local.failed_to_replicate
            {
                return Ok(());
            }
        }

        let mut guard = self.cell.lock();
        self.pull_cache_into(tok, &mut guard);
        let local = *self.local.lock();
        if guard.active_folder_toggler != local.active_folder_toggler
            || guard.failed_to_replicate
        {
            // Someone beat us to it; adopt the newer state.
            *self.local.lock() = *guard;
            return Ok(());
        }

        let mut next = *guard;
        next.failed_to_replicate = true;
        next.active_folder_toggler = !next.active_folder_toggler;

        // The current passive side becomes active the moment this file
        // lands; on crash-before-flip, init sees the newer file there.
        let new_active = self.folder_for(next.active_folder_toggler);
        write_status_file(self.file_io.as_ref(), tok, &new_active, &next)?;

        *guard = next;
        *self.local.lock() = next;
        drop(guard);

        self.push_cache_from(tok, &next);
        info!(
            new_active = %new_active.display(),
            "failover: active folder toggled"
        );
        Ok(())
    }

    /// Classify an I/O error observed by the transaction layer and
    /// failover when it qualifies.
    ///
    /// Qualifying conditions: the I/O or rollback error is the
    /// restore-registry-sector sentinel, or the I/O error's code clears
    /// the failover threshold. A successful rollback suppresses the
    /// failover for non-qualified errors only.
    pub fn handle_replication_related_error(
        &self,
        tok: &CancelToken,
        io_err: Option<&Error>,
        rollback_err: Option<&Error>,
        rollback_succeeded: bool,
    ) -> Result<()> {
        let sector = io_err.is_some_and(|e| e.is_restore_registry_sector())
            || rollback_err.is_some_and(|e| e.is_restore_registry_sector());
        let qualified = io_err.is_some_and(|e| e.is_failover_qualified());
        if !sector && !qualified {
            return Ok(());
        }
        if rollback_succeeded && !qualified {
            return Ok(());
        }
        warn!(
            code = io_err.map(|e| e.code()).unwrap_or_default(),
            sector, "replication-related error qualifies for failover"
        );
        self.failover(tok)
    }

    /// Turn on commit-change logging (globally and locally) and persist.
    pub fn start_logging_commit_changes(&self, tok: &CancelToken) -> Result<()> {
        tok.ensure_active()?;
        if !self.options.replicate {
            return Ok(());
        }
        let mut guard = self.cell.lock();
        guard.log_commit_changes = true;
        let snapshot = *guard;
        *self.local.lock() = snapshot;
        drop(guard);

        let active = self.folder_for(snapshot.active_folder_toggler);
        if let Err(e) = write_status_file(self.file_io.as_ref(), tok, &active, &snapshot) {
            warn!(error = %e, "persisting log-commit-changes status failed");
        }
        self.push_cache_from(tok, &snapshot);
        Ok(())
    }

    /// Clear the failure and logging flags: replication is healthy again.
    pub fn turn_on_replication(&self, tok: &CancelToken) -> Result<()> {
        tok.ensure_active()?;
        if !self.options.replicate {
            return Ok(());
        }
        let mut guard = self.cell.lock();
        guard.failed_to_replicate = false;
        guard.log_commit_changes = false;
        let snapshot = *guard;
        *self.local.lock() = snapshot;
        drop(guard);

        let active = self.folder_for(snapshot.active_folder_toggler);
        if let Err(e) = write_status_file(self.file_io.as_ref(), tok, &active, &snapshot) {
            warn!(error = %e, "persisting replication-restored status failed");
        }
        self.push_cache_from(tok, &snapshot);
        Ok(())
    }

    /// Append this commit's store and registry mutations to the
    /// commit-change log, if logging is enabled.
    ///
    /// The `commitlogs` folder is provisioned by the host; a missing
    /// folder fails the write.
    pub fn log_commit_changes(
        &self,
        tok: &CancelToken,
        stores: &[StoreInfo],
        new_root: &[RegistryPayload<Handle>],
        added: &[RegistryPayload<Handle>],
        updated: &[RegistryPayload<Handle>],
        removed: &[RegistryPayload<Handle>],
    ) -> Result<()> {
        if !self.options.replicate || !self.cell.get().log_commit_changes {
            return Ok(());
        }
        let record = CommitChangeRecord {
            stores: stores.to_vec(),
            new_root: new_root.to_vec(),
            added: added.to_vec(),
            updated: updated.to_vec(),
            removed: removed.to_vec(),
        };
        commitlog::write_commit_log(
            self.file_io.as_ref(),
            tok,
            &self.active_folder(),
            self.tid,
            &record,
        )
    }

    /// Replay the oldest commit-change log onto the passive target.
    ///
    /// Returns whether a log was processed; the caller drains by looping
    /// until `false`. Each store's count is re-enriched from the store
    /// repository before replication, then the log file is deleted.
    pub fn fast_forward(&self, tok: &CancelToken) -> Result<bool> {
        tok.ensure_active()?;
        let io = self.file_io.as_ref();
        let active = self.active_folder();
        let Some(path) = commitlog::oldest_commit_log(io, tok, &active)? else {
            return Ok(false);
        };
        let mut record = commitlog::read_commit_log(io, tok, &path)?;

        for store in &mut record.stores {
            store.count = self.store_repo.get_store_count(tok, &store.name)?;
        }
        self.store_repo.replicate(tok, &record.stores)?;
        self.registry.replicate(
            tok,
            &record.new_root,
            &record.added,
            &record.updated,
            &record.removed,
        )?;
        io.remove(tok, &path)?;
        Ok(true)
    }

    /// Bring a previously failed passive target back in sync.
    ///
    /// Requires replication to be on and a recorded failure. Commit
    /// logging starts first so writes landing during the bulk copy are
    /// captured; the logs are drained, replication is switched back on,
    /// and a final drain catches anything logged in the gap.
    pub fn reinstate_failed_drives(&self, tok: &CancelToken) -> Result<()> {
        tok.ensure_active()?;
        let local = *self.local.lock();
        if !self.options.replicate || !local.failed_to_replicate {
            return Err(Error::Replication(
                "nothing to reinstate: replication is off or never failed".into(),
            ));
        }

        self.start_logging_commit_changes(tok)?;
        self.copier.copy_to_passive_folders(tok)?;
        while self.fast_forward(tok)? {}
        self.turn_on_replication(tok)?;
        while self.fast_forward(tok)? {}
        info!("passive target reinstated");
        Ok(())
    }
}
