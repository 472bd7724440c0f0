//! # Record Store
//!
//! The top-level record service: insert, read, update, and delete
//! variable-length records by stable 64-bit id, with crash safety provided
//! by the redo log and the meta-page version markers.
//!
//! ## Control Flow
//!
//! Insert:
//!
//! ```text
//! frame payload ─> pick page (free-space map, or allocate)
//!               ─> log the insert image (durable)
//!               ─> append the frame to the page
//!               ─> re-file the page's remaining free bytes
//!               ─> return (page_id << 32) | offset
//! ```
//!
//! Startup:
//!
//! ```text
//! pin meta page ─> markers equal?
//!                    no:  replay the redo log (see store::recovery)
//!                    yes: nothing to repair
//!               ─> truncate the log
//!               ─> randomize the live marker, flush the meta page
//!               ─> rebuild the free-space map from a full page scan
//! ```
//!
//! Shutdown copies the live marker into the shadow slot and flushes
//! everything, so the next startup sees equal markers and skips replay. A
//! crash anywhere between those two points leaves the markers unequal and
//! recovery runs.
//!
//! ## Update Semantics
//!
//! An update whose new frame fits inside the old one is performed in place
//! and keeps its id. A growing update tombstones the old record and inserts
//! the new bytes elsewhere; the caller gets the new id. Tombstoned slots are
//! never reclaimed - ids stay unambiguous forever - and a page's free bytes
//! are never returned to the free-space map by a delete.
//!
//! ## Error Classes
//!
//! - [`RecordTooLarge`] is the one recoverable user error: the framed
//!   payload exceeds what a single page can hold.
//! - I/O failures surface as `eyre` reports; the store should be closed.
//! - Contract violations (updating a dead record, double begin/commit
//!   misuse) panic - they are bugs in the caller, not runtime conditions.

pub mod recovery;

use std::path::Path;
use std::sync::Arc;

use eyre::{ensure, Result, WrapErr};
use log::{debug, info};
use thiserror::Error;

use crate::config::{DATA_FILE_NAME, MAX_FREE, META_PAGE_ID, PAGE_SIZE};
use crate::record::{encode_frame, set_frame_invalid, RecordId, RecordRef};
use crate::storage::{FilePageIo, FreeSpaceMap, PageCache, PageRef, PageType};
use crate::txn::{TxnId, TxnManager};
use crate::wal::RedoLog;

#[derive(Debug, Error)]
#[error("record of {framed} framed bytes exceeds the {max} bytes a page can hold", max = MAX_FREE)]
pub struct RecordTooLarge {
    pub framed: usize,
}

pub struct RecordStore {
    cache: Arc<PageCache>,
    free_space: FreeSpaceMap,
    redo: RedoLog,
    txns: Arc<TxnManager>,
    meta: PageRef,
}

impl RecordStore {
    pub fn open<P: AsRef<Path>>(
        root: P,
        cache_bytes: usize,
        txns: Arc<TxnManager>,
    ) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .wrap_err_with(|| format!("failed to create store directory '{}'", root.display()))?;

        let io = FilePageIo::open(root.join(DATA_FILE_NAME))?;
        let cache = Arc::new(PageCache::new(Box::new(io), cache_bytes / PAGE_SIZE)?);

        if cache.page_count() == 0 {
            let id = cache.new_page(PageType::DB_META)?;
            ensure!(
                id == META_PAGE_ID,
                "bootstrap allocated page {} for the database meta page",
                id
            );
        }

        let redo = RedoLog::open(root)?;
        let meta = cache.get_page(META_PAGE_ID)?;
        ensure!(
            meta.page_type() == PageType::DB_META,
            "page {} is not a database meta page (type {:#x})",
            META_PAGE_ID,
            meta.page_type().raw()
        );

        if !meta.is_marked_clean() {
            info!("unclean shutdown detected at '{}', replaying redo log", root.display());
            let report = recovery::crash_recover(&cache, &txns, &redo)?;
            info!(
                "recovery applied {} committed and rolled back {} uncommitted mutations",
                report.redone, report.undone
            );
        }

        redo.reset()?;
        meta.mark_running();
        cache.flush_page(&meta)?;

        let free_space = FreeSpaceMap::new();
        let tracked = free_space.rebuild(&cache)?;
        debug!(
            "opened record store at '{}': {} pages, {} tracked for free space",
            root.display(),
            cache.page_count(),
            tracked
        );

        Ok(Self {
            cache,
            free_space,
            redo,
            txns,
            meta,
        })
    }

    pub fn insert(&self, xid: TxnId, payload: &[u8]) -> Result<RecordId> {
        let raw = encode_frame(payload);
        if raw.len() > MAX_FREE {
            return Err(RecordTooLarge { framed: raw.len() }.into());
        }

        let page_id = match self.free_space.select(raw.len()) {
            Some(space) => space.page_id,
            None => self.cache.new_page(PageType::DATA)?,
        };

        let page = self.cache.get_page(page_id)?;
        let offset = page.used();
        let rid = RecordId::new(page_id, offset);

        self.redo.log_insert(xid, rid, &raw)?;

        if let Err(e) = page.append(&raw) {
            panic!("free-space selector handed out a page without room: {e}");
        }

        self.free_space.add_page(page_id, page.free());
        Ok(rid)
    }

    pub fn read(&self, rid: RecordId) -> Result<Option<RecordRef>> {
        if rid.is_none() {
            return Ok(None);
        }

        let page = self.cache.get_page(rid.page_id())?;
        let record = RecordRef::load(page, rid)?;

        if record.is_valid() {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    pub fn update(&self, xid: TxnId, rid: RecordId, payload: &[u8]) -> Result<RecordId> {
        let record = match self.read(rid)? {
            Some(record) => record,
            None => panic!("update of a dead record {rid}"),
        };

        let new_raw = encode_frame(payload);
        if new_raw.len() <= record.frame_len() {
            let old_raw = record.raw().to_vec();
            self.redo.log_update(xid, rid, &old_raw, &new_raw)?;
            record.overwrite(&new_raw)?;
            Ok(rid)
        } else {
            drop(record);
            self.delete(xid, rid)?;
            self.insert(xid, payload)
        }
    }

    pub fn delete(&self, xid: TxnId, rid: RecordId) -> Result<()> {
        if let Some(record) = self.read(rid)? {
            let old_raw = record.raw().to_vec();
            let mut new_raw = old_raw.clone();
            set_frame_invalid(&mut new_raw);

            self.redo.log_update(xid, rid, &old_raw, &new_raw)?;
            record.tombstone()?;
        }
        Ok(())
    }

    pub fn release(&self, record: RecordRef) {
        drop(record);
    }

    pub fn page_count(&self) -> u64 {
        self.cache.page_count()
    }

    pub fn close(&self) -> Result<()> {
        self.txns.close()?;
        self.redo.close()?;

        self.meta.mark_clean();
        self.cache.flush_page(&self.meta)?;
        self.cache.close()?;

        debug!("record store closed cleanly");
        Ok(())
    }
}
