//! # Crash Recovery
//!
//! Repairs the paged file from the redo log after an unclean shutdown. The
//! store detects the crash through the meta-page version markers and calls
//! [`crash_recover`] before anything else touches the pages.
//!
//! ## Replay Algorithm
//!
//! ```text
//! read every intact log record (the torn tail is discarded)
//!       │
//!       ▼
//! forward pass:  every record of a COMMITTED transaction is re-applied -
//!                inserts and updates write their new image at the
//!                recorded offset
//!       │
//!       ▼
//! backward pass: every record of an uncommitted transaction is undone -
//!                updates restore their old image, inserts are tombstoned
//!                (the slot is never reclaimed, so the id stays dead)
//!       │
//!       ▼
//! flush every touched page, then the caller truncates the log
//! ```
//!
//! Re-applying an image is idempotent: it writes the logged bytes at the
//! logged offset, extending the page's used watermark when the original
//! append never reached the disk. Replaying an already-applied record
//! therefore changes nothing, which is exactly what makes repeated crashes
//! during recovery safe.
//!
//! ## What Counts as Uncommitted
//!
//! Anything the transaction table does not mark committed: transactions
//! still active at crash time and transactions that had already aborted.
//! Both must not leave visible effects.

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use log::warn;
use smallvec::SmallVec;

use crate::record::{set_frame_invalid, RecordId};
use crate::storage::PageCache;
use crate::txn::TxnManager;
use crate::wal::{RedoKind, RedoLog};

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryReport {
    pub redone: usize,
    pub undone: usize,
}

pub(crate) fn crash_recover(
    cache: &PageCache,
    txns: &TxnManager,
    redo: &RedoLog,
) -> Result<RecoveryReport> {
    let records = redo.records()?;
    let mut committed: HashMap<u64, bool> = HashMap::new();
    let mut touched: SmallVec<[u64; 16]> = SmallVec::new();
    let mut report = RecoveryReport::default();

    for record in &records {
        if is_committed(txns, &mut committed, record.xid) {
            apply_image(cache, record.rid, &record.new)
                .wrap_err_with(|| format!("redo of record {} failed", record.rid))?;
            note_touched(&mut touched, record.rid.page_id());
            report.redone += 1;
        }
    }

    for record in records.iter().rev() {
        if is_committed(txns, &mut committed, record.xid) {
            continue;
        }

        match record.kind {
            RedoKind::Update => {
                apply_image(cache, record.rid, &record.old)
                    .wrap_err_with(|| format!("undo of record {} failed", record.rid))?;
            }
            RedoKind::Insert => {
                let mut image = record.new.clone();
                set_frame_invalid(&mut image);
                apply_image(cache, record.rid, &image)
                    .wrap_err_with(|| format!("tombstone of record {} failed", record.rid))?;
            }
        }
        note_touched(&mut touched, record.rid.page_id());
        report.undone += 1;
    }

    if !touched.is_empty() {
        cache.flush_all()?;
    }

    Ok(report)
}

fn is_committed(txns: &TxnManager, memo: &mut HashMap<u64, bool>, xid: u64) -> bool {
    *memo.entry(xid).or_insert_with(|| txns.is_committed(xid))
}

fn apply_image(cache: &PageCache, rid: RecordId, image: &[u8]) -> Result<()> {
    if rid.page_id() > cache.page_count() {
        warn!(
            "redo log references page {} beyond the file ({} pages), skipping",
            rid.page_id(),
            cache.page_count()
        );
        return Ok(());
    }

    let page = cache.get_page(rid.page_id())?;
    page.overwrite(image, rid.offset())
        .map_err(|e| eyre::eyre!("logged image does not fit its page: {}", e))
}

fn note_touched(touched: &mut SmallVec<[u64; 16]>, page_id: u64) {
    if !touched.contains(&page_id) {
        touched.push(page_id);
    }
}
