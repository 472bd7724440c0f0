//! # Records
//!
//! A record lives inside a data page as a self-describing frame:
//!
//! ```text
//! Offset  Size  Field    Description
//! ------  ----  -------  ------------------------------------
//! 0       1     valid    1 = live, 0 = tombstoned
//! 1       8     size     payload length, big-endian u64
//! 9       size  payload  caller bytes, opaque to the store
//! ```
//!
//! The frame size field is the one big-endian value in the file format; it
//! is preserved for compatibility and isolated behind the codec helpers in
//! this module.
//!
//! ## Record Ids
//!
//! A [`RecordId`] packs the owning page and the frame's byte offset into one
//! u64: `(page_id << 32) | offset`. Ids are stable for the lifetime of the
//! store - deletion tombstones the frame but never reclaims the slot, so an
//! id can never silently come to mean a different record. Id 0 is reserved
//! to mean "no record".
//!
//! ## Pinned Views
//!
//! A [`RecordRef`] is an owned view of one frame. It holds the page pin for
//! its whole lifetime - dropping the ref is what releases the page - so the
//! bytes it exposes can never be evicted out from under the caller. In-place
//! mutation (overwrite, tombstone) funnels through the frame's own
//! read/write lock and then the page lock, in that order.

use eyre::{ensure, Result};
use parking_lot::RwLock;
use zerocopy::big_endian::U64 as BeU64;
use zerocopy::{FromBytes, IntoBytes};

use crate::config::{FRAME_HEADER_SIZE, PAGE_SIZE};
use crate::storage::{PageId, PageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(u64);

impl RecordId {
    /// The reserved "no record" id.
    pub const NONE: RecordId = RecordId(0);

    pub fn new(page_id: PageId, offset: usize) -> Self {
        debug_assert!(page_id < 1 << 32, "page id overflows the handle encoding");
        debug_assert!(offset < PAGE_SIZE, "offset {offset} outside a page");
        RecordId((page_id << 32) | offset as u64)
    }

    pub fn from_u64(raw: u64) -> Self {
        RecordId(raw)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }

    pub fn page_id(self) -> PageId {
        self.0 >> 32
    }

    pub fn offset(self) -> usize {
        (self.0 & u32::MAX as u64) as usize
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id(), self.offset())
    }
}

pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    raw.push(1);
    raw.extend_from_slice(BeU64::new(payload.len() as u64).as_bytes());
    raw.extend_from_slice(payload);
    raw
}

pub fn frame_payload(raw: &[u8]) -> &[u8] {
    &raw[FRAME_HEADER_SIZE..]
}

pub fn set_frame_invalid(raw: &mut [u8]) {
    raw[0] = 0;
}

pub(crate) fn decode_frame_size(size_bytes: &[u8]) -> Result<usize> {
    let size = BeU64::read_from_bytes(size_bytes)
        .map_err(|e| eyre::eyre!("malformed frame size field: {:?}", e))?;
    Ok(size.get() as usize)
}

pub struct RecordRef {
    page: PageRef,
    rid: RecordId,
    frame_len: usize,
    lock: RwLock<()>,
}

impl RecordRef {
    pub(crate) fn load(page: PageRef, rid: RecordId) -> Result<RecordRef> {
        let offset = rid.offset();
        let used = page.used();

        ensure!(
            offset + FRAME_HEADER_SIZE <= used,
            "record {} points past the used area of its page ({} > {})",
            rid,
            offset + FRAME_HEADER_SIZE,
            used
        );

        let size = decode_frame_size(page.slice(offset + 1, 8))?;
        let frame_len = FRAME_HEADER_SIZE + size;

        ensure!(
            offset + frame_len <= used,
            "record {} frame of {} bytes overruns the used area of its page",
            rid,
            frame_len
        );

        Ok(RecordRef {
            page,
            rid,
            frame_len,
            lock: RwLock::new(()),
        })
    }

    pub fn id(&self) -> RecordId {
        self.rid
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn is_valid(&self) -> bool {
        let _guard = self.lock.read();
        self.page.slice(self.rid.offset(), 1)[0] == 1
    }

    pub fn raw(&self) -> &[u8] {
        let _guard = self.lock.read();
        // INVARIANT: the page stays pinned for as long as this RecordRef
        // lives, so the slice cannot be evicted out from under the caller.
        self.page.slice(self.rid.offset(), self.frame_len)
    }

    pub fn payload(&self) -> &[u8] {
        frame_payload(self.raw())
    }

    pub(crate) fn overwrite(&self, new_raw: &[u8]) -> Result<()> {
        ensure!(
            new_raw.len() <= self.frame_len,
            "in-place overwrite of record {} grows its frame ({} > {})",
            self.rid,
            new_raw.len(),
            self.frame_len
        );

        let _guard = self.lock.write();
        self.page
            .overwrite(new_raw, self.rid.offset())
            .map_err(|e| eyre::eyre!("record overwrite escaped its page: {}", e))
    }

    pub(crate) fn tombstone(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.page
            .overwrite(&[0], self.rid.offset())
            .map_err(|e| eyre::eyre!("record tombstone escaped its page: {}", e))
    }
}
