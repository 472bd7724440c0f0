//! # Page Frames and Page Types
//!
//! A [`PageFrame`] is the in-memory view of one disk page: a fixed buffer, a
//! read/write lock guarding its contents, a dirty flag, and a pin count used
//! by the cache's eviction policy.
//!
//! ## Page Layout
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -----------------------------------------
//! 0       4     used       bytes occupied from the page start (LE),
//!                          header included; never below 8
//! 4       4     page_type  bitfield, see PageType
//! 8       ...   payload    record frames appended back to back
//! ```
//!
//! ## Page Types
//!
//! `page_type` is a u32 bitfield. Bit 0 marks meta pages and bit 1 marks
//! data pages; the two are mutually exclusive. Higher bits discriminate
//! subkinds (database meta, table meta, index, record). Type tests use the
//! mask bits, never equality, so a subkind always answers its base class
//! correctly.
//!
//! ## Locking
//!
//! Mutations (`append`, `overwrite`, marker writes) take the frame's write
//! lock; header reads take the read lock. The lock is internal to each
//! operation - callers never hold it across calls, which keeps the global
//! lock order (free-space map before page) easy to uphold.
//!
//! ## Version Markers
//!
//! The database meta page carries two 8-byte markers (offsets 100 and 108).
//! `mark_running` fills the live marker with fresh random bytes at startup;
//! `mark_clean` copies it into the shadow slot at clean shutdown. Equal
//! markers at open time mean the previous run shut down cleanly. The marker
//! operations refuse (panic) on any page that is not the database meta page;
//! calling them elsewhere is a bug, not a runtime condition.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;
use thiserror::Error;

use super::{PageId, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::config::{MARKER_LEN, MARKER_LIVE_OFFSET, MARKER_SHADOW_OFFSET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageType(u32);

impl PageType {
    pub const META_BIT: u32 = 1 << 0;
    pub const DATA_BIT: u32 = 1 << 1;

    pub const META: PageType = PageType(Self::META_BIT);
    pub const DATA: PageType = PageType(Self::DATA_BIT);
    pub const DB_META: PageType = PageType(Self::META_BIT | 1 << 15);
    pub const TABLE_META: PageType = PageType(Self::META_BIT | 1 << 16);
    pub const INDEX: PageType = PageType(Self::DATA_BIT | 1 << 17);
    pub const RECORD: PageType = PageType(Self::DATA_BIT | 1 << 18);

    pub fn from_raw(raw: u32) -> Self {
        PageType(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_meta(self) -> bool {
        self.0 & Self::META_BIT != 0
    }

    pub fn is_data(self) -> bool {
        self.0 & Self::DATA_BIT != 0
    }
}

#[derive(Debug, Error)]
#[error(
    "page {page_id} overflow: {len} bytes at offset {offset} exceed the {page_size}-byte page",
    page_size = PAGE_SIZE
)]
pub struct PageOverflow {
    pub page_id: PageId,
    pub offset: usize,
    pub len: usize,
}

pub struct PageFrame {
    page_id: PageId,
    buf: UnsafeCell<Box<[u8; PAGE_SIZE]>>,
    lock: RwLock<()>,
    dirty: AtomicBool,
    pin_count: AtomicU32,
    visited: AtomicBool,
}

// SAFETY: the buffer behind the UnsafeCell is only reached through methods
// that hold `lock` (writers exclusively), or through `slice`, whose caller
// must keep the frame pinned for the borrow's lifetime. The atomics carry
// their own synchronization.
unsafe impl Send for PageFrame {}
unsafe impl Sync for PageFrame {}

impl PageFrame {
    pub(crate) fn new(page_id: PageId, buf: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            page_id,
            buf: UnsafeCell::new(buf),
            lock: RwLock::new(()),
            dirty: AtomicBool::new(false),
            pin_count: AtomicU32::new(0),
            visited: AtomicBool::new(false),
        }
    }

    pub(crate) fn new_formatted(page_id: PageId, page_type: PageType) -> Self {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        encode_used(&mut buf[..], PAGE_HEADER_SIZE);
        encode_type(&mut buf[..], page_type);
        Self::new(page_id, buf)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    fn bytes(&self) -> &[u8; PAGE_SIZE] {
        // SAFETY: callers hold `lock` (read or write) for the duration of
        // the returned borrow; see each call site.
        unsafe { &*self.buf.get() }
    }

    #[allow(clippy::mut_from_ref)]
    fn bytes_mut(&self) -> &mut [u8; PAGE_SIZE] {
        // SAFETY: callers hold the write lock for the duration of the
        // returned borrow; see each call site.
        unsafe { &mut *self.buf.get() }
    }

    pub fn used(&self) -> usize {
        let _guard = self.lock.read();
        decode_used(self.bytes().as_slice())
    }

    pub fn free(&self) -> usize {
        let _guard = self.lock.read();
        PAGE_SIZE - decode_used(self.bytes().as_slice())
    }

    pub fn page_type(&self) -> PageType {
        let _guard = self.lock.read();
        decode_type(self.bytes().as_slice())
    }

    pub fn is_meta(&self) -> bool {
        self.page_type().is_meta()
    }

    pub fn is_data(&self) -> bool {
        self.page_type().is_data()
    }

    pub fn append(&self, bytes: &[u8]) -> Result<usize, PageOverflow> {
        let _guard = self.lock.write();
        let data = self.bytes_mut();
        let used = decode_used(data.as_slice());

        if used + bytes.len() > PAGE_SIZE {
            return Err(PageOverflow {
                page_id: self.page_id,
                offset: used,
                len: bytes.len(),
            });
        }

        data[used..used + bytes.len()].copy_from_slice(bytes);
        encode_used(data.as_mut_slice(), used + bytes.len());
        self.dirty.store(true, Ordering::Release);
        Ok(used)
    }

    pub fn overwrite(&self, bytes: &[u8], offset: usize) -> Result<(), PageOverflow> {
        let _guard = self.lock.write();
        let data = self.bytes_mut();

        if offset + bytes.len() > PAGE_SIZE {
            return Err(PageOverflow {
                page_id: self.page_id,
                offset,
                len: bytes.len(),
            });
        }

        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        if offset + bytes.len() > decode_used(data.as_slice()) {
            encode_used(data.as_mut_slice(), offset + bytes.len());
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) fn slice(&self, offset: usize, len: usize) -> &[u8] {
        let _guard = self.lock.read();
        let ptr = self.bytes().as_ptr();
        // SAFETY: the buffer is a stable Box allocation valid for PAGE_SIZE
        // bytes for as long as this frame lives; the caller keeps the frame
        // pinned (via PageRef) while using the slice, and the bounds are
        // checked below before the guard drops.
        assert!(
            offset + len <= PAGE_SIZE,
            "slice [{offset}, {offset}+{len}) out of page bounds"
        );
        unsafe { std::slice::from_raw_parts(ptr.add(offset), len) }
    }

    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        let _guard = self.lock.read();
        f(self.bytes())
    }

    pub fn is_marked_clean(&self) -> bool {
        assert!(
            self.page_type() == PageType::DB_META,
            "version marker check on a non-meta page (type {:#x})",
            self.page_type().raw()
        );
        let _guard = self.lock.read();
        let data = self.bytes();
        data[MARKER_LIVE_OFFSET..MARKER_LIVE_OFFSET + MARKER_LEN]
            == data[MARKER_SHADOW_OFFSET..MARKER_SHADOW_OFFSET + MARKER_LEN]
    }

    pub fn mark_running(&self) {
        assert!(
            self.page_type() == PageType::DB_META,
            "version marker write on a non-meta page (type {:#x})",
            self.page_type().raw()
        );
        let marker: [u8; MARKER_LEN] = rand::random();
        let _guard = self.lock.write();
        let data = self.bytes_mut();
        data[MARKER_LIVE_OFFSET..MARKER_LIVE_OFFSET + MARKER_LEN].copy_from_slice(&marker);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn mark_clean(&self) {
        assert!(
            self.page_type() == PageType::DB_META,
            "version marker write on a non-meta page (type {:#x})",
            self.page_type().raw()
        );
        let _guard = self.lock.write();
        let data = self.bytes_mut();
        let live: [u8; MARKER_LEN] = data[MARKER_LIVE_OFFSET..MARKER_LIVE_OFFSET + MARKER_LEN]
            .try_into()
            .unwrap();
        data[MARKER_SHADOW_OFFSET..MARKER_SHADOW_OFFSET + MARKER_LEN].copy_from_slice(&live);
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin called on unpinned page");
    }

    pub(crate) fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    pub(crate) fn mark_visited(&self) {
        self.visited.store(true, Ordering::Release);
    }

    pub(crate) fn clear_visited(&self) -> bool {
        self.visited.swap(false, Ordering::AcqRel)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

fn decode_used(data: &[u8]) -> usize {
    u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize
}

fn encode_used(data: &mut [u8], used: usize) {
    data[0..4].copy_from_slice(&(used as u32).to_le_bytes());
}

fn decode_type(data: &[u8]) -> PageType {
    PageType::from_raw(u32::from_le_bytes(data[4..8].try_into().unwrap()))
}

fn encode_type(data: &mut [u8], page_type: PageType) {
    data[4..8].copy_from_slice(&page_type.raw().to_le_bytes());
}
