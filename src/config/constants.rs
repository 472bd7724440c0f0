//! # heapfile Configuration Constants
//!
//! This module centralizes the on-disk format constants. Values that derive
//! from each other are co-located and guarded by compile-time assertions so
//! a change to one cannot silently invalidate another.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (8192 bytes)
//!       │
//!       ├─> PAGE_HEADER_SIZE (8 bytes: used u32 LE + page_type u32 LE)
//!       │
//!       ├─> MAX_FREE (derived: PAGE_SIZE - PAGE_HEADER_SIZE)
//!       │     Upper bound on a single framed record; larger inserts are
//!       │     rejected (records never span pages).
//!       │
//!       └─> FREE_INTERVALS (derived: PAGE_SIZE / FREE_THRESHOLD)
//!
//! FREE_THRESHOLD (128 bytes)
//!       │
//!       └─> TINY_THRESHOLD (32) and OMITTED_BELOW (8)
//!             Pages with free bytes in [OMITTED_BELOW, TINY_THRESHOLD) live
//!             in the tiny container; below OMITTED_BELOW they are dropped
//!             from the free-space map for good.
//!
//! FRAME_HEADER_SIZE (9 bytes: valid u8 + size u64 BE)
//!       │
//!       └─> MAX_PAYLOAD (derived: MAX_FREE - FRAME_HEADER_SIZE)
//! ```
//!
//! ## Endianness
//!
//! The page header fields are little-endian u32; the record frame size is a
//! big-endian u64. Both are format facts, preserved for compatibility, and
//! each is isolated behind a single encode/decode helper at its use site.

// ============================================================================
// PAGE GEOMETRY
// ============================================================================

/// Size of each page in bytes. The fundamental unit of I/O and caching.
pub const PAGE_SIZE: usize = 8192;

/// Size of the page header: `used` (u32 LE) followed by `page_type` (u32 LE).
/// `used` counts occupied bytes from the start of the page, header included.
pub const PAGE_HEADER_SIZE: usize = 8;

/// Maximum bytes of record data a single data page can hold.
pub const MAX_FREE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Page id of the database meta page. Page ids are 1-based; the meta page is
/// pinned in the cache for the whole lifetime of the store.
pub const META_PAGE_ID: u64 = 1;

const _: () = assert!(
    MAX_FREE == PAGE_SIZE - PAGE_HEADER_SIZE,
    "MAX_FREE derivation mismatch"
);

// ============================================================================
// RECORD FRAMING
// ============================================================================

/// Framing overhead per record: 1 validity byte + 8-byte big-endian length.
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest payload a single record can carry.
pub const MAX_PAYLOAD: usize = MAX_FREE - FRAME_HEADER_SIZE;

// ============================================================================
// META PAGE VERSION MARKER
// ============================================================================

/// Byte offset of the live run marker inside the database meta page.
pub const MARKER_LIVE_OFFSET: usize = 100;

/// Byte offset of the shadow marker. Equal live/shadow bytes witness a clean
/// shutdown; they differ at every other moment of a store's life.
pub const MARKER_SHADOW_OFFSET: usize = 108;

/// Length of each marker in bytes.
pub const MARKER_LEN: usize = 8;

const _: () = assert!(
    MARKER_SHADOW_OFFSET == MARKER_LIVE_OFFSET + MARKER_LEN,
    "shadow marker must directly follow the live marker"
);

const _: () = assert!(
    MARKER_SHADOW_OFFSET + MARKER_LEN <= PAGE_SIZE,
    "version markers must fit inside the meta page"
);

// ============================================================================
// FREE-SPACE MAP
// ============================================================================

/// Width of one free-space interval bucket in bytes.
pub const FREE_THRESHOLD: usize = 128;

/// Pages with fewer free bytes than this (but at least OMITTED_BELOW) are
/// tracked in the tiny ordered container instead of the interval buckets.
pub const TINY_THRESHOLD: usize = 32;

/// Number of interval buckets.
pub const FREE_INTERVALS: usize = PAGE_SIZE / FREE_THRESHOLD;

/// Pages with fewer free bytes than this are dropped from the free-space map
/// entirely; the waste is accepted.
pub const OMITTED_BELOW: usize = 8;

const _: () = assert!(
    FREE_INTERVALS * FREE_THRESHOLD == PAGE_SIZE,
    "FREE_THRESHOLD must divide PAGE_SIZE evenly"
);

const _: () = assert!(
    OMITTED_BELOW <= TINY_THRESHOLD && TINY_THRESHOLD < FREE_THRESHOLD,
    "free-space thresholds must be ordered OMITTED_BELOW <= TINY < THRESHOLD"
);

// ============================================================================
// FILES
// ============================================================================

/// Name of the paged data file inside the store directory.
pub const DATA_FILE_NAME: &str = "data.hf";

/// Name of the redo log file inside the store directory.
pub const REDO_FILE_NAME: &str = "redo.log";

/// Name of the transaction status file inside the store directory.
pub const TXN_FILE_NAME: &str = "txns";

// ============================================================================
// CACHE
// ============================================================================

/// Minimum number of frames the page cache will run with. The meta page is
/// pinned permanently, so a pool smaller than this risks starving eviction.
pub const MIN_CACHE_PAGES: usize = 8;
