//! # heapfile - Crash-Safe Paged Record Storage
//!
//! heapfile is the data layer of an embedded database: it stores
//! variable-length records in a single paged file and hands out stable 64-bit
//! record handles. Page layout, free-space tracking, and write-ahead redo
//! logging are hidden behind a small record-oriented API.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use heapfile::{RecordStore, TxnManager};
//!
//! let txns = Arc::new(TxnManager::open(path)?);
//! let store = RecordStore::open(path, 8 * 1024 * 1024, Arc::clone(&txns))?;
//!
//! let xid = txns.begin()?;
//! let rid = store.insert(xid, b"hello")?;
//! txns.commit(xid)?;
//!
//! let rec = store.read(rid)?.expect("record is live");
//! assert_eq!(rec.payload(), b"hello");
//! drop(rec);
//!
//! store.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │       Record API (RecordStore)       │
//! ├──────────────┬───────────────────────┤
//! │ FreeSpaceMap │  RedoLog │ TxnManager │
//! ├──────────────┴───────────────────────┤
//! │       Page Cache (pinned frames)     │
//! ├──────────────────────────────────────┤
//! │       Paged File I/O (PageIo)        │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A store is a directory:
//!
//! ```text
//! store_dir/
//! ├── data.hf     # paged file: page 1 = database meta, pages 2+ = data
//! ├── redo.log    # append-only redo log (insert/update images)
//! └── txns        # transaction status table (one byte per xid)
//! ```
//!
//! ## Crash Safety
//!
//! The database meta page carries two 8-byte markers. On startup the live
//! marker is re-randomized; on clean shutdown it is copied into the shadow
//! slot. Equal markers therefore witness a clean shutdown; unequal markers
//! trigger redo-log replay before the store is opened for business.
//!
//! ## Module Overview
//!
//! - [`storage`]: paged file I/O, page frames, page cache, free-space map
//! - [`record`]: record framing, record ids, pinned record views
//! - [`wal`]: append-only redo log with checksummed records
//! - [`txn`]: transaction ids and durable commit/abort status
//! - [`store`]: the record store composing all of the above

pub mod config;
pub mod record;
pub mod storage;
pub mod store;
pub mod txn;
pub mod wal;

pub use record::{RecordId, RecordRef};
pub use storage::{PageOverflow, PageType};
pub use store::{RecordStore, RecordTooLarge};
pub use txn::{TxnId, TxnManager, TxnState};
