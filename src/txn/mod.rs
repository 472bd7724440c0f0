//! # Transaction Status
//!
//! The record store does not order transactions - it only needs to know,
//! at recovery time, which transactions committed before a crash. This
//! module provides that: monotonically increasing transaction ids and a
//! durable status table.
//!
//! ## File Format
//!
//! ```text
//! +------------------+
//! | Header (16 bytes)|  magic "HFTXNS01" + version u32 LE + reserved
//! +------------------+
//! | status of xid 1  |  one byte: 0 = active, 1 = committed, 2 = aborted
//! | status of xid 2  |
//! | ...              |
//! +------------------+
//! ```
//!
//! A transaction's id is its position in the table, so `begin` appends one
//! active byte, and `commit`/`abort` overwrite that byte in place. Every
//! status change is synced before the call returns - recovery must never
//! see a page mutation from a transaction whose commit was not yet durable.
//!
//! ## Reserved Id
//!
//! Xid 0 is the bootstrap transaction: it is always considered committed,
//! so system-initiated writes replay unconditionally.
//!
//! ## Concurrency
//!
//! The table is tiny (one byte per transaction ever begun) and is kept in
//! memory behind a mutex; the file is the durable copy.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::TXN_FILE_NAME;

pub type TxnId = u64;

pub const TXN_MAGIC: &[u8; 8] = b"HFTXNS01";
pub const TXN_VERSION: u32 = 1;
pub const TXN_FILE_HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

impl TxnState {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => TxnState::Committed,
            2 => TxnState::Aborted,
            _ => TxnState::Active,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            TxnState::Active => 0,
            TxnState::Committed => 1,
            TxnState::Aborted => 2,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct TxnFileHeader {
    magic: [u8; 8],
    version: U32,
    reserved: U32,
}

const _: () = assert!(std::mem::size_of::<TxnFileHeader>() == TXN_FILE_HEADER_SIZE);

struct TxnInner {
    file: File,
    statuses: Vec<u8>,
}

pub struct TxnManager {
    path: PathBuf,
    inner: Mutex<TxnInner>,
}

impl TxnManager {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().join(TXN_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open transaction table '{}'", path.display()))?;

        let len = file.metadata()?.len();
        let statuses = if len == 0 {
            let header = TxnFileHeader {
                magic: *TXN_MAGIC,
                version: U32::new(TXN_VERSION),
                reserved: U32::new(0),
            };
            file.write_all(header.as_bytes())?;
            file.sync_all()
                .wrap_err("failed to sync fresh transaction table header")?;
            Vec::new()
        } else {
            ensure!(
                len >= TXN_FILE_HEADER_SIZE as u64,
                "transaction table '{}' is shorter than its header",
                path.display()
            );
            let mut header_bytes = [0u8; TXN_FILE_HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header_bytes)?;
            let header = TxnFileHeader::read_from_bytes(&header_bytes)
                .map_err(|e| eyre::eyre!("invalid transaction table header: {:?}", e))?;
            ensure!(
                &header.magic == TXN_MAGIC,
                "bad magic in transaction table '{}'",
                path.display()
            );
            ensure!(
                header.version.get() == TXN_VERSION,
                "unsupported transaction table version {} in '{}'",
                header.version.get(),
                path.display()
            );

            let mut statuses = Vec::with_capacity((len as usize) - TXN_FILE_HEADER_SIZE);
            file.read_to_end(&mut statuses)?;
            statuses
        };

        Ok(Self {
            path,
            inner: Mutex::new(TxnInner { file, statuses }),
        })
    }

    pub fn begin(&self) -> Result<TxnId> {
        let mut inner = self.inner.lock();

        inner.statuses.push(TxnState::Active.to_byte());
        let xid = inner.statuses.len() as TxnId;

        inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(&[TxnState::Active.to_byte()])?;
        inner
            .file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync transaction table '{}'", self.path.display()))?;

        Ok(xid)
    }

    pub fn commit(&self, xid: TxnId) -> Result<()> {
        self.set_state(xid, TxnState::Committed)
    }

    pub fn abort(&self, xid: TxnId) -> Result<()> {
        self.set_state(xid, TxnState::Aborted)
    }

    fn set_state(&self, xid: TxnId, state: TxnState) -> Result<()> {
        assert!(xid != 0, "the bootstrap transaction cannot change state");

        let mut inner = self.inner.lock();
        let index = (xid - 1) as usize;
        assert!(
            index < inner.statuses.len(),
            "transaction {xid} was never begun"
        );

        inner.statuses[index] = state.to_byte();

        let offset = TXN_FILE_HEADER_SIZE as u64 + index as u64;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&[state.to_byte()])?;
        inner
            .file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync transaction table '{}'", self.path.display()))
    }

    pub fn state(&self, xid: TxnId) -> TxnState {
        if xid == 0 {
            return TxnState::Committed;
        }

        let inner = self.inner.lock();
        inner
            .statuses
            .get((xid - 1) as usize)
            .copied()
            .map(TxnState::from_byte)
            .unwrap_or(TxnState::Active)
    }

    pub fn is_committed(&self, xid: TxnId) -> bool {
        self.state(xid) == TxnState::Committed
    }

    pub fn close(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner
            .file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync transaction table '{}'", self.path.display()))
    }
}
