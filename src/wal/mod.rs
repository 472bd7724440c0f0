//! # Redo Log
//!
//! An append-only write-ahead log of record mutations. Every insert and
//! update is logged - durably - before the page mutation becomes visible,
//! so a crash can always be repaired by replaying the log against the paged
//! file.
//!
//! ## File Format
//!
//! ```text
//! +------------------+
//! | File Header (16) |  magic "HFRDLOG1" + version u32 LE + reserved
//! +------------------+
//! | Record 0         |  header (36 bytes) + old image + new image
//! +------------------+
//! | Record 1         |
//! +------------------+
//! | ...              |
//! ```
//!
//! Each record header carries the operation kind, the transaction id, the
//! record id, both image lengths, and a CRC-64 over the header (with a
//! zeroed checksum field) plus both images:
//!
//! ```text
//! Offset  Size  Field     Description
//! ------  ----  --------  -----------------------------------
//! 0       1     kind      1 = insert, 2 = update
//! 1       3     pad       zero
//! 4       8     xid       transaction id (LE)
//! 12      8     rid       record id (LE)
//! 20      4     old_len   old image length (LE, 0 for inserts)
//! 24      4     new_len   new image length (LE)
//! 28      8     checksum  CRC-64/ECMA-182
//! ```
//!
//! Insert records carry only the new image (the freshly framed record).
//! Update records carry the old and new images so recovery can roll either
//! direction: committed transactions are replayed forward with the new
//! image, uncommitted ones are rolled back with the old image.
//!
//! ## Write Protocol
//!
//! `append` builds the record, computes the checksum, writes header and
//! images in one buffer, and calls `sync_all` before returning. The caller
//! may only mutate the page after `append` returns - that ordering is the
//! write-ahead guarantee.
//!
//! ## Read Protocol
//!
//! `records` scans from the file header forward. A short read or a checksum
//! mismatch marks the torn tail of an interrupted append; scanning stops
//! there and everything before it is trusted. `reset` truncates the log back
//! to its file header once replay (or a clean startup) has no further use
//! for it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{ensure, Result, WrapErr};
use log::warn;
use parking_lot::Mutex;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::REDO_FILE_NAME;
use crate::record::RecordId;
use crate::txn::TxnId;

pub const REDO_MAGIC: &[u8; 8] = b"HFRDLOG1";
pub const REDO_VERSION: u32 = 1;
pub const REDO_FILE_HEADER_SIZE: usize = 16;
pub const REDO_RECORD_HEADER_SIZE: usize = 36;

const REDO_KIND_INSERT: u8 = 1;
const REDO_KIND_UPDATE: u8 = 2;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RedoRecordHeader {
    kind: u8,
    pad: [u8; 3],
    xid: U64,
    rid: U64,
    old_len: U32,
    new_len: U32,
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<RedoRecordHeader>() == REDO_RECORD_HEADER_SIZE);

impl RedoRecordHeader {
    fn new(kind: u8, xid: TxnId, rid: RecordId, old_len: usize, new_len: usize) -> Self {
        Self {
            kind,
            pad: [0; 3],
            xid: U64::new(xid),
            rid: U64::new(rid.to_u64()),
            old_len: U32::new(old_len as u32),
            new_len: U32::new(new_len as u32),
            checksum: U64::new(0),
        }
    }
}

fn compute_checksum(header: &RedoRecordHeader, old: &[u8], new: &[u8]) -> u64 {
    let mut unsummed = *header;
    unsummed.checksum = U64::new(0);

    let mut digest = CRC64.digest();
    digest.update(unsummed.as_bytes());
    digest.update(old);
    digest.update(new);
    digest.finalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedoKind {
    Insert,
    Update,
}

#[derive(Debug, Clone)]
pub struct RedoRecord {
    pub kind: RedoKind,
    pub xid: TxnId,
    pub rid: RecordId,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

pub struct RedoLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RedoLog {
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(REDO_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open redo log '{}'", path.display()))?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all(REDO_MAGIC)?;
            file.write_all(&REDO_VERSION.to_le_bytes())?;
            file.write_all(&[0u8; 4])?;
            file.sync_all()
                .wrap_err("failed to sync fresh redo log header")?;
        } else {
            ensure!(
                len >= REDO_FILE_HEADER_SIZE as u64,
                "redo log '{}' is shorter than its header",
                path.display()
            );
            let mut magic = [0u8; 8];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut magic)?;
            ensure!(
                &magic == REDO_MAGIC,
                "bad magic in redo log '{}'",
                path.display()
            );
            let mut version = [0u8; 4];
            file.read_exact(&mut version)?;
            ensure!(
                u32::from_le_bytes(version) == REDO_VERSION,
                "unsupported redo log version {} in '{}'",
                u32::from_le_bytes(version),
                path.display()
            );
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn log_insert(&self, xid: TxnId, rid: RecordId, raw: &[u8]) -> Result<()> {
        self.append(REDO_KIND_INSERT, xid, rid, &[], raw)
    }

    pub fn log_update(&self, xid: TxnId, rid: RecordId, old_raw: &[u8], new_raw: &[u8]) -> Result<()> {
        self.append(REDO_KIND_UPDATE, xid, rid, old_raw, new_raw)
    }

    fn append(&self, kind: u8, xid: TxnId, rid: RecordId, old: &[u8], new: &[u8]) -> Result<()> {
        let mut header = RedoRecordHeader::new(kind, xid, rid, old.len(), new.len());
        header.checksum = U64::new(compute_checksum(&header, old, new));

        let mut buf = Vec::with_capacity(REDO_RECORD_HEADER_SIZE + old.len() + new.len());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(old);
        buf.extend_from_slice(new);

        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))
            .wrap_err("failed to seek to redo log tail")?;
        file.write_all(&buf)
            .wrap_err_with(|| format!("failed to append to redo log '{}'", self.path.display()))?;
        file.sync_all()
            .wrap_err_with(|| format!("failed to sync redo log '{}'", self.path.display()))
    }

    pub fn records(&self) -> Result<Vec<RedoRecord>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(REDO_FILE_HEADER_SIZE as u64))
            .wrap_err("failed to seek past redo log header")?;

        let mut records = Vec::new();
        let mut header_bytes = [0u8; REDO_RECORD_HEADER_SIZE];

        loop {
            if file.read_exact(&mut header_bytes).is_err() {
                break;
            }

            let header = RedoRecordHeader::read_from_bytes(&header_bytes)
                .map_err(|e| eyre::eyre!("invalid redo record header: {:?}", e))?;

            let kind = match header.kind {
                REDO_KIND_INSERT => RedoKind::Insert,
                REDO_KIND_UPDATE => RedoKind::Update,
                other => {
                    warn!("redo log: unknown record kind {other}, treating as torn tail");
                    break;
                }
            };

            let mut old = vec![0u8; header.old_len.get() as usize];
            let mut new = vec![0u8; header.new_len.get() as usize];
            if file.read_exact(&mut old).is_err() || file.read_exact(&mut new).is_err() {
                warn!("redo log: truncated record images, treating as torn tail");
                break;
            }

            if compute_checksum(&header, &old, &new) != header.checksum.get() {
                warn!("redo log: checksum mismatch, treating as torn tail");
                break;
            }

            records.push(RedoRecord {
                kind,
                xid: header.xid.get(),
                rid: RecordId::from_u64(header.rid.get()),
                old,
                new,
            });
        }

        Ok(records)
    }

    pub fn reset(&self) -> Result<()> {
        let file = self.file.lock();
        file.set_len(REDO_FILE_HEADER_SIZE as u64)
            .wrap_err_with(|| format!("failed to truncate redo log '{}'", self.path.display()))?;
        file.sync_all()
            .wrap_err_with(|| format!("failed to sync redo log '{}'", self.path.display()))
    }

    pub fn close(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()
            .wrap_err_with(|| format!("failed to sync redo log '{}'", self.path.display()))
    }
}
