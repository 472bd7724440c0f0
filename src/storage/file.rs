//! # Paged File I/O
//!
//! `PageIo` is the seam between the page cache and the disk: whole-page
//! positioned reads and writes plus an explicit durability point. The file
//! is a contiguous array of `PAGE_SIZE` pages; page N lives at byte offset
//! `(N - 1) * PAGE_SIZE`.
//!
//! `FilePageIo` is the production implementation over `std::fs::File`. The
//! handle is serialized behind a mutex because positioned access is done by
//! seeking; writes become durable only when `sync` is called.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;

use super::{PageId, PAGE_SIZE};

pub trait PageIo: Send + Sync {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;
    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()>;
    fn page_count(&self) -> Result<u64>;
    fn sync(&self) -> Result<()>;
}

pub struct FilePageIo {
    path: PathBuf,
    file: Mutex<File>,
}

impl FilePageIo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open paged file '{}'", path.display()))?;

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat paged file '{}'", path.display()))?
            .len();

        ensure!(
            len % PAGE_SIZE as u64 == 0,
            "paged file '{}' size {} is not a multiple of page size {}",
            path.display(),
            len,
            PAGE_SIZE
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    fn page_offset(page_id: PageId) -> u64 {
        (page_id - 1) * PAGE_SIZE as u64
    }
}

impl PageIo for FilePageIo {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(Self::page_offset(page_id)))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;

        file.read_exact(buf.as_mut_slice()).wrap_err_with(|| {
            format!(
                "failed to read page {} from '{}'",
                page_id,
                self.path.display()
            )
        })
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(Self::page_offset(page_id)))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;

        file.write_all(buf.as_slice()).wrap_err_with(|| {
            format!(
                "failed to write page {} to '{}'",
                page_id,
                self.path.display()
            )
        })
    }

    fn page_count(&self) -> Result<u64> {
        let file = self.file.lock();
        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat paged file '{}'", self.path.display()))?
            .len();
        Ok(len / PAGE_SIZE as u64)
    }

    fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()
            .wrap_err_with(|| format!("failed to sync paged file '{}'", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let io = FilePageIo::open(dir.path().join("pages")).unwrap();

        let mut page = Box::new([0u8; PAGE_SIZE]);
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;

        io.write_page(3, &page).unwrap();
        io.sync().unwrap();

        let mut back = Box::new([0u8; PAGE_SIZE]);
        io.read_page(3, &mut back).unwrap();

        assert_eq!(back[0], 0xAB);
        assert_eq!(back[PAGE_SIZE - 1], 0xCD);
        assert_eq!(io.page_count().unwrap(), 3, "writing page 3 grows the file to 3 pages");
    }

    #[test]
    fn page_count_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let io = FilePageIo::open(dir.path().join("pages")).unwrap();

        assert_eq!(io.page_count().unwrap(), 0);
    }
}
