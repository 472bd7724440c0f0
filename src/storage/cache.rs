//! # Page Cache
//!
//! A bounded buffer pool over a [`PageIo`] backend. The cache demand-loads
//! pages, hands them out pinned, and evicts unpinned frames with a
//! SIEVE-style second-chance scan when the pool is full.
//!
//! ## Why SIEVE Instead of LRU?
//!
//! Strict recency ordering lets a single sequential scan (for example the
//! free-space rebuild at startup) evict every hot page. SIEVE keeps a
//! "visited" flag per frame and a hand that sweeps the pool: visited frames
//! get a second chance, unvisited ones are evicted. Scan pages are touched
//! once and leave quickly; hot pages survive.
//!
//! ## Pin/Unpin Protocol
//!
//! 1. `get_page` pins the frame and returns a [`PageRef`] guard
//! 2. The caller reads or mutates the page through the guard
//! 3. Dropping the guard unpins the frame
//! 4. Frames with a nonzero pin count are never evicted
//!
//! ## Durability
//!
//! - `new_page` formats a fresh page at the file tail and writes it through
//!   synchronously before returning its id
//! - `flush_page` writes one pinned page through and syncs
//! - Dirty frames leaving the pool through eviction are written back; the
//!   write becomes durable at the next sync point (`flush_all`, `close`)
//!
//! ## Concurrency
//!
//! The frame table sits behind a single mutex. The latch is only held for
//! table bookkeeping - never across file I/O and never while taking a page
//! lock. On a miss the page is read from disk outside the latch and the
//! table is re-checked before insertion, so two threads racing on the same
//! page converge on one frame.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{PageFrame, PageId, PageIo, PageType, PAGE_SIZE};
use crate::config::MIN_CACHE_PAGES;

struct PoolInner {
    frames: HashMap<PageId, Arc<PageFrame>>,
    order: Vec<PageId>,
    hand: usize,
}

impl PoolInner {
    fn evict(&mut self) -> Option<Arc<PageFrame>> {
        let mut remaining = self.order.len() * 2;

        while remaining > 0 && !self.order.is_empty() {
            if self.hand >= self.order.len() {
                self.hand = 0;
            }

            let page_id = self.order[self.hand];
            let frame = &self.frames[&page_id];

            if !frame.is_pinned() && !frame.clear_visited() {
                self.order.swap_remove(self.hand);
                return self.frames.remove(&page_id);
            }

            self.hand += 1;
            remaining -= 1;
        }

        None
    }

    fn insert(&mut self, frame: Arc<PageFrame>) {
        self.order.push(frame.page_id());
        self.frames.insert(frame.page_id(), frame);
    }
}

pub struct PageCache {
    io: Box<dyn PageIo>,
    inner: Mutex<PoolInner>,
    capacity: usize,
    page_count: AtomicU64,
}

impl PageCache {
    pub fn new(io: Box<dyn PageIo>, capacity: usize) -> Result<Self> {
        ensure!(
            capacity >= MIN_CACHE_PAGES,
            "page cache needs at least {} frames, got {}",
            MIN_CACHE_PAGES,
            capacity
        );

        let page_count = io.page_count()?;

        Ok(Self {
            io,
            inner: Mutex::new(PoolInner {
                frames: HashMap::with_capacity(capacity),
                order: Vec::with_capacity(capacity),
                hand: 0,
            }),
            capacity,
            page_count: AtomicU64::new(page_count),
        })
    }

    pub fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    pub fn get_page(&self, page_id: PageId) -> Result<PageRef> {
        ensure!(
            page_id >= 1 && page_id <= self.page_count(),
            "page {} out of range (file has {} pages)",
            page_id,
            self.page_count()
        );

        {
            let inner = self.inner.lock();
            if let Some(frame) = inner.frames.get(&page_id) {
                frame.pin();
                frame.mark_visited();
                return Ok(PageRef::new(Arc::clone(frame)));
            }
        }

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        self.io.read_page(page_id, &mut buf)?;
        let frame = Arc::new(PageFrame::new(page_id, buf));
        frame.pin();
        frame.mark_visited();

        let victim = self.install(Arc::clone(&frame))?;
        match victim {
            Install::Raced(existing) => {
                frame.unpin();
                Ok(PageRef::new(existing))
            }
            Install::Done(victim) => {
                if let Some(victim) = victim {
                    self.write_back(&victim)?;
                }
                Ok(PageRef::new(frame))
            }
        }
    }

    pub fn new_page(&self, page_type: PageType) -> Result<PageId> {
        let page_id = self.page_count.fetch_add(1, Ordering::AcqRel) + 1;
        let frame = Arc::new(PageFrame::new_formatted(page_id, page_type));

        frame.with_bytes(|bytes| self.io.write_page(page_id, bytes))?;
        self.io.sync()?;

        match self.install(Arc::clone(&frame))? {
            Install::Done(Some(victim)) => self.write_back(&victim)?,
            Install::Done(None) => {}
            Install::Raced(existing) => existing.unpin(),
        }

        Ok(page_id)
    }

    fn install(&self, frame: Arc<PageFrame>) -> Result<Install> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.frames.get(&frame.page_id()) {
            existing.pin();
            existing.mark_visited();
            return Ok(Install::Raced(Arc::clone(existing)));
        }

        let victim = if inner.frames.len() >= self.capacity {
            let victim = inner.evict();
            if victim.is_none() {
                bail!(
                    "page cache full and every frame pinned (capacity={})",
                    self.capacity
                );
            }
            victim
        } else {
            None
        };

        inner.insert(frame);
        Ok(Install::Done(victim))
    }

    fn write_back(&self, frame: &PageFrame) -> Result<()> {
        if frame.is_dirty() {
            frame.with_bytes(|bytes| self.io.write_page(frame.page_id(), bytes))?;
            frame.clear_dirty();
        }
        Ok(())
    }

    pub fn flush_page(&self, page: &PageRef) -> Result<()> {
        page.with_bytes(|bytes| self.io.write_page(page.page_id(), bytes))?;
        self.io.sync()?;
        page.clear_dirty();
        Ok(())
    }

    pub fn flush_all(&self) -> Result<usize> {
        let frames: Vec<Arc<PageFrame>> = {
            let inner = self.inner.lock();
            inner.frames.values().cloned().collect()
        };

        let mut flushed = 0;
        for frame in &frames {
            if frame.is_dirty() {
                frame.with_bytes(|bytes| self.io.write_page(frame.page_id(), bytes))?;
                frame.clear_dirty();
                flushed += 1;
            }
        }

        if flushed > 0 {
            self.io.sync()?;
        }
        Ok(flushed)
    }

    pub fn close(&self) -> Result<()> {
        self.flush_all()?;
        Ok(())
    }
}

enum Install {
    Done(Option<Arc<PageFrame>>),
    Raced(Arc<PageFrame>),
}

pub struct PageRef {
    frame: Arc<PageFrame>,
}

impl PageRef {
    fn new(frame: Arc<PageFrame>) -> Self {
        Self { frame }
    }
}

impl Deref for PageRef {
    type Target = PageFrame;

    fn deref(&self) -> &PageFrame {
        &self.frame
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}
