//! # Free-Space Map
//!
//! Tracks how many free bytes each data page has and answers
//! first-fit-sufficient queries: "give me a page with at least N free bytes".
//!
//! ## Structure
//!
//! The space of possible free-byte counts (0..=8192) is partitioned into 64
//! interval buckets of 128 bytes each. Pages land in `buckets[free / 128]`.
//! Pages with less than 32 free bytes live in a tiny ordered container
//! (a `BTreeSet` keyed by `(available, page_id)`) that answers successor
//! queries in logarithmic time. Pages with fewer than 8 free bytes are
//! dropped outright - the waste is cheaper than tracking them.
//!
//! ```text
//! available       container
//! -----------     ---------------------------------
//! [0, 8)          dropped forever
//! [8, 32)         tiny (ordered, log-time search)
//! [32, 8192]      buckets[available / 128]
//! ```
//!
//! ## Selection Protocol
//!
//! `select` removes the returned entry from the map. The caller performs its
//! write and re-files the page with `add_page` afterwards. Within this
//! discipline at most one writer holds a given page slot at a time, so two
//! inserts can never race on the same append offset.
//!
//! The map's mutex is released before the caller pins the page; it is never
//! held across I/O or across a page lock (lock order: map, then page).

use std::collections::{BTreeSet, VecDeque};

use eyre::Result;
use parking_lot::Mutex;

use super::{PageCache, PageId, PAGE_SIZE};
use crate::config::{FREE_INTERVALS, FREE_THRESHOLD, META_PAGE_ID, OMITTED_BELOW, TINY_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpace {
    pub page_id: PageId,
    pub available: usize,
}

struct SpaceInner {
    buckets: Vec<VecDeque<PageSpace>>,
    tiny: BTreeSet<(usize, PageId)>,
}

pub struct FreeSpaceMap {
    inner: Mutex<SpaceInner>,
}

impl FreeSpaceMap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SpaceInner {
                buckets: (0..FREE_INTERVALS).map(|_| VecDeque::new()).collect(),
                tiny: BTreeSet::new(),
            }),
        }
    }

    pub fn select(&self, need: usize) -> Option<PageSpace> {
        assert!(
            need > 0 && need <= PAGE_SIZE,
            "free-space request out of range: {need}"
        );

        let mut inner = self.inner.lock();

        if need < TINY_THRESHOLD {
            let hit = inner.tiny.range((need, 0)..).next().copied();
            if let Some((available, page_id)) = hit {
                inner.tiny.remove(&(available, page_id));
                return Some(PageSpace { page_id, available });
            }
        }

        let first = (need / FREE_THRESHOLD).min(FREE_INTERVALS - 1);
        for index in first..FREE_INTERVALS {
            let bucket = &mut inner.buckets[index];
            if let Some(pos) = bucket.iter().position(|entry| entry.available >= need) {
                return bucket.remove(pos);
            }
        }

        None
    }

    pub fn add_page(&self, page_id: PageId, available: usize) {
        if available < OMITTED_BELOW {
            return;
        }

        let mut inner = self.inner.lock();
        if available < TINY_THRESHOLD {
            inner.tiny.insert((available, page_id));
        } else {
            let index = (available / FREE_THRESHOLD).min(FREE_INTERVALS - 1);
            inner.buckets[index].push_back(PageSpace { page_id, available });
        }
    }

    pub fn rebuild(&self, cache: &PageCache) -> Result<usize> {
        {
            let mut inner = self.inner.lock();
            for bucket in &mut inner.buckets {
                bucket.clear();
            }
            inner.tiny.clear();
        }

        let mut tracked = 0;
        for page_id in (META_PAGE_ID + 1)..=cache.page_count() {
            let page = cache.get_page(page_id)?;
            if page.is_data() {
                self.add_page(page_id, page.free());
                tracked += 1;
            }
        }
        Ok(tracked)
    }
}

impl Default for FreeSpaceMap {
    fn default() -> Self {
        Self::new()
    }
}
