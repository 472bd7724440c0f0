//! # Record Store API Tests
//!
//! End-to-end tests of the record API against a real store directory:
//! handle geometry, page packing, in-place versus relocating updates,
//! deletion semantics, size limits, and clean close/reopen cycles.

use std::sync::Arc;

use heapfile::config::{FRAME_HEADER_SIZE, MAX_PAYLOAD, PAGE_HEADER_SIZE};
use heapfile::{RecordStore, RecordTooLarge, TxnManager};
use tempfile::tempdir;

fn open_store(dir: &tempfile::TempDir) -> (RecordStore, Arc<TxnManager>) {
    let txns = Arc::new(TxnManager::open(dir.path()).unwrap());
    let store = RecordStore::open(dir.path(), 8 * 1024 * 1024, Arc::clone(&txns)).unwrap();
    (store, txns)
}

mod handle_geometry_tests {
    use super::*;

    #[test]
    fn first_insert_lands_on_page_two_at_the_header_boundary() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let rid = store.insert(xid, b"hello").unwrap();

        assert_eq!(rid.page_id(), 2, "page 1 is the meta page, data starts at 2");
        assert_eq!(rid.offset(), PAGE_HEADER_SIZE);

        let record = store.read(rid).unwrap().expect("fresh insert is live");
        assert_eq!(record.payload(), b"hello");
        drop(record);

        let next = store.insert(xid, b"x").unwrap();
        assert_eq!(
            next.offset(),
            PAGE_HEADER_SIZE + FRAME_HEADER_SIZE + 5,
            "the second frame starts right after the first (used = 8 + 9 + 5)"
        );
    }

    #[test]
    fn two_4000_byte_records_share_a_page_and_a_third_does_not() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();
        let payload = vec![0xA5u8; 4000];

        let a = store.insert(xid, &payload).unwrap();
        let b = store.insert(xid, &payload).unwrap();
        let c = store.insert(xid, &payload).unwrap();

        assert_eq!(a.page_id(), 2);
        assert_eq!(b.page_id(), 2, "8 + 2*(9+4000) = 8026 fits an 8192-byte page");
        assert_eq!(c.page_id(), 3, "the third frame forces a new page");
    }
}

mod update_tests {
    use super::*;

    #[test]
    fn shrinking_update_keeps_its_id() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let rid = store.insert(xid, b"a longer payload").unwrap();
        let updated = store.update(xid, rid, b"x").unwrap();

        assert_eq!(updated, rid, "in-place updates keep the record id");
        let record = store.read(rid).unwrap().unwrap();
        assert_eq!(record.payload(), b"x");
    }

    #[test]
    fn growing_update_relocates_and_tombstones_the_old_id() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();
        let big = vec![b'B'; 8000];

        let rid = store.insert(xid, b"A").unwrap();
        let moved = store.update(xid, rid, &big).unwrap();

        assert_ne!(moved, rid, "a growing update returns a fresh id");
        assert!(store.read(rid).unwrap().is_none(), "the old id reads as dead");
        let record = store.read(moved).unwrap().unwrap();
        assert_eq!(record.payload(), big.as_slice());
    }

    #[test]
    fn equal_length_update_stays_in_place() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let rid = store.insert(xid, b"aaaa").unwrap();
        let updated = store.update(xid, rid, b"bbbb").unwrap();

        assert_eq!(updated, rid);
        assert_eq!(store.read(rid).unwrap().unwrap().payload(), b"bbbb");
    }
}

mod delete_tests {
    use super::*;

    #[test]
    fn deleted_records_read_as_none() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let rid = store.insert(xid, b"short lived").unwrap();
        store.delete(xid, rid).unwrap();

        assert!(store.read(rid).unwrap().is_none());
    }

    #[test]
    fn deleting_twice_is_a_no_op() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let rid = store.insert(xid, b"short lived").unwrap();
        store.delete(xid, rid).unwrap();
        store.delete(xid, rid).unwrap();

        assert!(store.read(rid).unwrap().is_none());
    }

    #[test]
    fn deletion_never_reuses_the_slot() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let first = store.insert(xid, b"doomed").unwrap();
        store.delete(xid, first).unwrap();
        let second = store.insert(xid, b"doomed").unwrap();

        assert_ne!(second, first, "tombstoned slots stay dead forever");
        assert!(second.offset() > first.offset() || second.page_id() != first.page_id());
    }
}

mod size_limit_tests {
    use super::*;

    #[test]
    fn maximum_payload_fits_a_fresh_page() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();
        let payload = vec![0x11u8; MAX_PAYLOAD];

        let rid = store.insert(xid, &payload).unwrap();

        let record = store.read(rid).unwrap().unwrap();
        assert_eq!(record.payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn one_byte_over_the_maximum_is_rejected() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();
        let payload = vec![0x11u8; MAX_PAYLOAD + 1];

        let err = store.insert(xid, &payload).unwrap_err();

        assert!(
            err.downcast_ref::<RecordTooLarge>().is_some(),
            "oversized inserts fail with RecordTooLarge, got: {err}"
        );
    }
}

mod reopen_tests {
    use super::*;

    #[test]
    fn records_survive_a_clean_close_and_reopen() {
        let dir = tempdir().unwrap();

        let (rid_a, rid_b) = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let a = store.insert(xid, b"first").unwrap();
            let b = store.insert(xid, b"second").unwrap();
            txns.commit(xid).unwrap();
            store.close().unwrap();
            (a, b)
        };

        let (store, _txns) = open_store(&dir);
        assert_eq!(store.read(rid_a).unwrap().unwrap().payload(), b"first");
        assert_eq!(store.read(rid_b).unwrap().unwrap().payload(), b"second");
        store.close().unwrap();
    }

    #[test]
    fn reopened_store_keeps_packing_partially_filled_pages() {
        let dir = tempdir().unwrap();

        let first = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"resident").unwrap();
            txns.commit(xid).unwrap();
            store.close().unwrap();
            rid
        };

        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();
        let second = store.insert(xid, b"newcomer").unwrap();

        assert_eq!(
            second.page_id(),
            first.page_id(),
            "the rebuilt free-space map steers inserts back to the open page"
        );
        store.close().unwrap();
    }

    #[test]
    fn tombstones_survive_reopen() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"deleted before close").unwrap();
            store.delete(xid, rid).unwrap();
            txns.commit(xid).unwrap();
            store.close().unwrap();
            rid
        };

        let (store, _txns) = open_store(&dir);
        assert!(store.read(rid).unwrap().is_none());
        store.close().unwrap();
    }
}

mod release_tests {
    use super::*;

    #[test]
    fn release_is_an_explicit_drop() {
        let dir = tempdir().unwrap();
        let (store, txns) = open_store(&dir);
        let xid = txns.begin().unwrap();

        let rid = store.insert(xid, b"pinned while held").unwrap();
        let record = store.read(rid).unwrap().unwrap();
        assert_eq!(record.payload(), b"pinned while held");
        store.release(record);

        assert!(store.read(rid).unwrap().is_some(), "the record is still live after release");
        store.close().unwrap();
    }
}
