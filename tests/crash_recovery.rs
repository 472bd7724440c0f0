//! # Crash Recovery Tests
//!
//! Simulates crashes by dropping a store without calling `close` - the
//! in-memory page cache is lost, the meta-page markers stay unequal on
//! disk, and the next open must repair the paged file from the redo log
//! and the transaction table.

use std::sync::Arc;

use heapfile::{RecordStore, TxnManager};
use tempfile::tempdir;

fn open_store(dir: &tempfile::TempDir) -> (RecordStore, Arc<TxnManager>) {
    let txns = Arc::new(TxnManager::open(dir.path()).unwrap());
    let store = RecordStore::open(dir.path(), 8 * 1024 * 1024, Arc::clone(&txns)).unwrap();
    (store, txns)
}

mod committed_work_tests {
    use super::*;

    #[test]
    fn committed_insert_survives_a_crash() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"durable before the crash").unwrap();
            txns.commit(xid).unwrap();
            drop(store);
            drop(txns);
            rid
        };

        let (store, _txns) = open_store(&dir);
        let record = store.read(rid).unwrap().expect("committed insert SHOULD be replayed");
        assert_eq!(record.payload(), b"durable before the crash");
        drop(record);
        store.close().unwrap();
    }

    #[test]
    fn committed_in_place_update_survives_a_crash() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"aaaaaaaa").unwrap();
            txns.commit(xid).unwrap();

            let xid = txns.begin().unwrap();
            store.update(xid, rid, b"bbbbbbbb").unwrap();
            txns.commit(xid).unwrap();
            drop(store);
            drop(txns);
            rid
        };

        let (store, _txns) = open_store(&dir);
        assert_eq!(store.read(rid).unwrap().unwrap().payload(), b"bbbbbbbb");
        store.close().unwrap();
    }

    #[test]
    fn recovery_is_idempotent_across_repeated_crashes() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"replay me twice").unwrap();
            txns.commit(xid).unwrap();
            drop(store);
            drop(txns);
            rid
        };

        {
            let (store, _txns) = open_store(&dir);
            assert!(store.read(rid).unwrap().is_some());
            drop(store);
        }

        let (store, _txns) = open_store(&dir);
        let record = store.read(rid).unwrap().expect("a second crash changes nothing");
        assert_eq!(record.payload(), b"replay me twice");
        drop(record);
        store.close().unwrap();
    }
}

mod uncommitted_work_tests {
    use super::*;

    #[test]
    fn uncommitted_insert_is_tombstoned_by_recovery() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"never committed").unwrap();
            drop(store);
            drop(txns);
            rid
        };

        let (store, _txns) = open_store(&dir);
        assert!(
            store.read(rid).unwrap().is_none(),
            "an in-flight insert SHOULD NOT survive the crash"
        );
        store.close().unwrap();
    }

    #[test]
    fn uncommitted_update_is_rolled_back() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"original").unwrap();
            txns.commit(xid).unwrap();

            let xid = txns.begin().unwrap();
            store.update(xid, rid, b"scribble").unwrap();
            drop(store);
            drop(txns);
            rid
        };

        let (store, _txns) = open_store(&dir);
        assert_eq!(
            store.read(rid).unwrap().unwrap().payload(),
            b"original",
            "the committed image SHOULD be restored over the in-flight one"
        );
        store.close().unwrap();
    }

    #[test]
    fn aborted_delete_is_rolled_back() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"survivor").unwrap();
            txns.commit(xid).unwrap();

            let xid = txns.begin().unwrap();
            store.delete(xid, rid).unwrap();
            txns.abort(xid).unwrap();
            drop(store);
            drop(txns);
            rid
        };

        let (store, _txns) = open_store(&dir);
        let record = store
            .read(rid)
            .unwrap()
            .expect("an aborted delete SHOULD leave the record live");
        assert_eq!(record.payload(), b"survivor");
        drop(record);
        store.close().unwrap();
    }
}

mod clean_shutdown_tests {
    use super::*;

    #[test]
    fn clean_close_then_crash_with_no_new_work_loses_nothing() {
        let dir = tempdir().unwrap();

        let rid = {
            let (store, txns) = open_store(&dir);
            let xid = txns.begin().unwrap();
            let rid = store.insert(xid, b"settled").unwrap();
            txns.commit(xid).unwrap();
            store.close().unwrap();
            rid
        };

        {
            let (store, _txns) = open_store(&dir);
            drop(store);
        }

        let (store, _txns) = open_store(&dir);
        assert_eq!(store.read(rid).unwrap().unwrap().payload(), b"settled");
        store.close().unwrap();
    }

    #[test]
    fn mixed_transactions_recover_to_their_own_outcomes() {
        let dir = tempdir().unwrap();

        let (kept, lost) = {
            let (store, txns) = open_store(&dir);

            let committed = txns.begin().unwrap();
            let kept = store.insert(committed, b"kept").unwrap();
            txns.commit(committed).unwrap();

            let in_flight = txns.begin().unwrap();
            let lost = store.insert(in_flight, b"lost").unwrap();
            drop(store);
            drop(txns);
            (kept, lost)
        };

        let (store, _txns) = open_store(&dir);
        assert_eq!(store.read(kept).unwrap().unwrap().payload(), b"kept");
        assert!(store.read(lost).unwrap().is_none());
        store.close().unwrap();
    }
}
