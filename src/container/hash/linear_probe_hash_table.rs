//! On-disk linear-probing hash index over buffer-pool-resident pages (C8,
//! §4.8). Grounded on `linear_probe_hash_table.cpp` (`original_source/`):
//! a table-wide reader/writer latch gates structural changes (`Resize`),
//! while ordinary `GetValue`/`Insert`/`Remove` calls only need to agree
//! with `Resize` on which `page_ids_` to address, not block each other.
//!
//! `parking_lot::RwLock<TableLayout>` plays double duty here: its read
//! guard *is* the table R-latch and its write guard *is* the table
//! W-latch, and the data it protects (`page_ids`, `num_buckets`, ...) is
//! exactly the structural state §4.8 says only changes under the W-latch.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::config::{PageId, BLOCK_ARRAY_SIZE};
use crate::container::hash::encode::FixedSizeEncode;
use crate::storage::page::hash_table_page::{HashTableBlockPage, HashTableHeaderPage};
use crate::storage::page::page::{MutRefPageData, RefPageData};

/// The structural layout of the table: which block pages back which
/// buckets. Lives entirely in memory (mirrored onto the header page only
/// so `Resize` can be replayed from disk-durable state) — the original
/// keeps the same fields as plain members of the hash table object.
struct TableLayout {
    header_page_id: PageId,
    num_buckets: usize,
    num_pages: usize,
    last_block_array_size: usize,
    page_ids: Vec<PageId>,
}

fn block_array_size(layout: &TableLayout, block_index: usize) -> usize {
    if block_index == layout.num_pages - 1 {
        layout.last_block_array_size
    } else {
        BLOCK_ARRAY_SIZE
    }
}

fn get_index<K: Hash>(layout: &TableLayout, key: &K) -> (usize, usize, usize) {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let slot_index = (hasher.finish() as usize) % layout.num_buckets;
    (slot_index, slot_index / BLOCK_ARRAY_SIZE, slot_index % BLOCK_ARRAY_SIZE)
}

/// Allocates a header page plus `num_pages` block pages for `num_buckets`
/// buckets and returns the resulting layout. Used both by `new` and by
/// `resize` (§4.8 InitHeaderPage).
fn build_layout(bpm: &BufferPoolManager, num_buckets: usize) -> TableLayout {
    let num_pages = (num_buckets - 1) / BLOCK_ARRAY_SIZE + 1;
    let last_block_array_size = num_buckets - (num_pages - 1) * BLOCK_ARRAY_SIZE;

    let header_page = bpm
        .new_page()
        .expect("buffer pool exhausted while creating a hash table header page");
    let header_page_id = header_page.get_page_id();
    let mut page_ids = Vec::with_capacity(num_pages);
    {
        let mut header = HashTableHeaderPage::new(header_page.get_data_mut());
        header.set_page_id(header_page_id);
        header.set_size(num_buckets as u32);
        for _ in 0..num_pages {
            let block_page = bpm
                .new_page()
                .expect("buffer pool exhausted while creating a hash table block page");
            let block_page_id = block_page.get_page_id();
            bpm.unpin_page(block_page_id, false);
            header.add_block_page_id(block_page_id);
            page_ids.push(block_page_id);
        }
    }
    bpm.unpin_page(header_page_id, true);

    tracing::debug!(num_buckets, num_pages, header_page_id, "built hash table layout");
    TableLayout { header_page_id, num_buckets, num_pages, last_block_array_size, page_ids }
}

enum InsertAttempt {
    Inserted,
    Duplicate,
    NeedsResize,
}

/// A linear-probing hash index over `K`-keyed `V` buckets, backed by the
/// buffer pool (C8, §4.8). `K`/`V` stand in for the original's templated
/// key/value/comparator: `Hash + Eq` plays the role of `hash_fn_` and
/// `comparator_`, `FixedSizeEncode` is what lets `HashTableBlockPage` lay
/// slots out at a fixed width (§C7).
pub struct LinearProbeHashTable<K, V> {
    bpm: Arc<BufferPoolManager>,
    layout: RwLock<TableLayout>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> LinearProbeHashTable<K, V>
where
    K: FixedSizeEncode + Hash + Eq,
    V: FixedSizeEncode + Eq,
{
    /// Builds a new index with at least `num_buckets` buckets.
    pub fn new(bpm: Arc<BufferPoolManager>, num_buckets: usize) -> Self {
        let layout = build_layout(&bpm, num_buckets.max(1));
        Self { bpm, layout: RwLock::new(layout), _marker: PhantomData }
    }

    /// Returns every value ever `Insert`ed under `key` and not since
    /// `Remove`d (§4.8 GetValue, §8 property 4).
    pub fn get_value(&self, key: &K) -> Vec<V> {
        let layout = self.layout.read();
        let (slot_index, mut block_index, mut bucket_index) = get_index(&layout, key);
        let mut result = Vec::new();

        let mut page = self.fetch(layout.page_ids[block_index]);
        loop {
            let occupied;
            {
                let block: HashTableBlockPage<RefPageData<'_>, K, V> =
                    HashTableBlockPage::new(page.get_data());
                occupied = block.is_occupied(bucket_index);
                if occupied && block.is_readable(bucket_index) && block.key_at(bucket_index) == *key {
                    result.push(block.value_at(bucket_index));
                }
            }
            if !occupied {
                self.bpm.unpin_page(page.get_page_id(), false);
                break;
            }
            bucket_index += 1;
            if bucket_index == block_array_size(&layout, block_index) {
                self.bpm.unpin_page(page.get_page_id(), false);
                block_index = (block_index + 1) % layout.num_pages;
                bucket_index = 0;
                page = self.fetch(layout.page_ids[block_index]);
            }
            if block_index * BLOCK_ARRAY_SIZE + bucket_index == slot_index {
                self.bpm.unpin_page(page.get_page_id(), false);
                break;
            }
        }

        result
    }

    /// Inserts `(key, value)`. Returns `false` only when that exact pair is
    /// already present and readable (duplicate keys with distinct values
    /// are fine) — triggers a `Resize` and retries if every bucket on the
    /// probe path is occupied (§4.8 Insert/InsertImpl).
    pub fn insert(&self, key: &K, value: &V) -> bool {
        let mut layout = self.layout.read();
        loop {
            match self.try_insert(&layout, key, value) {
                InsertAttempt::Inserted => return true,
                InsertAttempt::Duplicate => return false,
                InsertAttempt::NeedsResize => {
                    let num_buckets = layout.num_buckets;
                    drop(layout);
                    self.resize(num_buckets);
                    layout = self.layout.read();
                }
            }
        }
    }

    fn try_insert(&self, layout: &TableLayout, key: &K, value: &V) -> InsertAttempt {
        let (slot_index, mut block_index, mut bucket_index) = get_index(layout, key);
        let mut page = self.fetch(layout.page_ids[block_index]);

        loop {
            enum Outcome {
                Done(bool),
                Step,
            }
            let outcome = {
                let mut block: HashTableBlockPage<MutRefPageData<'_>, K, V> =
                    HashTableBlockPage::new(page.get_data_mut());
                if block.insert(bucket_index, key, value) {
                    Outcome::Done(true)
                } else if block.is_readable(bucket_index)
                    && block.key_at(bucket_index) == *key
                    && block.value_at(bucket_index) == *value
                {
                    Outcome::Done(false)
                } else {
                    Outcome::Step
                }
            };

            match outcome {
                Outcome::Done(success) => {
                    self.bpm.unpin_page(page.get_page_id(), success);
                    return if success { InsertAttempt::Inserted } else { InsertAttempt::Duplicate };
                }
                Outcome::Step => {
                    bucket_index += 1;
                    if bucket_index == block_array_size(layout, block_index) {
                        self.bpm.unpin_page(page.get_page_id(), false);
                        block_index = (block_index + 1) % layout.num_pages;
                        bucket_index = 0;
                        page = self.fetch(layout.page_ids[block_index]);
                    }
                    if block_index * BLOCK_ARRAY_SIZE + bucket_index == slot_index {
                        self.bpm.unpin_page(page.get_page_id(), false);
                        return InsertAttempt::NeedsResize;
                    }
                }
            }
        }
    }

    /// Removes the exact pair `(key, value)` if present and readable.
    /// Stops without removing — and returns `false` — if the first
    /// matching slot on the probe path is a tombstone (§4.8 Remove).
    pub fn remove(&self, key: &K, value: &V) -> bool {
        let layout = self.layout.read();
        let (slot_index, mut block_index, mut bucket_index) = get_index(&layout, key);
        let mut page = self.fetch(layout.page_ids[block_index]);

        loop {
            let found;
            {
                let mut block: HashTableBlockPage<MutRefPageData<'_>, K, V> =
                    HashTableBlockPage::new(page.get_data_mut());
                let occupied = block.is_occupied(bucket_index);
                if occupied && block.key_at(bucket_index) == *key && block.value_at(bucket_index) == *value {
                    let success = if block.is_readable(bucket_index) {
                        block.remove(bucket_index);
                        true
                    } else {
                        false
                    };
                    found = Some(success);
                } else if !occupied {
                    found = Some(false);
                } else {
                    found = None;
                }
            }

            if let Some(success) = found {
                self.bpm.unpin_page(page.get_page_id(), success);
                return success;
            }

            bucket_index += 1;
            if bucket_index == block_array_size(&layout, block_index) {
                self.bpm.unpin_page(page.get_page_id(), false);
                block_index = (block_index + 1) % layout.num_pages;
                bucket_index = 0;
                page = self.fetch(layout.page_ids[block_index]);
            }
            if block_index * BLOCK_ARRAY_SIZE + bucket_index == slot_index {
                self.bpm.unpin_page(page.get_page_id(), false);
                return false;
            }
        }
    }

    /// Doubles bucket count, rehashing every live entry into a fresh set
    /// of pages, then drops the old ones (§4.8 Resize). Takes the table
    /// W-latch itself; `try_insert` below is called directly against the
    /// new layout rather than through `insert`, so it never tries to
    /// re-acquire the R-latch this call already holds exclusively.
    fn resize(&self, initial_size: usize) {
        let mut layout = self.layout.write();
        let old_header_page_id = layout.header_page_id;
        let old_page_ids = layout.page_ids.clone();
        let old_num_pages = layout.num_pages;
        let old_last_block_array_size = layout.last_block_array_size;

        let new_layout = build_layout(&self.bpm, 2 * initial_size);
        tracing::info!(old = layout.num_buckets, new = new_layout.num_buckets, "resizing hash table");

        for block_index in 0..old_num_pages {
            let old_page_id = old_page_ids[block_index];
            let old_page = self.fetch(old_page_id);
            let capacity = if block_index == old_num_pages - 1 {
                old_last_block_array_size
            } else {
                BLOCK_ARRAY_SIZE
            };

            for bucket_index in 0..capacity {
                let live = {
                    let block: HashTableBlockPage<RefPageData<'_>, K, V> =
                        HashTableBlockPage::new(old_page.get_data());
                    block
                        .is_readable(bucket_index)
                        .then(|| (block.key_at(bucket_index), block.value_at(bucket_index)))
                };
                if let Some((k, v)) = live {
                    self.try_insert(&new_layout, &k, &v);
                }
            }

            self.bpm.unpin_page(old_page_id, false);
            self.bpm.delete_page(old_page_id);
        }
        self.bpm.delete_page(old_header_page_id);

        *layout = new_layout;
    }

    /// The number of buckets the table currently addresses (§4.8 GetSize).
    pub fn get_size(&self) -> usize {
        self.layout.read().num_buckets
    }

    fn fetch(&self, page_id: PageId) -> crate::storage::page::page::Page {
        self.bpm
            .fetch_page(page_id)
            .expect("hash table block/header page must be resident while the table holds its id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::disk_manager::DiskManager;
    use tempdir::TempDir;

    fn table(pool_size: usize, num_buckets: usize) -> (TempDir, LinearProbeHashTable<i32, i32>) {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_file.to_str().unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager, None));
        (dir, LinearProbeHashTable::new(bpm, num_buckets))
    }

    #[test]
    fn insert_then_get_value_roundtrips() {
        let (_dir, ht) = table(20, 4);
        assert!(ht.insert(&1, &100));
        assert_eq!(ht.get_value(&1), vec![100]);
    }

    #[test]
    fn duplicate_pair_is_rejected_but_distinct_value_is_not() {
        let (_dir, ht) = table(20, 4);
        assert!(ht.insert(&1, &100));
        assert!(!ht.insert(&1, &100));
        assert!(ht.insert(&1, &200));
        let mut values = ht.get_value(&1);
        values.sort();
        assert_eq!(values, vec![100, 200]);
    }

    #[test]
    fn tombstone_does_not_hide_a_later_value_for_the_same_key() {
        let (_dir, ht) = table(20, 4);
        assert!(ht.insert(&1, &100));
        assert!(ht.insert(&1, &200));
        assert!(ht.remove(&1, &100));
        assert_eq!(ht.get_value(&1), vec![200]);
    }

    #[test]
    fn remove_missing_pair_returns_false() {
        let (_dir, ht) = table(20, 4);
        assert!(ht.insert(&1, &100));
        assert!(!ht.remove(&1, &999));
        assert!(!ht.remove(&2, &100));
    }

    #[test]
    fn insert_beyond_capacity_triggers_resize_and_keeps_every_entry() {
        let (_dir, ht) = table(64, 2);
        for i in 0..20 {
            assert!(ht.insert(&i, &(i * 10)));
        }
        assert!(ht.get_size() >= 20);
        for i in 0..20 {
            assert_eq!(ht.get_value(&i), vec![i * 10]);
        }
    }

    #[test]
    fn get_size_doubles_after_resize() {
        let (_dir, ht) = table(64, 2);
        let before = ht.get_size();
        for i in 0..10 {
            ht.insert(&i, &i);
        }
        assert!(ht.get_size() > before);
        assert_eq!(ht.get_size() % before, 0);
    }

    #[test]
    fn missing_key_returns_empty() {
        let (_dir, ht) = table(20, 4);
        assert!(ht.get_value(&42).is_empty());
    }
}
