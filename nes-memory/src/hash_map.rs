// A paged, index-stable chained hash map (spec §3 "ChainedHashMap", §4.4,
// grounded on original_source/nes-nautilus/.../OffsetHashMap/OffsetHashMapRef.hpp
// and OffsetBasedHashMap.hpp: entries live in append-only pages addressed by
// a stable handle rather than a raw pointer, so a slice's map can keep being
// probed by one worker while its bucket directory resizes, and ownership of
// the whole arena can be moved into the staging area (nes-windowing) without
// invalidating any entry reference taken before the move).
//
// Buckets hold `Option<EntryHandle>` pointing at the head of a chain; each
// entry additionally holds the next handle in its chain. The bucket count is
// always a power of two so `hash & (buckets.len() - 1)` replaces `hash % B`.

const PAGE_SIZE: usize = 1024;
const DEFAULT_BUCKETS: usize = 16;
const MAX_LOAD_FACTOR: f64 = 2.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EntryHandle {
    page: u32,
    slot: u32,
}

#[derive(Clone)]
struct Entry {
    hash: u64,
    key: Vec<u8>,
    value: Vec<u8>,
    next: Option<EntryHandle>,
}

/// A chained hash map whose entries are allocated from append-only pages.
/// Key and value byte layouts are caller-defined (the pre-aggregation
/// operator in `nes-windowing` packs grouping-key bytes as the key and an
/// aggregation state as the value).
#[derive(Clone)]
pub struct ChainedHashMap {
    pages: Vec<Vec<Entry>>,
    buckets: Vec<Option<EntryHandle>>,
    value_size: usize,
    len: usize,
}

impl ChainedHashMap {
    /// `value_size` is the fixed width of the per-entry value area (an
    /// aggregation state is fixed-size per spec §4.4); `onInsert` receives a
    /// zeroed buffer of exactly this length to initialize.
    pub fn new(value_size: usize) -> Self {
        ChainedHashMap {
            pages: vec![Vec::with_capacity(PAGE_SIZE)],
            buckets: vec![None; DEFAULT_BUCKETS],
            value_size,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    fn get(&self, handle: EntryHandle) -> &Entry {
        &self.pages[handle.page as usize][handle.slot as usize]
    }

    fn get_mut(&mut self, handle: EntryHandle) -> &mut Entry {
        &mut self.pages[handle.page as usize][handle.slot as usize]
    }

    fn find_in_chain(&self, mut cursor: Option<EntryHandle>, hash: u64, key: &[u8]) -> Option<EntryHandle> {
        while let Some(handle) = cursor {
            let entry = self.get(handle);
            if entry.hash == hash && entry.key == key {
                return Some(handle);
            }
            cursor = entry.next;
        }
        None
    }

    /// Locates the entry for `(hash, key)`, or allocates one and calls
    /// `on_insert` with the fresh, zeroed value area (spec §4.4
    /// `findOrCreateEntry`).
    pub fn find_or_create_entry(
        &mut self,
        key: &[u8],
        hash: u64,
        on_insert: impl FnOnce(&mut [u8]),
    ) -> EntryHandle {
        let bucket = self.bucket_index(hash);
        if let Some(found) = self.find_in_chain(self.buckets[bucket], hash, key) {
            return found;
        }
        let handle = self.allocate(hash, key);
        on_insert(&mut self.get_mut(handle).value);
        self.link_into_bucket(bucket, handle);
        self.len += 1;
        if self.len as f64 > self.buckets.len() as f64 * MAX_LOAD_FACTOR {
            self.grow();
        }
        handle
    }

    /// Locates or creates the entry for `(hash, key)` and always runs
    /// `update` against its value area; `on_insert` only runs the first time
    /// the key is seen (spec §4.4 `combine`). Distinct from
    /// `find_or_create_entry` + a manual call to `update` in that callers
    /// don't need to branch on whether the entry was fresh.
    pub fn combine(
        &mut self,
        key: &[u8],
        hash: u64,
        on_insert: impl FnOnce(&mut [u8]),
        update: impl FnOnce(&mut [u8]),
    ) -> EntryHandle {
        let handle = self.find_or_create_entry(key, hash, on_insert);
        update(&mut self.get_mut(handle).value);
        handle
    }

    pub fn value(&self, handle: EntryHandle) -> &[u8] {
        &self.get(handle).value
    }

    pub fn value_mut(&mut self, handle: EntryHandle) -> &mut [u8] {
        &mut self.get_mut(handle).value
    }

    pub fn key(&self, handle: EntryHandle) -> &[u8] {
        &self.get(handle).key
    }

    /// Iterates every entry currently reachable from the bucket directory,
    /// in bucket order. Used by window merging to combine per-key state
    /// across slices (spec §4.6).
    pub fn iter(&self) -> impl Iterator<Item = EntryHandle> + '_ {
        self.buckets.iter().flatten().copied().flat_map(move |head| {
            let mut out = Vec::new();
            let mut cursor = Some(head);
            while let Some(handle) = cursor {
                out.push(handle);
                cursor = self.get(handle).next;
            }
            out
        })
    }

    fn allocate(&mut self, hash: u64, key: &[u8]) -> EntryHandle {
        let last_page = self.pages.len() - 1;
        if self.pages[last_page].len() == PAGE_SIZE {
            self.pages.push(Vec::with_capacity(PAGE_SIZE));
        }
        let page = self.pages.len() - 1;
        let slot = self.pages[page].len();
        self.pages[page].push(Entry {
            hash,
            key: key.to_vec(),
            value: vec![0u8; self.value_size],
            next: None,
        });
        EntryHandle { page: page as u32, slot: slot as u32 }
    }

    fn link_into_bucket(&mut self, bucket: usize, handle: EntryHandle) {
        let head = self.buckets[bucket];
        self.get_mut(handle).next = head;
        self.buckets[bucket] = Some(handle);
    }

    /// Doubles the bucket directory and reprobes every live entry. Entries
    /// themselves never move, only the chain pointers are rebuilt
    /// (testable property: "a hash map resized at capacity threshold
    /// preserves all entries and their hashes", spec §8).
    fn grow(&mut self) {
        let new_len = self.buckets.len() * 2;
        let mut new_buckets = vec![None; new_len];
        for page in 0..self.pages.len() {
            for slot in 0..self.pages[page].len() {
                let handle = EntryHandle { page: page as u32, slot: slot as u32 };
                let hash = self.pages[page][slot].hash;
                let bucket = (hash as usize) & (new_len - 1);
                let head = new_buckets[bucket];
                self.pages[page][slot].next = head;
                new_buckets[bucket] = Some(handle);
            }
        }
        self.buckets = new_buckets;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_bytes(b: &[u8]) -> u64 {
        rapidhash::rapidhash(b)
    }

    #[test]
    fn insert_then_find_same_key_returns_same_entry() {
        let mut map = ChainedHashMap::new(8);
        let key = 7i64.to_le_bytes();
        let h = hash_bytes(&key);
        let e1 = map.find_or_create_entry(&key, h, |v| v.copy_from_slice(&0i64.to_le_bytes()));
        let e2 = map.find_or_create_entry(&key, h, |_| panic!("should not re-insert"));
        assert_eq!(e1, e2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn combine_accumulates_into_value() {
        let mut map = ChainedHashMap::new(8);
        let key = 1i64.to_le_bytes();
        let h = hash_bytes(&key);
        for v in [1i64, 2, 3] {
            map.combine(
                &key,
                h,
                |_| {},
                |bytes| {
                    let cur = i64::from_le_bytes(bytes.try_into().unwrap());
                    bytes.copy_from_slice(&(cur + v).to_le_bytes());
                },
            );
        }
        let handle = map.find_or_create_entry(&key, h, |_| panic!());
        assert_eq!(i64::from_le_bytes(map.value(handle).try_into().unwrap()), 6);
    }

    #[test]
    fn growth_preserves_all_entries_and_hashes() {
        let mut map = ChainedHashMap::new(8);
        let mut handles = Vec::new();
        for k in 0..200i64 {
            let key = k.to_le_bytes();
            let h = hash_bytes(&key);
            let handle = map.find_or_create_entry(&key, h, |v| v.copy_from_slice(&k.to_le_bytes()));
            handles.push((k, h, handle));
        }
        assert!(map.num_buckets() > DEFAULT_BUCKETS);
        assert_eq!(map.len(), 200);
        for (k, h, handle) in handles {
            assert_eq!(map.key(handle), k.to_le_bytes());
            let looked_up = map.find_or_create_entry(&k.to_le_bytes(), h, |_| panic!("must exist"));
            assert_eq!(looked_up, handle);
        }
    }

    #[test]
    fn iter_visits_every_entry_exactly_once() {
        let mut map = ChainedHashMap::new(8);
        for k in 0..50i64 {
            let key = k.to_le_bytes();
            let h = hash_bytes(&key);
            map.find_or_create_entry(&key, h, |v| v.copy_from_slice(&key));
        }
        let seen: std::collections::BTreeSet<_> = map
            .iter()
            .map(|h| i64::from_le_bytes(map.key(h).try_into().unwrap()))
            .collect();
        assert_eq!(seen.len(), 50);
    }
}
