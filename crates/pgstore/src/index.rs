use shred::Meta;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// PagedIndex caches the full sorted rec-key list of each paged query,
/// keyed by the query's hash. A monotonic stamp invalidates every entry in
/// O(1) on any write or delete; entries lazily refresh on next use and a
/// background tick evicts the ones nobody has touched within the TTL.
pub struct PagedIndex {
    state: RwLock<State>,
    ttl: Duration,
    epoch: Instant,
}

#[derive(Default)]
struct State {
    stamp: u64,
    entries: HashMap<u64, CachedQuery>,
}

struct CachedQuery {
    rec_keys: Vec<String>,
    stamp: u64,
    /// Milliseconds since the index epoch, touched under the read lock.
    last_used: AtomicU64,
    meta: Meta,
}

impl PagedIndex {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            ttl,
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Bump the stamp, logically invalidating every cached entry.
    pub fn invalidate(&self) {
        self.state.write().unwrap().stamp += 1;
    }

    pub fn stamp(&self) -> u64 {
        self.state.read().unwrap().stamp
    }

    /// The requested page of a current entry, or None on miss or staleness.
    pub fn lookup_page(&self, hash: u64, page: u32, limit: u32) -> Option<(Vec<String>, Meta)> {
        let state = self.state.read().unwrap();
        let entry = state.entries.get(&hash)?;
        if entry.stamp != state.stamp {
            return None;
        }
        entry.last_used.store(self.now_millis(), Ordering::Relaxed);
        Some((page_slice(&entry.rec_keys, page, limit), entry.meta.clone()))
    }

    pub fn store(&self, hash: u64, rec_keys: Vec<String>, meta: Meta) {
        let now = self.now_millis();
        let mut state = self.state.write().unwrap();
        let stamp = state.stamp;
        state.entries.insert(
            hash,
            CachedQuery {
                rec_keys,
                stamp,
                last_used: AtomicU64::new(now),
                meta,
            },
        );
    }

    /// Drop entries idle for longer than the TTL.
    pub fn evict_expired(&self) {
        let cutoff = self.now_millis();
        let ttl = self.ttl.as_millis() as u64;
        let mut state = self.state.write().unwrap();
        state.entries.retain(|_, entry| {
            cutoff.saturating_sub(entry.last_used.load(Ordering::Relaxed)) <= ttl
        });
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn page_slice(keys: &[String], page: u32, limit: u32) -> Vec<String> {
    let start = (page as usize) * (limit as usize);
    let end = (start + limit as usize).min(keys.len());
    if start >= keys.len() {
        return Vec::new();
    }
    keys[start..end].to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("[{i:04}]")).collect()
    }

    #[test]
    fn pages_slice_the_sorted_keys() {
        let index = PagedIndex::new(Duration::from_secs(30));
        index.store(7, keys(25), Meta::with_total(25));

        let (page, meta) = index.lookup_page(7, 0, 10).unwrap();
        assert_eq!(page, keys(25)[..10].to_vec());
        assert_eq!(meta.total(), 25);

        let (page, _) = index.lookup_page(7, 2, 10).unwrap();
        assert_eq!(page.len(), 5);

        let (page, _) = index.lookup_page(7, 9, 10).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn miss_on_unknown_hash() {
        let index = PagedIndex::new(Duration::from_secs(30));
        assert!(index.lookup_page(1, 0, 10).is_none());
    }

    #[test]
    fn invalidation_stales_every_entry() {
        let index = PagedIndex::new(Duration::from_secs(30));
        index.store(7, keys(5), Meta::with_total(5));
        assert!(index.lookup_page(7, 0, 5).is_some());

        index.invalidate();
        assert!(index.lookup_page(7, 0, 5).is_none());

        // A refresh stored after the bump is current again.
        index.store(7, keys(6), Meta::with_total(6));
        assert!(index.lookup_page(7, 0, 5).is_some());
    }

    #[test]
    fn eviction_drops_idle_entries() {
        let index = PagedIndex::new(Duration::from_millis(1));
        index.store(7, keys(3), Meta::with_total(3));
        assert_eq!(index.len(), 1);

        std::thread::sleep(Duration::from_millis(10));
        index.evict_expired();
        assert!(index.is_empty());
    }

    #[test]
    fn recently_used_entries_survive_eviction() {
        let index = PagedIndex::new(Duration::from_secs(30));
        index.store(7, keys(3), Meta::with_total(3));
        index.evict_expired();
        assert_eq!(index.len(), 1);
    }
}
