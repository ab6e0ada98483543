//! Content-addressed slew-time cache.
//!
//! The slew tensor is O(targets² × slot pairs) and dominated by geometry
//! lookups, so identical scheduling inputs reuse a previously computed
//! tensor. Entries are keyed by a short digest of the inputs that determine
//! the geometry: slot timestamps, target identities and coordinates, and
//! the observer. The backing store is swappable; a cache miss or an
//! unreadable entry always falls back to full recomputation.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::conditions::{slew_time, ObservingConditions};
use crate::config::{ObserverSite, SlewRates};
use crate::models::{SlotCollection, TargetCatalog};

/// Number of digest bytes kept in a cache key. 10 bytes (20 hex chars)
/// is plenty for per-campaign deduplication.
const KEY_BYTES: usize = 10;

/// Key/value store for serialized cache entries.
///
/// Implementations decide where bytes live; absence is never an error.
pub trait CacheStore {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&mut self, key: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

/// In-memory store, for tests and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Directory-backed store persisting entries across runs.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("slew_time_{}.bin", key))
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path_for(key)).ok()
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), bytes)?;
        Ok(())
    }
}

/// Slew times between every ordered target pair for every adjacent slot
/// pair. Pairs straddling a night boundary stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlewTensor {
    n_targets: usize,
    n_pairs: usize,
    seconds: Vec<Option<f64>>,
}

impl SlewTensor {
    fn empty(n_targets: usize, n_pairs: usize) -> Self {
        Self {
            n_targets,
            n_pairs,
            seconds: vec![None; n_targets * n_targets * n_pairs],
        }
    }

    fn offset(&self, from: usize, to: usize, pair: usize) -> usize {
        (from * self.n_targets + to) * self.n_pairs + pair
    }

    /// Seconds to slew from target `from` (ending in slot pair `pair`) to
    /// target `to` (starting in the next slot), if the pair is within one
    /// night.
    pub fn get(&self, from: usize, to: usize, pair: usize) -> Option<f64> {
        self.seconds.get(self.offset(from, to, pair)).copied().flatten()
    }

    fn set(&mut self, from: usize, to: usize, pair: usize, value: f64) {
        let at = self.offset(from, to, pair);
        self.seconds[at] = Some(value);
    }

    fn has_shape(&self, n_targets: usize, n_pairs: usize) -> bool {
        self.n_targets == n_targets
            && self.n_pairs == n_pairs
            && self.seconds.len() == n_targets * n_targets * n_pairs
    }
}

/// Deterministic URL-safe identifier for a (slots, targets, observer)
/// combination.
///
/// Slot timing, target identity/coordinates, and the observer location and
/// clock offset all feed the digest; anything else (priorities, quotas,
/// progress) does not change the geometry and is deliberately excluded.
pub fn cache_key(slots: &SlotCollection, catalog: &TargetCatalog, site: &ObserverSite) -> String {
    let mut hasher = Sha256::new();
    for slot in slots.all_slots() {
        hasher.update(slot.index.value().to_le_bytes());
        hasher.update(slot.start.timestamp_millis().to_le_bytes());
    }
    for target in catalog.all_targets() {
        hasher.update(target.name.as_bytes());
        hasher.update(target.ra.value().to_le_bytes());
        hasher.update(target.dec.value().to_le_bytes());
    }
    hasher.update(site.latitude_deg.to_le_bytes());
    hasher.update(site.longitude_deg.to_le_bytes());
    hasher.update(site.elevation_m.to_le_bytes());
    hasher.update(site.utc_offset_hours.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..KEY_BYTES])
}

/// Compute the full slew tensor from geometry lookups.
///
/// The triple loop has no cross-iteration dependency; adjacent slot pairs
/// on different nights are skipped and left undefined.
pub fn compute_slew_tensor(
    slots: &SlotCollection,
    target_names: &[String],
    oc: &dyn ObservingConditions,
    rates: &SlewRates,
) -> SlewTensor {
    let all = slots.all_slots();
    let n_pairs = all.len().saturating_sub(1);
    let mut tensor = SlewTensor::empty(target_names.len(), n_pairs);

    for pair in 0..n_pairs {
        let (cur, next) = (&all[pair], &all[pair + 1]);
        if cur.date != next.date {
            continue;
        }
        for (i1, from) in target_names.iter().enumerate() {
            for (i2, to) in target_names.iter().enumerate() {
                let cur_altaz = oc.alt_az(cur.index, from);
                let cur_rot = oc.rotator_angle_end(cur.index, from);
                let tgt_altaz = oc.alt_az(next.index, to);
                let tgt_rot = oc.rotator_angle_start(next.index, to);
                let t = slew_time(&cur_altaz, cur_rot, &tgt_altaz, tgt_rot, rates);
                tensor.set(i1, i2, pair, t.value());
            }
        }
    }
    tensor
}

/// Fetch the slew tensor for `key`, computing and storing it on a miss.
///
/// Any read failure — absent entry, undecodable bytes, or a shape that
/// does not match the current inputs — falls back to recomputation. A
/// failure while persisting the fresh tensor is logged and otherwise
/// ignored; the in-memory result stays usable for the current run.
pub fn load_or_compute(
    store: &mut dyn CacheStore,
    key: &str,
    slots: &SlotCollection,
    target_names: &[String],
    oc: &dyn ObservingConditions,
    rates: &SlewRates,
) -> SlewTensor {
    let n_pairs = slots.num_slots().saturating_sub(1);
    if let Some(bytes) = store.get(key) {
        match serde_json::from_slice::<SlewTensor>(&bytes) {
            Ok(tensor) if tensor.has_shape(target_names.len(), n_pairs) => {
                log::info!("slew tensor loaded from cache entry {}", key);
                return tensor;
            }
            Ok(_) => {
                log::warn!("cache entry {} has stale shape, recomputing", key);
            }
            Err(e) => {
                log::warn!("cache entry {} unreadable ({}), recomputing", key, e);
            }
        }
    } else {
        log::info!("no cache entry {}, computing slew tensor", key);
    }

    let tensor = compute_slew_tensor(slots, target_names, oc, rates);
    match serde_json::to_vec(&tensor) {
        Ok(bytes) => {
            if let Err(e) = store.put(key, &bytes) {
                log::warn!("failed to persist slew tensor under {}: {}", key, e);
            }
        }
        Err(e) => log::warn!("failed to encode slew tensor: {}", e),
    }
    tensor
}
