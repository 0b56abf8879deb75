//! NFP cache with single-cycle retention.
//!
//! Every cycle the orchestrator asks for the keys one individual needs. Keys already known
//! are carried into a fresh cache, the rest are computed, and the fresh cache replaces the
//! old one. An entry therefore lives exactly as long as consecutive cycles keep asking for it.

use crate::nfp::Nfp;
use polynest_core::tree::PartId;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Id used for the bin in logs and keys.
pub const BIN_ID: i64 = -1;

/// The fixed operand of an NFP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NfpOperand {
    /// The bin (container).
    Bin,
    /// An already placed part.
    Part(PartId),
}

impl NfpOperand {
    /// Numeric id, [`BIN_ID`] for the bin.
    pub fn id(&self) -> i64 {
        match self {
            NfpOperand::Bin => BIN_ID,
            NfpOperand::Part(id) => *id as i64,
        }
    }
}

/// Structural identity of one NFP computation.
///
/// Rotations are compared by bit pattern (with `-0.0` folded into `0.0`), so two keys are
/// equal exactly when they were built from the same rotation values.
#[derive(Debug, Clone, Copy)]
pub struct NfpKey {
    /// Fixed polygon.
    pub a: NfpOperand,
    /// Moving part.
    pub b: PartId,
    /// Rotation of A in degrees.
    pub rotation_a: f64,
    /// Rotation of B in degrees.
    pub rotation_b: f64,
    /// Inside (containment) versus outside (overlap) NFP.
    pub inside: bool,
}

impl NfpKey {
    /// Creates a key.
    pub fn new(a: NfpOperand, b: PartId, rotation_a: f64, rotation_b: f64, inside: bool) -> Self {
        Self {
            a,
            b,
            rotation_a,
            rotation_b,
            inside,
        }
    }

    /// Inside key of part `b` against the bin.
    pub fn bin(b: PartId, rotation_b: f64) -> Self {
        Self::new(NfpOperand::Bin, b, 0.0, rotation_b, true)
    }

    /// Outside key of part `b` against placed part `a`.
    pub fn pair(a: PartId, b: PartId, rotation_a: f64, rotation_b: f64) -> Self {
        Self::new(NfpOperand::Part(a), b, rotation_a, rotation_b, false)
    }

    fn rotation_bits(value: f64) -> u64 {
        if value == 0.0 {
            0.0f64.to_bits()
        } else {
            value.to_bits()
        }
    }
}

impl PartialEq for NfpKey {
    fn eq(&self, other: &Self) -> bool {
        self.a == other.a
            && self.b == other.b
            && self.inside == other.inside
            && Self::rotation_bits(self.rotation_a) == Self::rotation_bits(other.rotation_a)
            && Self::rotation_bits(self.rotation_b) == Self::rotation_bits(other.rotation_b)
    }
}

impl Eq for NfpKey {}

impl Hash for NfpKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.a.hash(state);
        self.b.hash(state);
        self.inside.hash(state);
        Self::rotation_bits(self.rotation_a).hash(state);
        Self::rotation_bits(self.rotation_b).hash(state);
    }
}

/// Keys needed to evaluate one placement order: every part against the bin, and every part
/// against each part before it.
pub fn required_keys(placement: &[PartId], rotation: &[f64]) -> Vec<NfpKey> {
    let mut keys = Vec::with_capacity(placement.len() * (placement.len() + 1) / 2);
    for (i, (&part, &angle)) in placement.iter().zip(rotation).enumerate() {
        keys.push(NfpKey::bin(part, angle));
        for (&placed, &placed_angle) in placement[..i].iter().zip(rotation) {
            keys.push(NfpKey::pair(placed, part, placed_angle, angle));
        }
    }
    keys
}

/// A cached NFP; `None` records a pair without usable NFP.
pub type NfpEntry = Option<Arc<Nfp>>;

/// Counters of the most recent cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Distinct keys requested.
    pub requested: usize,
    /// Keys served from the previous cycle.
    pub carried: usize,
    /// Keys computed this cycle.
    pub computed: usize,
}

/// Split of one cycle's keys into carried entries and keys still to compute.
#[derive(Debug, Default)]
pub struct CycleBatch {
    carried: HashMap<NfpKey, NfpEntry>,
    pending: Vec<NfpKey>,
}

impl CycleBatch {
    /// Keys that must be computed, each listed once.
    pub fn pending(&self) -> &[NfpKey] {
        &self.pending
    }

    /// Number of entries carried over from the previous cycle.
    pub fn carried_len(&self) -> usize {
        self.carried.len()
    }
}

/// Per-cycle NFP store.
#[derive(Debug, Default)]
pub struct NfpCache {
    entries: HashMap<NfpKey, NfpEntry>,
    last_cycle: CacheStats,
}

impl NfpCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `required` into carried entries and keys to compute.
    pub fn begin_cycle(&self, required: &[NfpKey]) -> CycleBatch {
        let mut batch = CycleBatch::default();
        let mut queued = HashSet::new();
        for key in required {
            if let Some(entry) = self.entries.get(key) {
                batch.carried.insert(*key, entry.clone());
            } else if queued.insert(*key) {
                batch.pending.push(*key);
            }
        }
        batch
    }

    /// Replaces the cache with the carried entries plus the computed results.
    pub fn finish_cycle<I>(&mut self, batch: CycleBatch, computed: I)
    where
        I: IntoIterator<Item = (NfpKey, Option<Nfp>)>,
    {
        let carried = batch.carried.len();
        let mut entries = batch.carried;
        let mut fresh = 0;
        for (key, nfp) in computed {
            entries.insert(key, nfp.map(Arc::new));
            fresh += 1;
        }
        self.last_cycle = CacheStats {
            requested: carried + batch.pending.len(),
            carried,
            computed: fresh,
        };
        self.entries = entries;
    }

    /// Runs a whole cycle with `compute` producing results for the pending keys.
    pub fn refresh<F>(&mut self, required: &[NfpKey], compute: F)
    where
        F: FnOnce(&[NfpKey]) -> Vec<(NfpKey, Option<Nfp>)>,
    {
        let batch = self.begin_cycle(required);
        let computed = compute(batch.pending());
        self.finish_cycle(batch, computed);
    }

    /// The usable NFP for `key`, if any.
    pub fn get(&self, key: &NfpKey) -> Option<&Nfp> {
        self.entries.get(key).and_then(|entry| entry.as_deref())
    }

    /// Whether `key` has an entry (including "no NFP").
    pub fn contains_key(&self, key: &NfpKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Counters of the last completed cycle.
    pub fn last_cycle(&self) -> CacheStats {
        self.last_cycle
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_cycle = CacheStats::default();
    }
}
