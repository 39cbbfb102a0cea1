//! Fanout arithmetic for multi-hop neighborhood expansion.
//!
//! A fanout list `[f1, f2, ..., fk]` fixes how many neighbors are sampled per
//! parent at each hop. Sampling a seed produces a flat row of
//! `total_width` positions laid out breadth-first:
//!
//! ```text
//! fanouts = [2, 3]
//! widths  = [1, 2, 6]            total_width = 9
//!
//! position: 0 | 1 2 | 3 4 5 6 7 8
//!           s | hop1 | hop2
//!
//! parent(3..=5) = 1, parent(6..=8) = 2, parent(1..=2) = 0
//! ```
//!
//! Everything downstream (bipartite splits, relation edges) is derived from
//! a [`FanoutProfile`], so the index arithmetic lives in exactly one place.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

fn validate(fanouts: &[usize]) -> Result<()> {
    if fanouts.is_empty() {
        return Err(Error::InvalidConfig("fanouts must be specified".into()));
    }
    if let Some(pos) = fanouts.iter().position(|&f| f == 0) {
        return Err(Error::InvalidConfig(format!(
            "fanout at hop {} must be positive, got 0",
            pos + 1
        )));
    }
    Ok(())
}

/// Cumulative product of the fanouts, starting with the seed layer (width 1).
///
/// ```rust
/// use hopsage_core::fanout::fanout_widths;
///
/// assert_eq!(fanout_widths(&[2, 3]).unwrap(), vec![1, 2, 6]);
/// ```
pub fn fanout_widths(fanouts: &[usize]) -> Result<Vec<usize>> {
    validate(fanouts)?;
    let mut widths = Vec::with_capacity(fanouts.len() + 1);
    let mut width = 1usize;
    widths.push(width);
    for &f in fanouts {
        width = width
            .checked_mul(f)
            .ok_or_else(|| Error::InvalidConfig(format!("fanouts {:?} overflow", fanouts)))?;
        widths.push(width);
    }
    Ok(widths)
}

/// Total flattened width of one seed's multi-hop expansion.
pub fn fanout_total_width(fanouts: &[usize]) -> Result<usize> {
    fanout_widths(fanouts)?
        .into_iter()
        .try_fold(0usize, |acc, w| acc.checked_add(w))
        .ok_or_else(|| Error::InvalidConfig(format!("fanouts {:?} overflow", fanouts)))
}

/// `(parent_position, child_position)` for every non-root position.
///
/// Children are emitted in the same row-major order the sampler produces
/// them: all children of parent 0, then parent 1, and so on.
///
/// ```rust
/// use hopsage_core::fanout::fanout_edge_template;
///
/// let template = fanout_edge_template(&[2, 3]).unwrap();
/// assert_eq!(
///     template,
///     vec![(0, 1), (0, 2), (1, 3), (1, 4), (1, 5), (2, 6), (2, 7), (2, 8)]
/// );
/// ```
pub fn fanout_edge_template(fanouts: &[usize]) -> Result<Vec<(usize, usize)>> {
    let widths = fanout_widths(fanouts)?;
    let offsets = offsets_of(&widths);
    Ok(build_template(fanouts, &widths, &offsets))
}

fn offsets_of(widths: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(widths.len());
    let mut acc = 0;
    for &w in widths {
        offsets.push(acc);
        acc += w;
    }
    offsets
}

fn build_template(fanouts: &[usize], widths: &[usize], offsets: &[usize]) -> Vec<(usize, usize)> {
    let total: usize = widths.iter().sum();
    let mut template = Vec::with_capacity(total.saturating_sub(1));
    for hop in 1..widths.len() {
        let fanout = fanouts[hop - 1];
        let base = offsets[hop];
        let parent_base = offsets[hop - 1];
        for child in base..base + widths[hop] {
            template.push((parent_base + (child - base) / fanout, child));
        }
    }
    template
}

/// Derived, immutable description of a fanout list.
///
/// Built once per distinct fanout list and shared by every batch that uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutProfile {
    fanouts: Vec<usize>,
    widths: Vec<usize>,
    offsets: Vec<usize>,
    total_width: usize,
    edge_template: Vec<(usize, usize)>,
}

impl FanoutProfile {
    /// Build a profile, validating the fanouts.
    pub fn new(fanouts: &[usize]) -> Result<Self> {
        let widths = fanout_widths(fanouts)?;
        let total_width = fanout_total_width(fanouts)?;
        let offsets = offsets_of(&widths);
        let edge_template = build_template(fanouts, &widths, &offsets);
        Ok(Self {
            fanouts: fanouts.to_vec(),
            widths,
            offsets,
            total_width,
            edge_template,
        })
    }

    /// Fetch (or build) the profile from the process-wide cache.
    pub fn cached(fanouts: &[usize]) -> Result<Arc<Self>> {
        ProfileCache::global().get_or_build(fanouts)
    }

    pub fn fanouts(&self) -> &[usize] {
        &self.fanouts
    }

    /// Number of hops `k`.
    pub fn num_hops(&self) -> usize {
        self.fanouts.len()
    }

    /// `[1, f1, f1*f2, ...]`, length `k + 1`.
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Start position of every hop segment (hop 0 is the seed).
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn total_width(&self) -> usize {
        self.total_width
    }

    /// Edges per seed: `total_width - 1`.
    pub fn edges_per_seed(&self) -> usize {
        self.total_width - 1
    }

    pub fn edge_template(&self) -> &[(usize, usize)] {
        &self.edge_template
    }

    /// Position range of hop `hop` (0 = seed).
    ///
    /// # Panics
    /// Panics if `hop > num_hops()`.
    pub fn segment(&self, hop: usize) -> Range<usize> {
        let start = self.offsets[hop];
        start..start + self.widths[hop]
    }

    /// Fanout used to expand hop `hop - 1` into hop `hop` (1-based).
    pub fn fanout_at(&self, hop: usize) -> usize {
        self.fanouts[hop - 1]
    }

    /// Number of seed rows in a flat tensor of `len` elements.
    pub fn rows_for(&self, len: usize) -> Result<usize> {
        if len % self.total_width != 0 {
            return Err(Error::ShapeMismatch(format!(
                "{} elements is not a multiple of total width {} (fanouts {:?})",
                len, self.total_width, self.fanouts
            )));
        }
        Ok(len / self.total_width)
    }
}

/// Memoizes [`FanoutProfile`]s by fanout list.
///
/// Readers never block each other; a miss takes the write lock once.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: RwLock<HashMap<Vec<usize>, Arc<FanoutProfile>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used by [`FanoutProfile::cached`].
    pub fn global() -> &'static ProfileCache {
        static GLOBAL: OnceLock<ProfileCache> = OnceLock::new();
        GLOBAL.get_or_init(ProfileCache::new)
    }

    pub fn get_or_build(&self, fanouts: &[usize]) -> Result<Arc<FanoutProfile>> {
        if let Some(profile) = self.profiles.read().get(fanouts) {
            return Ok(Arc::clone(profile));
        }
        let profile = Arc::new(FanoutProfile::new(fanouts)?);
        let mut profiles = self.profiles.write();
        let entry = profiles
            .entry(fanouts.to_vec())
            .or_insert_with(|| Arc::clone(&profile));
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}
