//! # Degeneracy Guard
//!
//! Decides whether a correlation statistic is defined for a given input and
//! rate-limits the advisory warnings emitted when it is not.
//!
//! Degenerate inputs (too few samples, constant sequences, a single group)
//! are an expected property of real benchmark slices. They resolve to NaN,
//! never to an error, and each class of warning is logged at most once per
//! `WarningRegistry`.

use crate::types::{EvaluationError, GroupingDimension};
use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Pairwise correlations need at least two observations.
pub const MIN_PAIRWISE_OBSERVATIONS: usize = 2;
/// Partial correlations need at least three observations.
pub const MIN_PARTIAL_OBSERVATIONS: usize = 3;
/// Each grouping key needs at least this many distinct values.
pub const MIN_DISTINCT_GROUPS: usize = 2;

// =============================================================================
// One-Shot Warnings
// =============================================================================

/// Classes of advisory warnings. Each is emitted at most once per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCategory {
    /// Only one cell line or only one drug in the slice.
    InsufficientGroups,
    /// Near-zero within-cell-line prediction variance triggered noise injection.
    NearConstantCellLine,
    /// Near-zero within-drug prediction variance triggered noise injection.
    NearConstantDrug,
}

impl WarningCategory {
    const COUNT: usize = 3;

    pub const ALL: [WarningCategory; Self::COUNT] = [
        WarningCategory::InsufficientGroups,
        WarningCategory::NearConstantCellLine,
        WarningCategory::NearConstantDrug,
    ];

    const fn index(self) -> usize {
        match self {
            WarningCategory::InsufficientGroups => 0,
            WarningCategory::NearConstantCellLine => 1,
            WarningCategory::NearConstantDrug => 2,
        }
    }

    pub const fn near_constant(dimension: GroupingDimension) -> Self {
        match dimension {
            GroupingDimension::CellLine => WarningCategory::NearConstantCellLine,
            GroupingDimension::Drug => WarningCategory::NearConstantDrug,
        }
    }
}

static GLOBAL_WARNINGS: WarningRegistry = WarningRegistry::new();

/// Process-scoped warn-once state.
///
/// The first `warn_once` call for a category wins a compare-and-swap and logs;
/// every later call (from any thread) only bumps the suppression counter.
#[derive(Debug)]
pub struct WarningRegistry {
    shown: [AtomicBool; WarningCategory::COUNT],
    suppressed: [AtomicUsize; WarningCategory::COUNT],
}

impl WarningRegistry {
    pub const fn new() -> Self {
        Self {
            shown: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
            suppressed: [
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
            ],
        }
    }

    /// The registry shared by every evaluator that does not bring its own.
    pub fn global() -> &'static WarningRegistry {
        &GLOBAL_WARNINGS
    }

    /// Logs `message` if this is the first warning of `category`.
    /// Returns whether the warning was emitted by this call.
    pub fn warn_once<F>(&self, category: WarningCategory, message: F) -> bool
    where
        F: FnOnce() -> String,
    {
        let idx = category.index();
        if self.shown[idx]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::warn!("{}", message());
            true
        } else {
            self.suppressed[idx].fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn has_warned(&self, category: WarningCategory) -> bool {
        self.shown[category.index()].load(Ordering::Acquire)
    }

    /// How many repeats of `category` were swallowed after the first emission.
    pub fn suppressed(&self, category: WarningCategory) -> usize {
        self.suppressed[category.index()].load(Ordering::Relaxed)
    }
}

impl Default for WarningRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Degeneracy Predicates
// =============================================================================

/// True when every element equals the first (exact comparison). Empty input counts as constant.
pub fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        Some(&first) => values.iter().all(|&v| v == first),
        None => true,
    }
}

/// True when every element is finite (no NaN, no infinity).
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Whether a pairwise correlation between `x` and `y` is defined.
/// Any NaN or infinite element makes it undefined.
pub fn pairwise_defined(x: &[f64], y: &[f64]) -> bool {
    x.len() >= MIN_PAIRWISE_OBSERVATIONS
        && y.len() >= MIN_PAIRWISE_OBSERVATIONS
        && all_finite(x)
        && all_finite(y)
        && !is_constant(x)
        && !is_constant(y)
}

pub fn distinct_count<K: Hash + Eq>(keys: &[K]) -> usize {
    keys.iter().collect::<AHashSet<_>>().len()
}

/// Both grouping keys must take at least two distinct values.
pub fn has_group_diversity<K: Hash + Eq>(cell_line_ids: &[K], drug_ids: &[K]) -> bool {
    distinct_count(cell_line_ids) >= MIN_DISTINCT_GROUPS
        && distinct_count(drug_ids) >= MIN_DISTINCT_GROUPS
}

/// Sample variances (ddof = 1) of `values` within each group of `keys`.
/// Singleton groups have no defined variance and are omitted.
pub fn within_group_variances<K: Hash + Eq>(values: &[f64], keys: &[K]) -> Vec<f64> {
    // Welford accumulators: (count, mean, sum of squared deviations)
    let mut groups: AHashMap<&K, (usize, f64, f64)> = AHashMap::new();
    for (value, key) in values.iter().zip(keys) {
        let (count, mean, m2) = groups.entry(key).or_insert((0, 0.0, 0.0));
        *count += 1;
        let delta = value - *mean;
        *mean += delta / *count as f64;
        *m2 += delta * (value - *mean);
    }
    groups
        .into_values()
        .filter(|&(count, _, _)| count > 1)
        .map(|(count, _, m2)| m2 / (count - 1) as f64)
        .collect()
}

// =============================================================================
// Noise Mitigation
// =============================================================================

/// Parameters of the near-constant-prediction mitigation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSettings {
    /// Within-group sample variance below which a group counts as constant.
    pub variance_threshold: f64,
    /// Standard deviation of the zero-mean Gaussian perturbation.
    pub noise_std: f64,
    /// Seed for the perturbation. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

/// Perturbs `predictions` in place when, for some grouping dimension, a group
/// has near-zero within-group variance. Dimensions are checked in order and
/// the second check sees the output of the first.
///
/// Returns whether any noise was added.
pub fn stabilize_predictions<K: Hash + Eq>(
    predictions: &mut [f64],
    groupings: [(GroupingDimension, &[K]); 2],
    settings: &NoiseSettings,
    warnings: &WarningRegistry,
) -> Result<bool, EvaluationError> {
    let normal = Normal::new(0.0, settings.noise_std).map_err(|_| {
        EvaluationError::InvalidParameter {
            name: "noise_std",
            value: settings.noise_std,
        }
    })?;
    let mut rng: Option<StdRng> = None;
    let mut perturbed = false;

    for (dimension, keys) in groupings {
        let near_constant = within_group_variances(predictions, keys)
            .into_iter()
            .any(|variance| variance < settings.variance_threshold);
        if !near_constant {
            continue;
        }

        warnings.warn_once(WarningCategory::near_constant(dimension), || {
            format!(
                "Predictions are nearly constant for some {dimension} groups. Adding Gaussian noise (sd = {:e}) to the predictions for partial correlation calculation.",
                settings.noise_std
            )
        });
        log::debug!("Injecting noise into {} predictions ({dimension})", predictions.len());

        let rng = rng.get_or_insert_with(|| match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        for value in predictions.iter_mut() {
            *value += rng.sample(normal);
        }
        perturbed = true;
    }

    Ok(perturbed)
}
