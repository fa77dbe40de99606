//! LossSeries and the allocated-TVaR engine (spec §4.7).

use std::collections::HashMap;

use crate::simulation::Simulation;
use crate::types::IterId;

/// `probability_to_index(n, p) = n - min(1, round(n*p))`.
///
/// This collapses to `n - 1` whenever `round(n*p) >= 1` — almost certainly
/// a long-standing bug in the source (the intent reads like
/// `n - max(1, round(n*p))`, selecting a shrinking tail count as `p` grows).
/// Spec §9 calls this out explicitly and requires the documented formula be
/// preserved rather than silently "fixed"; [`corrected_probability_to_index`]
/// is provided as an opt-in alternative for callers who want the evidently
/// intended behavior.
pub fn probability_to_index(num_iter: i64, p: f64) -> i64 {
    let n_reverse = ((num_iter as f64) * p).round() as i64;
    num_iter - n_reverse.min(1)
}

/// The formula `probability_to_index` appears to have intended:
/// `n - max(1, round(n*p))`. Not used by [`LossSeries::allocated_tvar`] —
/// offered only for callers who explicitly want the corrected tail-count
/// semantics.
pub fn corrected_probability_to_index(num_iter: i64, p: f64) -> i64 {
    let n_reverse = ((num_iter as f64) * p).round() as i64;
    num_iter - n_reverse.max(1)
}

/// Per-iteration scalar loss snapshot, with a lazily rebuilt sort cache
/// amortized across repeated [`LossSeries::allocated_tvar`] calls.
#[derive(Debug, Clone, Default)]
pub struct LossSeries {
    num_iter: i64,
    loss_by_iter: HashMap<IterId, f64>,
    gross_by_iter: Option<HashMap<IterId, f64>>,
    sorted_losses: Vec<(f64, IterId)>,
    mean_base: f64,
    base_weighted_tvar: f64,
    sorted_valid: bool,
}

impl LossSeries {
    pub fn new(num_iter: i64) -> Self {
        LossSeries { num_iter, ..Default::default() }
    }

    /// Folds each Year of `sim` to a scalar via `Year::total_loss`. Every
    /// Year present in `sim` gets an entry, including ones whose total
    /// happens to net to zero — `Simulation` only stores non-empty Years,
    /// so "present" already means "represented"; dropping zero-total
    /// entries here would shrink `size()` below the true iteration count
    /// `allocated_tvar` clamps against.
    pub fn from_simulation(sim: &Simulation, include_rip: bool) -> Self {
        let mut series = LossSeries::new(sim.num_iter());
        for (iter_id, year) in sim.iterations().iter() {
            series.loss_by_iter.insert(*iter_id, year.total_loss(include_rip));
        }
        series
    }

    pub fn num_iter(&self) -> i64 {
        self.num_iter
    }

    pub fn size(&self) -> usize {
        self.loss_by_iter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss_by_iter.is_empty()
    }

    fn invalidate(&mut self) {
        self.sorted_valid = false;
    }

    pub fn add_annual_loss(&mut self, iter_id: IterId, x: f64) {
        *self.loss_by_iter.entry(iter_id).or_insert(0.0) += x;
        self.invalidate();
    }

    pub fn add_annual_loss_with_gross(&mut self, iter_id: IterId, x: f64, gross: f64) {
        *self.loss_by_iter.entry(iter_id).or_insert(0.0) += x;
        *self.gross_by_iter.get_or_insert_with(HashMap::new).entry(iter_id).or_insert(0.0) += gross;
        self.invalidate();
    }

    pub fn set_annual_loss(&mut self, losses: &[f64]) {
        for (iter_id, loss) in losses.iter().enumerate() {
            self.loss_by_iter.insert(IterId(iter_id as i64), *loss);
        }
        self.invalidate();
    }

    pub fn get_annual_loss(&self, iter_id: IterId) -> f64 {
        self.loss_by_iter.get(&iter_id).copied().unwrap_or(0.0)
    }

    pub fn scale(&mut self, factor: f64) {
        for loss in self.loss_by_iter.values_mut() {
            *loss *= factor;
        }
        self.invalidate();
    }

    /// Adds `x` to every iteration's loss (including iterations with no
    /// recorded loss so far). Preserved for interface compatibility; not
    /// exercised by the core ingestion/allocation path.
    pub fn add_constant(&mut self, x: f64) {
        for iter_id in 0..self.num_iter {
            *self.loss_by_iter.entry(IterId(iter_id)).or_insert(0.0) += x;
        }
        self.invalidate();
    }

    pub fn expected_loss(&self) -> f64 {
        if self.num_iter == 0 {
            return 0.0;
        }
        let total: f64 = self.loss_by_iter.values().sum();
        total / self.num_iter as f64
    }

    pub fn expected_and_sd(&self) -> (f64, f64) {
        if self.num_iter == 0 {
            return (0.0, 0.0);
        }
        let mut total = 0.0;
        let mut total_sq = 0.0;
        for loss in self.loss_by_iter.values() {
            total += loss;
            total_sq += loss * loss;
        }
        let n = self.num_iter as f64;
        let mean = total / n;
        let variance = (total_sq / n - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }

    fn rebuild_sort_cache(&mut self) {
        self.sorted_losses = self.loss_by_iter.iter().map(|(&iter_id, &loss)| (-loss, iter_id)).collect();
        self.sorted_losses.sort_by(|a, b| a.partial_cmp(b).unwrap());
        self.sorted_valid = true;
        self.base_weighted_tvar = 0.0;
    }

    /// Computes `contributor`'s share of `self`'s weighted TVaR at each
    /// probability in `probs` (spec §4.7). One-shot sorting is amortized
    /// across calls via the `sorted_valid` cache flag.
    pub fn allocated_tvar(&mut self, contributor: &LossSeries, probs: &[f64], remove_mean: bool) -> f64 {
        let just_built = !self.sorted_valid;
        if just_built {
            self.rebuild_sort_cache();
        }

        let mean_contrib = if remove_mean {
            if just_built {
                self.mean_base = self.expected_loss();
            }
            contributor.expected_loss()
        } else {
            0.0
        };

        let mut sorted_probs: Vec<f64> = probs.to_vec();
        sorted_probs.sort_by(|a, b| b.partial_cmp(a).unwrap());

        let n = self.sorted_losses.len() as i64;
        let mut i = 0usize;
        let mut base_accum = 0.0;
        let mut contrib_accum = 0.0;
        let mut contrib_weighted_tvar = 0.0;

        for p in sorted_probs {
            let n_pos = probability_to_index(self.num_iter, p).clamp(1, n.max(1)) as usize;
            let threshold_loss = -self.sorted_losses[n_pos - 1].0;
            while i < self.sorted_losses.len() && -self.sorted_losses[i].0 >= threshold_loss - 1e-8 {
                if just_built {
                    base_accum += -self.sorted_losses[i].0 - self.mean_base;
                }
                let contributor_loss = contributor.get_annual_loss(self.sorted_losses[i].1);
                contrib_accum += contributor_loss - mean_contrib;
                i += 1;
            }
            if just_built {
                self.base_weighted_tvar += p * base_accum / n_pos as f64;
            }
            contrib_weighted_tvar += p * contrib_accum / n_pos as f64;
        }

        if self.base_weighted_tvar.abs() > 1e-5 {
            contrib_weighted_tvar / self.base_weighted_tvar
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_contribution_is_one() {
        let mut series = LossSeries::new(1000);
        for k in 0..1000i64 {
            series.add_annual_loss(IterId(k), k as f64);
        }
        let contributor = series.clone();
        let result = series.allocated_tvar(&contributor, &[0.01, 0.05, 0.10], false);
        assert!((result - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sort_cache_idempotent_across_repeated_calls() {
        let mut series = LossSeries::new(500);
        for k in 0..500i64 {
            series.add_annual_loss(IterId(k), (k as f64) * 1.5);
        }
        let contributor = series.clone();
        let first = series.allocated_tvar(&contributor, &[0.02, 0.1], true);
        let second = series.allocated_tvar(&contributor, &[0.02, 0.1], true);
        assert_eq!(first, second);
    }

    #[test]
    fn probability_to_index_matches_documented_formula() {
        // round(n*p) >= 1 collapses to n - 1.
        assert_eq!(probability_to_index(1000, 0.01), 999);
        assert_eq!(probability_to_index(1000, 0.5), 999);
        // round(n*p) == 0 keeps n.
        assert_eq!(probability_to_index(1000, 0.0001), 1000);
    }

    #[test]
    fn zero_contributor_loss_yields_zero_allocation() {
        let mut base = LossSeries::new(100);
        for k in 0..100i64 {
            base.add_annual_loss(IterId(k), (k + 1) as f64);
        }
        let contributor = LossSeries::new(100);
        let result = base.allocated_tvar(&contributor, &[0.1], false);
        assert_eq!(result, 0.0);
    }

    #[test]
    fn from_simulation_retains_zero_net_iterations() {
        use crate::event::Event;
        use crate::types::{EventId, SeqId};

        let mut sim = Simulation::new(3);
        sim.year_mut(IterId(0))
            .add_event(SeqId(0), Event::new(EventId(1), 10.0, 0.0), 1.0, true)
            .unwrap();
        sim.year_mut(IterId(1))
            .add_event(SeqId(0), Event::new(EventId(1), 10.0, 0.0), 1.0, true)
            .unwrap();
        sim.year_mut(IterId(1))
            .add_event(SeqId(1), Event::new(EventId(2), -10.0, 0.0), 1.0, true)
            .unwrap();
        sim.year_mut(IterId(2))
            .add_event(SeqId(0), Event::new(EventId(1), 20.0, 0.0), 1.0, true)
            .unwrap();

        let series = LossSeries::from_simulation(&sim, false);
        assert_eq!(series.size(), 3);
        assert_eq!(series.get_annual_loss(IterId(1)), 0.0);
    }

    #[test]
    fn expected_and_sd_guards_negative_variance() {
        let mut series = LossSeries::new(3);
        series.add_annual_loss(IterId(0), 5.0);
        series.add_annual_loss(IterId(1), 5.0);
        series.add_annual_loss(IterId(2), 5.0);
        let (mean, sd) = series.expected_and_sd();
        assert!((mean - 5.0).abs() < 1e-9);
        assert!(sd >= 0.0);
    }
}
