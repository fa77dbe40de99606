//! Simulation — iteration id → Year map plus aggregate metadata (spec §4.3).

use std::collections::{HashMap, HashSet};

use crate::error::EngineError;
use crate::types::IterId;
use crate::year::Year;

/// A mapping from iteration id to [`Year`], plus the total iteration count
/// (including zero-loss iterations, which are not stored) and the set of
/// risk groups observed.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    num_iter: i64,
    iterations: HashMap<IterId, Year>,
    risk_groups: HashSet<String>,
}

impl Simulation {
    pub fn new(num_iter: i64) -> Self {
        Simulation { num_iter, iterations: HashMap::new(), risk_groups: HashSet::new() }
    }

    pub fn num_iter(&self) -> i64 {
        self.num_iter
    }

    pub fn set_num_iter(&mut self, n: i64) {
        self.num_iter = n;
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn iterations(&self) -> &HashMap<IterId, Year> {
        &self.iterations
    }

    pub fn risk_groups(&self) -> &HashSet<String> {
        &self.risk_groups
    }

    pub fn add_risk_group(&mut self, rg: impl Into<String>) {
        self.risk_groups.insert(rg.into());
    }

    /// Returns the Year for `iter_id`, inserting an empty one (owned by
    /// `iter_id`) if absent.
    pub fn year_mut(&mut self, iter_id: IterId) -> &mut Year {
        self.iterations.entry(iter_id).or_insert_with(|| Year::new(iter_id))
    }

    pub fn get_year(&self, iter_id: IterId) -> Option<&Year> {
        self.iterations.get(&iter_id)
    }

    pub fn count_events(&self) -> usize {
        self.iterations.values().map(Year::size).sum()
    }

    /// `self.num_iter` reconciliation used by the algebraic operators:
    /// adopt the other side's count if this side is unset (0); keep this
    /// side's count if `other` holds no Years (regardless of its declared
    /// `num_iter`); fatal mismatch otherwise.
    fn num_iter_reconcile(&mut self, other: &Simulation) -> Result<(), EngineError> {
        if self.num_iter == other.num_iter {
            return Ok(());
        }
        if self.num_iter == 0 {
            self.num_iter = other.num_iter;
            return Ok(());
        }
        if other.is_empty() {
            return Ok(());
        }
        Err(EngineError::IterCountMismatch {
            self_num_iter: self.num_iter,
            other_num_iter: other.num_iter,
        })
    }

    /// `self += other`.
    pub fn add_simulation(&mut self, other: &Simulation) -> Result<(), EngineError> {
        self.num_iter_reconcile(other)?;
        for (iter_id, year) in other.iterations.iter() {
            self.year_mut(*iter_id).add_year(year)?;
        }
        self.risk_groups.extend(other.risk_groups.iter().cloned());
        Ok(())
    }

    /// `self -= other`.
    pub fn sub_simulation(&mut self, other: &Simulation) -> Result<(), EngineError> {
        self.num_iter_reconcile(other)?;
        for (iter_id, year) in other.iterations.iter() {
            match self.iterations.get_mut(iter_id) {
                None => {
                    self.iterations.insert(*iter_id, year.negated());
                }
                Some(existing) => existing.sub_year(year)?,
            }
        }
        self.risk_groups.extend(other.risk_groups.iter().cloned());
        Ok(())
    }

    /// `self *= factor`, short-circuiting when `factor` is within `1e-5` of 1.
    pub fn mul_scalar(&mut self, factor: f64) {
        if (factor - 1.0).abs() < 1e-5 {
            return;
        }
        for year in self.iterations.values_mut() {
            year.scale_all(factor);
        }
    }

    /// Builds a new Simulation containing only events whose risk group
    /// matches (`include = true`) or does not match (`include = false`)
    /// `rg`.
    pub fn filter_risk_group(&self, rg: &str, include: bool) -> Result<Simulation, EngineError> {
        let mut out = Simulation::new(self.num_iter);
        for (iter_id, year) in self.iterations.iter() {
            for (seq_id, event) in year.events().iter() {
                let matches = event.risk_group == rg;
                if matches == include {
                    out.year_mut(*iter_id).add_event(*seq_id, event.clone(), 1.0, true)?;
                    out.risk_groups.insert(event.risk_group.clone());
                }
            }
        }
        Ok(out)
    }

    /// Terminal ingestion merge (spec §4.6): moves `shard`'s years into
    /// `self`, re-inserting via [`Year::merge_forward`] when the iteration
    /// already exists (so duplicates aren't revisited), or a direct move
    /// when it doesn't. Unions the risk-group sets.
    pub fn merge_shard_forward(&mut self, mut shard: Simulation) -> Result<(), EngineError> {
        self.num_iter_reconcile(&shard)?;
        for (iter_id, mut year) in shard.iterations.drain() {
            match self.iterations.get_mut(&iter_id) {
                None => {
                    self.iterations.insert(iter_id, year);
                }
                Some(existing) => existing.merge_forward(&mut year)?,
            }
        }
        self.risk_groups.extend(shard.risk_groups.drain());
        Ok(())
    }

    /// `(mean, sd)` of per-iteration total loss, per spec §4.3. The
    /// `max(0, ...)` guard on the variance is required because float error
    /// can drive it slightly negative for near-constant series.
    pub fn expected_and_sd(&self, include_rip: bool) -> (f64, f64) {
        if self.num_iter == 0 {
            return (0.0, 0.0);
        }
        let mut total = 0.0;
        let mut total_sq = 0.0;
        for year in self.iterations.values() {
            let loss = year.total_loss(include_rip);
            total += loss;
            total_sq += loss * loss;
        }
        let n = self.num_iter as f64;
        let mean = total / n;
        let variance = (total_sq / n - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::types::{EventId, SeqId};

    fn sim_with_years(num_iter: i64, per_year_loss: &[(i64, f64)]) -> Simulation {
        let mut sim = Simulation::new(num_iter);
        for (iter_id, loss) in per_year_loss {
            sim.year_mut(IterId(*iter_id))
                .add_event(SeqId(0), Event::new(EventId(1), *loss, 0.0), 1.0, true)
                .unwrap();
        }
        sim
    }

    #[test]
    fn count_events_matches_sum_of_year_sizes() {
        let sim = sim_with_years(3, &[(0, 10.0), (1, 20.0), (2, 0.0)]);
        let expected: usize = sim.iterations().values().map(Year::size).sum();
        assert_eq!(sim.count_events(), expected);
        assert_eq!(sim.count_events(), 3);
    }

    #[test]
    fn add_then_sub_simulation_round_trips() {
        let mut a = sim_with_years(2, &[(0, 10.0), (1, 20.0)]);
        let b = sim_with_years(2, &[(0, 5.0), (1, 5.0)]);
        a.add_simulation(&b).unwrap();
        assert_eq!(a.get_year(IterId(0)).unwrap().total_loss(false), 15.0);
        a.sub_simulation(&b).unwrap();
        assert_eq!(a.get_year(IterId(0)).unwrap().total_loss(false), 10.0);
    }

    #[test]
    fn num_iter_reconcile_adopts_nonzero_side() {
        let mut a = Simulation::new(0);
        let b = Simulation::new(5);
        a.add_simulation(&b).unwrap();
        assert_eq!(a.num_iter(), 5);
    }

    #[test]
    fn num_iter_reconcile_mismatch_is_fatal() {
        let mut a = Simulation::new(3);
        let b = Simulation::new(5);
        let err = a.add_simulation(&b);
        assert!(matches!(err, Err(EngineError::IterCountMismatch { .. })));
    }

    #[test]
    fn num_iter_reconcile_keeps_own_when_other_holds_no_years() {
        let mut a = sim_with_years(3, &[(0, 10.0)]);
        let b = Simulation::new(50);
        a.add_simulation(&b).unwrap();
        assert_eq!(a.num_iter(), 3);
    }

    #[test]
    fn num_iter_reconcile_mismatch_still_fatal_when_other_has_years() {
        let mut a = sim_with_years(3, &[(0, 10.0)]);
        let b = sim_with_years(50, &[(0, 5.0)]);
        let err = a.add_simulation(&b);
        assert!(matches!(err, Err(EngineError::IterCountMismatch { .. })));
    }

    #[test]
    fn mul_scalar_short_circuits_near_one() {
        let mut a = sim_with_years(1, &[(0, 10.0)]);
        a.mul_scalar(1.0 + 1e-7);
        assert_eq!(a.get_year(IterId(0)).unwrap().total_loss(false), 10.0);
        a.mul_scalar(2.0);
        assert_eq!(a.get_year(IterId(0)).unwrap().total_loss(false), 20.0);
    }

    #[test]
    fn expected_and_sd_nonnegative_variance() {
        let sim = sim_with_years(3, &[(0, 5.0), (1, 5.0), (2, 5.0)]);
        let (mean, sd) = sim.expected_and_sd(false);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!(sd >= 0.0);
        assert!(sd < 1e-9);
    }

    #[test]
    fn merge_shard_forward_unions_risk_groups() {
        let mut a = Simulation::new(2);
        a.add_risk_group("Risk1");
        let mut b = Simulation::new(2);
        b.add_risk_group("Risk2");
        b.year_mut(IterId(0))
            .add_event(SeqId(0), Event::with_risk_group(EventId(1), 5.0, 0.0, "Risk2"), 1.0, true)
            .unwrap();
        a.merge_shard_forward(b).unwrap();
        assert!(a.risk_groups().contains("Risk1"));
        assert!(a.risk_groups().contains("Risk2"));
        assert_eq!(a.get_year(IterId(0)).unwrap().total_loss(false), 5.0);
    }
}
