//! Year — one iteration's events (spec §4.2).
//!
//! Per spec §9's design notes, `iter_id` is fixed at construction rather
//! than re-assigned on every [`Year::add_event`] call (a documented
//! artifact of the source's `addVirtualEvent` signature that a clean
//! rewrite drops — see DESIGN.md).

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::event::Event;
use crate::types::{IterId, SeqId};

fn is_noncat_synthetic(rg: &str) -> bool {
    rg.starts_with("Noncat-")
}

/// One iteration's events, keyed by sequence id. Iteration order by key is
/// preserved (via `BTreeMap`) for deterministic traversal, though the
/// algebra itself does not depend on ordering.
#[derive(Debug, Clone)]
pub struct Year {
    iter_id: IterId,
    events: BTreeMap<SeqId, Event>,
    /// Append-only record of events first inserted into this Year — drained
    /// by a later [`Year::merge_forward`] so a shard-owned Year can be
    /// re-inserted into an accumulator Year without revisiting duplicates.
    head: Vec<Event>,
}

impl Year {
    pub fn new(iter_id: IterId) -> Self {
        Year { iter_id, events: BTreeMap::new(), head: Vec::new() }
    }

    pub fn iter_id(&self) -> IterId {
        self.iter_id
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &BTreeMap<SeqId, Event> {
        &self.events
    }

    pub fn get(&self, seq_id: SeqId) -> Option<&Event> {
        self.events.get(&seq_id)
    }

    /// Inserts `event` (scaled by `factor`) at `seq_id`, or merges it into
    /// whatever already occupies that slot per the collision rule in
    /// spec §4.2.
    pub fn add_event(
        &mut self,
        seq_id: SeqId,
        mut event: Event,
        factor: f64,
        record_in_head: bool,
    ) -> Result<(), EngineError> {
        event.scale(factor);
        event.sequence_id = seq_id;

        match self.events.get(&seq_id) {
            None => {
                if record_in_head {
                    self.head.push(event.clone());
                }
                self.events.insert(seq_id, event);
            }
            Some(existing) => {
                let same_rg = existing.risk_group == event.risk_group;
                let neither_synthetic =
                    !is_noncat_synthetic(&existing.risk_group) && !is_noncat_synthetic(&event.risk_group);
                if same_rg || neither_synthetic {
                    self.events.get_mut(&seq_id).unwrap().merge_add(&event);
                } else {
                    let block_base = seq_id.block_base();
                    let mut placed = false;
                    for c in 501..999 {
                        let candidate = block_base.offset(c);
                        if !self.events.contains_key(&candidate) {
                            self.events.insert(candidate, event.clone());
                            placed = true;
                            break;
                        }
                    }
                    if !placed {
                        return Err(EngineError::NoncatSlotOverflow { seq_id });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drains `other`'s head list into `self`, leaving `other`'s head empty.
    pub fn merge_forward(&mut self, other: &mut Year) -> Result<(), EngineError> {
        for event in other.head.drain(..) {
            let seq_id = event.sequence_id;
            self.add_event(seq_id, event, 1.0, false)?;
        }
        Ok(())
    }

    /// `self += other`: every event of `other` is added into `self` under
    /// the same collision rule as [`Year::add_event`].
    pub fn add_year(&mut self, other: &Year) -> Result<(), EngineError> {
        for (seq_id, event) in other.events.iter() {
            self.add_event(*seq_id, event.clone(), 1.0, false)?;
        }
        Ok(())
    }

    /// `self -= other`.
    pub fn sub_year(&mut self, other: &Year) -> Result<(), EngineError> {
        for (seq_id, event) in other.events.iter() {
            self.add_event(*seq_id, event.clone(), -1.0, false)?;
        }
        Ok(())
    }

    /// Returns a Year with every event's `loss`/`reinstatement_prem`
    /// negated (and `full_rip` negated directly, since negation is not a
    /// collision-bearing insertion).
    pub fn negated(&self) -> Year {
        let mut out = Year::new(self.iter_id);
        for (seq_id, event) in self.events.iter() {
            let mut e = event.clone();
            e.loss = -e.loss;
            e.reinstatement_prem = -e.reinstatement_prem;
            e.full_rip = -e.full_rip;
            out.events.insert(*seq_id, e);
        }
        out
    }

    pub fn scale_all(&mut self, factor: f64) {
        for event in self.events.values_mut() {
            event.loss *= factor;
            event.reinstatement_prem *= factor;
        }
    }

    pub fn total_loss(&self, include_rip: bool) -> f64 {
        self.events
            .values()
            .map(|e| if include_rip { e.loss_net_of_rip() } else { e.loss })
            .sum()
    }

    /// Removes all events in risk group `rg` whose `|reinstatement_prem|`
    /// falls below `threshold`. Preserved for interface compatibility with
    /// downstream policy code that consumes this crate's output.
    pub fn filter_out(&mut self, threshold: f64, rg: &str) {
        self.events.retain(|_, e| !(e.risk_group == rg && e.reinstatement_prem.abs() < threshold));
    }
}
