//! Event — a single loss occurrence within a [`crate::year::Year`] (spec §4.1).

use crate::types::{EventId, SeqId};

/// Immutable-ish record of one loss event. Owned by exactly one `Year`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: EventId,
    pub sequence_id: SeqId,
    pub loss: f64,
    pub reinstatement_prem: f64,
    pub full_rip: f64,
    pub risk_group: String,
    /// Unused auxiliary field preserved for compatibility with the source format.
    pub rip_base: f64,
}

impl Default for Event {
    fn default() -> Self {
        Event {
            event_id: EventId(0),
            sequence_id: SeqId(0),
            loss: 0.0,
            reinstatement_prem: 0.0,
            full_rip: 0.0,
            risk_group: "NA".to_string(),
            rip_base: 0.0,
        }
    }
}

impl Event {
    pub fn new(event_id: EventId, loss: f64, reinstatement_prem: f64) -> Self {
        Event { event_id, loss, reinstatement_prem, ..Event::default() }
    }

    pub fn with_risk_group(event_id: EventId, loss: f64, reinstatement_prem: f64, risk_group: impl Into<String>) -> Self {
        Event { event_id, loss, reinstatement_prem, risk_group: risk_group.into(), ..Event::default() }
    }

    pub fn loss_net_of_rip(&self) -> f64 {
        self.loss - self.reinstatement_prem
    }

    pub fn loss_net_of_full_rip(&self) -> f64 {
        self.loss - self.full_rip
    }

    /// Scales `loss` and `reinstatement_prem` by `factor`. Does not touch
    /// `full_rip` — by design, `full_rip` is only rescaled via
    /// [`Event::scale_full_rip`].
    pub fn scale(&mut self, factor: f64) {
        self.loss *= factor;
        self.reinstatement_prem *= factor;
    }

    /// Applies [`Event::scale`] iff `rg == "ALL"` or `rg` matches this event's
    /// risk group; no-op otherwise.
    pub fn scale_with_rg(&mut self, factor: f64, rg: &str) {
        if rg == "ALL" || rg == self.risk_group {
            self.scale(factor);
        }
    }

    /// Applies [`Event::scale`] iff this event's risk group is in `rgs`.
    pub fn scale_with_rg_set(&mut self, factor: f64, rgs: &[String]) {
        if rgs.iter().any(|rg| rg == &self.risk_group) {
            self.scale(factor);
        }
    }

    /// Multiplies `reinstatement_prem` by `factor`, then clamps
    /// `|reinstatement_prem| <= |loss|` by snapping to `loss`'s magnitude,
    /// preserving the sign the premium had before clamping.
    pub fn scale_rip(&mut self, factor: f64) {
        self.reinstatement_prem *= factor;
        if self.reinstatement_prem.abs() > self.loss.abs() {
            self.reinstatement_prem = self.reinstatement_prem.signum() * self.loss.abs();
        }
    }

    /// Analogous clamp on `full_rip`.
    pub fn scale_full_rip(&mut self, factor: f64) {
        self.full_rip *= factor;
        if self.full_rip.abs() > self.loss.abs() {
            self.full_rip = self.full_rip.signum() * self.loss.abs();
        }
    }

    pub fn combine_rip_into_loss(&mut self) {
        self.loss -= self.reinstatement_prem;
        self.reinstatement_prem = 0.0;
    }

    /// Adds `other` into `self` field by field. When `event_id`s differ this
    /// is a soft failure: it is logged (not aborted) unless `other`'s risk
    /// group case-insensitively ends in `"TERR"`, in which case the
    /// mismatch is expected (terrorism risk groups are intentionally
    /// aggregated across event ids) and accepted silently.
    pub fn merge_add(&mut self, other: &Event) {
        if self.event_id != other.event_id {
            let upper = other.risk_group.to_uppercase();
            if !upper.ends_with("TERR") {
                log::warn!(
                    "EventIdMismatch: attempting to add events with different ids: {} in {} != {} in {}",
                    self.event_id,
                    self.risk_group,
                    other.event_id,
                    other.risk_group
                );
            }
        }
        self.loss += other.loss;
        self.reinstatement_prem += other.reinstatement_prem;
        self.full_rip += other.full_rip;
    }
}
