//! Incidents: reversible units of change.

/// One reversible edit against a target.
///
/// `apply` performs the edit and `inverse` undoes it precisely. Both are
/// infallible once the incident is constructed; if a replay precondition no
/// longer holds, implementations degrade and log rather than panic.
///
/// `is_empty`, `merge_with` and `blocks_merge` default to "never": incident
/// kinds that can coalesce or become no-ops override them.
pub trait Incident {
    /// State the incident mutates.
    type Target;

    fn apply(&mut self, target: &mut Self::Target);

    fn inverse(&mut self, target: &mut Self::Target);

    /// True when applying this incident would change nothing.
    ///
    /// Empty incidents are pruned when their protocol is signed.
    fn is_empty(&self) -> bool {
        false
    }

    /// Absorb `other` into `self`, returning whether it was absorbed.
    ///
    /// On success `self` must represent both edits as one reversible unit and
    /// `other` is dropped without being applied.
    fn merge_with(&mut self, _other: &Self) -> bool {
        false
    }

    /// True when `other` must not merge into any incident recorded before
    /// `self`, because `self` changes what `other` acts on.
    fn blocks_merge(&self, _other: &Self) -> bool {
        false
    }
}
