//! Scenario and invariant coverage from spec 8: one file per scenario/invariant, built on top
//! of the same `Document`/`apply_user_actions` surface a host would use.

mod common;
mod cycle_and_peek;
mod invariants;
mod lookup_dependency;
mod manual_updates_trigger;
mod summary_editing_restrictions;
mod summary_incremental;
mod trim_and_undo;
