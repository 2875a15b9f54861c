//! The return value of `apply_user_actions` (spec 6, "ActionGroup").

use gridcore_common::Value;

use super::doc_action::DocAction;

/// Four parallel lists plus one per-user-action return value.
///
/// `stored` and `calc` overlap deliberately: every doc action in `calc` is also present in
/// `stored` (spec 6: "calc ... also appended to stored") — `calc` exists only so a host can
/// separate "what the user asked for" from "what formulas produced" without re-deriving it.
#[derive(Clone, Default)]
pub struct ActionGroup {
    pub stored: Vec<DocAction>,
    pub direct: Vec<bool>,
    pub undo: Vec<DocAction>,
    pub calc: Vec<DocAction>,
    pub ret_values: Vec<Value>,
}

impl ActionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn push_direct(&mut self, action: DocAction, undo: DocAction) {
        self.stored.push(action);
        self.direct.push(true);
        self.undo.push(undo);
    }

    pub(super) fn push_calc(&mut self, action: DocAction) {
        self.stored.push(action.clone());
        self.direct.push(false);
        self.calc.push(action);
    }

    /// `(len(calc), len(stored), len(undo), len(retValues))` — the undo checkpoint taken before
    /// each user action (spec 4.6 step 1).
    pub(super) fn checkpoint(&self) -> (usize, usize, usize, usize) {
        (self.calc.len(), self.stored.len(), self.undo.len(), self.ret_values.len())
    }

    /// Unwind everything recorded since `checkpoint` by applying `undo` actions in reverse
    /// (spec 4.6 step 5).
    pub(super) fn undo_since(&self, checkpoint: (usize, usize, usize, usize)) -> Vec<DocAction> {
        self.undo[checkpoint.2..].iter().rev().cloned().collect()
    }

    pub(super) fn truncate_to(&mut self, checkpoint: (usize, usize, usize, usize)) {
        self.calc.truncate(checkpoint.0);
        self.stored.truncate(checkpoint.1);
        self.undo.truncate(checkpoint.2);
        self.direct.truncate(checkpoint.1);
        self.ret_values.truncate(checkpoint.3);
    }
}
