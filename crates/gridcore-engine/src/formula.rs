//! Formula callables and the explicit suspension protocol (spec 9, "Coroutines & exceptions
//! for control flow -> explicit result enum").
//!
//! The engine never parses formula text (spec 1, out of scope): a formula is an opaque
//! `Formula` impl produced by a codegen collaborator, or by this crate itself for the handful
//! of formulas the engine owns outright (lookup indices, summary `group`/helper columns).

use gridcore_common::{Node, RowId, Value};

use crate::document::EvalContext;

/// A suspension a formula raised instead of returning a value — handled internally by the
/// recompute loop (`NeedsRow`) or surfaced to the caller for async fulfillment (`NeedsRequest`).
/// Replaces the source implementation's `OrderError`/`RequestingError` exceptions with an
/// explicit `Result` error type (spec 9).
#[derive(Debug, Clone)]
pub enum Suspend {
    /// "I needed cell `node[row]` that isn't ready yet." (`OrderError` in the originating
    /// implementation.)
    NeedsRow(Node, RowId),
    /// The formula called an async request function and is waiting on an external answer.
    NeedsRequest(String, Value),
}

pub type FormulaResult<T = Value> = Result<T, Suspend>;

/// What the recompute loop actually dispatches on after calling a formula and catching any
/// panic (spec 9: `FormulaOutcome = {Value(v), NeedsRow(node,row), NeedsRequest(key,args)}`).
#[derive(Debug, Clone)]
pub enum FormulaOutcome {
    Value(Value),
    NeedsRow(Node, RowId),
    NeedsRequest(String, Value),
}

impl From<FormulaResult> for FormulaOutcome {
    fn from(r: FormulaResult) -> Self {
        match r {
            Ok(v) => FormulaOutcome::Value(v),
            Err(Suspend::NeedsRow(n, r)) => FormulaOutcome::NeedsRow(n, r),
            Err(Suspend::NeedsRequest(k, a)) => FormulaOutcome::NeedsRequest(k, a),
        }
    }
}

/// An opaque, compiled formula body (spec 3, "Column.formula_body"). Implementors read other
/// cells exclusively through `ctx` so every read is recorded as a dependency edge (spec 3's
/// core invariant).
pub trait Formula {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult;
}

impl<F> Formula for F
where
    F: Fn(RowId, &mut EvalContext<'_>) -> FormulaResult,
{
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult {
        self(row, ctx)
    }
}
