//! Error representation for the document engine.
//!
//! - **`GridErrorKind`** : the canonical set of user/formula-facing error codes
//! - **`GridError`**     : kind + message + first-occurrence details, mirrors what a formula
//!   cell can hold and what an `apply_user_actions` failure surfaces to the caller.
//!
//! Internal control-flow signals used while draining the recompute map (`OrderError`,
//! `RequestingError` in the originating implementation) are *not* represented here — see
//! `gridcore_engine::engine::recompute::FormulaOutcome`. Those never escape as a `GridError`.

use std::fmt;
use thiserror::Error;

/// The canonical error codes a formula cell can hold, or that `apply_user_actions` can raise.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GridErrorKind {
    /// Bad type/argument/constraint in a user action.
    InvalidInput,
    /// `fetch_table_schema()` disagrees with `_grist_Tables`/`_grist_Tables_column`.
    SchemaMismatch,
    /// Raised by the lock mechanism in the recompute loop (spec 4.4, 7).
    CircularRef,
    /// "Engine not making progress" — a bug in the engine, not user data (spec 4.4 step 5).
    EngineProgress,
    /// A referenced table/column/row does not exist.
    NotFound,
    /// A value could not be converted to a column's target type and was not wrapped as AltText
    /// because the column itself rejects non-convertible input (metadata columns only; pure
    /// data columns must use `Value::AltText` instead, spec 4.1).
    TypeConversion,
    /// Arbitrary formula-raised exception, named after the exception kind.
    Custom(&'static str),
}

impl fmt::Display for GridErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "InvalidInput"),
            Self::SchemaMismatch => write!(f, "SchemaMismatch"),
            Self::CircularRef => write!(f, "CircularRefError"),
            Self::EngineProgress => write!(f, "EngineProgressError"),
            Self::NotFound => write!(f, "NotFound"),
            Self::TypeConversion => write!(f, "TypeConversion"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// One error value: enough to render `Value::Error` and to unwind a failed user action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{kind}{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct GridError {
    pub kind: GridErrorKind,
    pub message: Option<String>,
    /// Traceback-equivalent detail, populated only on first occurrence per node to limit spam
    /// (spec 4.4 step 2, "Any other exception").
    pub details: Option<String>,
}

impl GridError {
    pub fn new(kind: GridErrorKind) -> Self {
        Self {
            kind,
            message: None,
            details: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Drop `details`, keeping kind/message — used after the first log of a repeated formula
    /// exception (spec 4.4: "traceback on first occurrence per node only").
    pub fn without_details(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            details: None,
        }
    }

    pub fn circular_ref() -> Self {
        Self::new(GridErrorKind::CircularRef).with_message("Circular Reference")
    }
}
