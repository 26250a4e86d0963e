use thiserror::Error;

/// All of the ways a mesh run can go wrong.
///
/// `LinkBusy` is the only variant that aborts a run; the others are soft
/// conditions recorded via `tracing` and, where applicable, a sticky flag on
/// the offending component (see `Fifo::full`). Fifo overflow itself is not
/// a variant here: it never aborts a run, so it is tracked via `Fifo::full`
/// plus a `tracing::warn!` at the write site instead of a returned error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("overlapping transmission on link {dir:?} at asic ({row},{col})")]
    LinkBusy { row: usize, col: usize, dir: crate::core::byte::Direction },

    #[error("asic ({row},{col}) reached an undefined FSM state, resetting to Idle")]
    UndefinedState { row: usize, col: usize },

    #[error("receive on direction {dir:?} with no neighbor at asic ({row},{col})")]
    BadDirection { row: usize, col: usize, dir: crate::core::byte::Direction },
}

pub type SimResult<T> = Result<T, SimError>;
