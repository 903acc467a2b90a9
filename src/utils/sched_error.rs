use crate::prelude::*;

/// Error for schedule generation and simulation.
///
/// `InfeasibleSchedule` aborts the run before `simulate` is ever called.
/// `InvalidConfig` is raised eagerly, either at scheduler construction or
/// when a taskset's timings don't lie on the `time_step` grid.
/// `InvariantViolation` is a diagnostic, not a hard failure: it is attached
/// to a [`crate::system::RunReport`] rather than returned as an `Err`.
#[derive(Debug)]
pub enum SchedError {
    InfeasibleSchedule(Option<anyhow::Error>),
    InvalidConfig(anyhow::Error),
    InvariantViolation(Vec<TaskId>),
}

impl std::fmt::Display for SchedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InfeasibleSchedule(None) =>
                write!(f, "unable to generate a feasible schedule"),
            Self::InfeasibleSchedule(Some(reason)) =>
                write!(f, "unable to generate a feasible schedule: {reason}"),
            Self::InvalidConfig(reason) =>
                write!(f, "invalid scheduler configuration: {reason}"),
            Self::InvariantViolation(task_ids) =>
                write!(f, "residual backup tasks at end of simulation: {task_ids:?}"),
        }
    }
}

impl std::error::Error for SchedError {}

impl SchedError {
    pub fn infeasible() -> Self {
        Self::InfeasibleSchedule(None)
    }

    pub fn infeasible_reason(reason: impl std::fmt::Display) -> Self {
        Self::InfeasibleSchedule(Some(anyhow::format_err!("{reason}")))
    }

    pub fn invalid_config(reason: impl std::fmt::Display) -> Self {
        Self::InvalidConfig(anyhow::format_err!("{reason}"))
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::InfeasibleSchedule(_))
    }
}
