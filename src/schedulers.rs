use crate::prelude::*;

pub mod prelude {
    pub use super::{
        SchedulerConfig,
        SchedulerType,
        Scheduler,
    };
}

pub mod fault;
pub mod fest;
pub mod ensure;

/// Which published algorithm a [`Scheduler`] runs.
#[derive(Clone, Copy, Debug)]
#[derive(PartialEq, Eq)]
#[derive(clap::ValueEnum)]
#[derive(serde::Deserialize)]
pub enum SchedulerType {
    #[value(name = "fest")]
    Fest,
    #[value(name = "ensure")]
    EnSuRe,
}

/// Scheduler configuration: algorithm choice, fault tolerance, and core
/// topology.
///
/// Validated eagerly by [`SchedulerConfig::validate`], called from every
/// scheduler constructor, so an [`SchedError::InvalidConfig`] is always
/// raised before `generate_schedule` runs.
#[derive(Clone, Debug)]
#[derive(serde::Deserialize)]
pub struct SchedulerConfig {
    pub scheduler_type: SchedulerType,
    /// Number of primary faults the system tolerates per frame/window.
    pub k: usize,
    /// Frame length (FEST) / total horizon (EnSuRe), in ms.
    pub frame_ms: u64,
    /// Simulation grid, in ms. Must divide `frame_ms` and every task timing.
    pub time_step_ms: u64,
    /// Number of LP cores. FEST requires exactly 1.
    pub num_lp_cores: usize,
    /// Ratio of LP to HP frequency, in `(0, 1]`.
    pub lp_hp_ratio: f64,
    #[serde(default)]
    pub log_debug: bool,
}

impl SchedulerConfig {
    pub fn frame(&self) -> Time {
        Time::millis(self.frame_ms)
    }

    pub fn time_step(&self) -> Time {
        Time::millis(self.time_step_ms)
    }

    pub fn validate(&self) -> Result<(), SchedError> {
        if self.frame_ms == 0 {
            return Err(SchedError::invalid_config("frame must be positive"));
        }
        if self.time_step_ms == 0 {
            return Err(SchedError::invalid_config("time_step must be positive"));
        }
        if !self.frame().divisible_by(self.time_step()) {
            return Err(SchedError::invalid_config("time_step must divide frame"));
        }
        if self.num_lp_cores == 0 {
            return Err(SchedError::invalid_config("num_lp_cores must be at least 1"));
        }
        if self.scheduler_type == SchedulerType::Fest && self.num_lp_cores != 1 {
            return Err(SchedError::invalid_config("FEST requires exactly one LP core"));
        }
        if !(self.lp_hp_ratio > 0.0 && self.lp_hp_ratio <= 1.0) {
            return Err(SchedError::invalid_config("lp_hp_ratio must lie in (0, 1]"));
        }

        Ok(())
    }
}

/// Tagged-variant scheduler, dispatching to the FEST or EnSuRe algorithm by
/// match rather than dynamic polymorphism.
pub enum Scheduler {
    Fest(fest::FestSchedule),
    EnSuRe(ensure::EnsureSchedule),
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedError> {
        config.validate()?;

        Ok(match config.scheduler_type {
            SchedulerType::Fest => Scheduler::Fest(fest::FestSchedule::new(config)),
            SchedulerType::EnSuRe => Scheduler::EnSuRe(ensure::EnsureSchedule::new(config)),
        })
    }

    /// Try to generate a feasible schedule for `taskset`.
    ///
    /// Returns `Ok(())` on success; `Err(SchedError::InfeasibleSchedule)` if
    /// primary capacity is insufficient, or `Err(SchedError::InvalidConfig)`
    /// if a task's timing doesn't lie on the `time_step` grid. `simulate`
    /// must not be called after an `Err` result.
    pub fn generate_schedule(&mut self, taskset: Vec<Task>) -> Result<(), SchedError> {
        validate_taskset_grid(&taskset, self.time_step())?;

        match self {
            Scheduler::Fest(schedule) => schedule.generate_schedule(taskset),
            Scheduler::EnSuRe(schedule) => schedule.generate_schedule(taskset),
        }
    }

    /// Drive the time-stepped simulation to completion.
    pub fn simulate(&mut self, lp_cores: &mut [Core], hp_core: &mut Core, rng: &mut dyn rand::RngCore) {
        match self {
            Scheduler::Fest(schedule) => schedule.simulate(lp_cores, hp_core, rng),
            Scheduler::EnSuRe(schedule) => schedule.simulate(lp_cores, hp_core, rng),
        }
    }

    /// The run horizon cores' idle energy is computed over: `frame` for
    /// FEST, the configured total duration for EnSuRe.
    pub fn horizon(&self) -> Time {
        match self {
            Scheduler::Fest(schedule) => schedule.frame,
            Scheduler::EnSuRe(schedule) => schedule.frame,
        }
    }

    /// The simulation grid this scheduler was constructed with.
    pub fn time_step(&self) -> Time {
        match self {
            Scheduler::Fest(schedule) => schedule.time_step(),
            Scheduler::EnSuRe(schedule) => schedule.time_step(),
        }
    }

    /// Task ids still reserved for BB-overloading after `simulate` returns;
    /// should be empty when `k` tolerates every injected fault.
    pub fn residual_backup_task_ids(&self) -> Vec<TaskId> {
        match self {
            Scheduler::Fest(schedule) => schedule.backup_list.iter().map(|&idx| schedule.taskset[idx].id).collect(),
            Scheduler::EnSuRe(schedule) =>
                schedule.backup_list.iter()
                    .flatten()
                    .map(|&idx| schedule.taskset[idx].id)
                    .collect(),
        }
    }
}

/// Reject a task whose `lp_exec`, `hp_exec`, or `deadline` doesn't lie on
/// the `time_step` grid: the tick loop only ever lands exactly on grid
/// points, so an off-grid timing would silently mis-account active duration.
fn validate_taskset_grid(taskset: &[Task], time_step: Time) -> Result<(), SchedError> {
    for task in taskset {
        if !task.lp_exec.divisible_by(time_step) {
            return Err(SchedError::invalid_config(format!(
                "task {}: lp_exec {:?} is not a multiple of time_step {:?}", task.id, task.lp_exec, time_step
            )));
        }
        if !task.hp_exec.divisible_by(time_step) {
            return Err(SchedError::invalid_config(format!(
                "task {}: hp_exec {:?} is not a multiple of time_step {:?}", task.id, task.hp_exec, time_step
            )));
        }
        if let Some(deadline) = task.deadline {
            if !deadline.divisible_by(time_step) {
                return Err(SchedError::invalid_config(format!(
                    "task {}: deadline {:?} is not a multiple of time_step {:?}", task.id, deadline, time_step
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_grid_task_timing_is_rejected() {
        let taskset = vec![Task::new(0, Time::millis_f64(25.5), Time::millis(20), None)];
        let result = validate_taskset_grid(&taskset, Time::millis(1));

        assert!(matches!(result, Err(SchedError::InvalidConfig(_))));
    }

    #[test]
    fn on_grid_taskset_is_accepted() {
        let taskset = vec![Task::new(0, Time::millis(25), Time::millis(20), Some(Time::millis(100)))];

        assert!(validate_taskset_grid(&taskset, Time::millis(1)).is_ok());
    }
}
