//! Composes the configured [`Scheduler`] with the LP/HP cores it runs
//! against, and turns one `run` into a read-only report.

use crate::prelude::*;
use crate::schedulers::Scheduler;
use anyhow::Context;

pub mod prelude {
    pub use super::{System, RunReport, CoreReport};
}

/// Per-core slice of a [`RunReport`].
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct CoreReport {
    pub name: String,
    pub is_lp: bool,
    pub active_duration: Time,
    pub energy_consumed: f64,
}

/// Outcome of one [`System::run`]. Read-only once returned.
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct RunReport {
    pub per_core: Vec<CoreReport>,
    pub total_energy: f64,
    /// Non-empty only on a scheduling bug: tasks whose backup reservation
    /// was never fully served.
    pub residual_backup_task_ids: Vec<TaskId>,
}

/// A heterogeneous LP+HP system, parameterized by a [`SchedulerConfig`].
/// Default energy-model parameters follow the published FEST/EnSuRe setup:
/// `ai`/`xi`/`p_idle` fixed per core kind, `hp_freq = 1/ratio`.
pub struct System {
    pub lp_cores: Vec<Core>,
    pub hp_core: Core,
    scheduler_config: SchedulerConfig,
}

impl System {
    pub fn new(scheduler_config: SchedulerConfig) -> Self {
        let lp_freq = 1.0;
        let hp_freq = lp_freq / scheduler_config.lp_hp_ratio;

        let lp_cores = (0 .. scheduler_config.num_lp_cores)
            .map(|i| Core::new(format!("LP_Core{i}"), true, 0.3, lp_freq, 0.03, 0.02))
            .collect();
        let hp_core = Core::new("HP_Core", false, 1.0, hp_freq, 0.1, 0.05);

        Self { lp_cores, hp_core, scheduler_config }
    }

    /// Generate a schedule for `taskset`, simulate it, and aggregate energy.
    /// `taskset` is left untouched: the scheduler works on a clone, so
    /// repeated runs never bleed state across calls.
    pub fn run(&mut self, taskset: &[Task], rng: &mut impl rand::RngCore) -> anyhow::Result<RunReport> {
        tracing::debug!(num_tasks = taskset.len(), num_lp_cores = self.lp_cores.len(), "starting run");

        for core in self.lp_cores.iter_mut() {
            core.active_duration = Time::zero();
            core.energy_consumed = 0.0;
        }
        self.hp_core.active_duration = Time::zero();
        self.hp_core.energy_consumed = 0.0;

        let mut scheduler = Scheduler::new(self.scheduler_config.clone())
            .context("invalid scheduler configuration")?;

        scheduler.generate_schedule(taskset.to_vec())
            .context("failed to generate a feasible schedule")?;

        scheduler.simulate(&mut self.lp_cores, &mut self.hp_core, rng);

        let residual_backup_task_ids = scheduler.residual_backup_task_ids();
        if !residual_backup_task_ids.is_empty() {
            tracing::warn!(
                ?residual_backup_task_ids,
                "residual backup tasks still reserved at end of simulation",
            );
        }

        let per_core: Vec<CoreReport> = self.lp_cores.iter()
            .chain(std::iter::once(&self.hp_core))
            .map(|core| CoreReport {
                name: core.name.clone(),
                is_lp: core.is_lp,
                active_duration: core.active_duration,
                energy_consumed: core.energy_consumed,
            })
            .collect();
        let total_energy = per_core.iter().map(|core| core.energy_consumed).sum();

        Ok(RunReport { per_core, total_energy, residual_backup_task_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn feasible_fest_run_reports_nonnegative_energy_and_no_residual() {
        let config = SchedulerConfig {
            scheduler_type: crate::schedulers::SchedulerType::Fest,
            k: 1,
            frame_ms: 100,
            time_step_ms: 1,
            num_lp_cores: 1,
            lp_hp_ratio: 0.5,
            log_debug: false,
        };
        let mut system = System::new(config);

        let taskset = vec![
            Task::new(0, Time::millis(30), Time::millis(10), None),
            Task::new(1, Time::millis(20), Time::millis(8), None),
        ];

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(9);
        let report = system.run(&taskset, &mut rng).unwrap();

        assert!(report.residual_backup_task_ids.is_empty());
        assert!(report.total_energy > 0.0);
        assert_eq!(report.per_core.len(), 2);
    }

    #[test]
    fn infeasible_taskset_surfaces_as_error() {
        let config = SchedulerConfig {
            scheduler_type: crate::schedulers::SchedulerType::Fest,
            k: 0,
            frame_ms: 10,
            time_step_ms: 1,
            num_lp_cores: 1,
            lp_hp_ratio: 0.5,
            log_debug: false,
        };
        let mut system = System::new(config);

        let taskset = vec![Task::new(0, Time::millis(20), Time::millis(5), None)];

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let result = system.run(&taskset, &mut rng);

        assert!(result.is_err());
    }
}
