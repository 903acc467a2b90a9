//! EnSuRe: multi-LP-core, deadline-partitioned scheduling with per-window
//! workload quotas and per-window BB-overloading.

use crate::prelude::*;
use crate::schedulers::{fault, SchedulerConfig};
use rand::RngCore;

/// A generated, simulatable EnSuRe schedule, one window per distinct
/// deadline in the taskset.
pub struct EnsureSchedule {
    k: usize,
    pub frame: Time,
    time_step: Time,
    m_pri: usize,
    lp_hp_ratio: f64,

    pub taskset: Vec<Task>,
    /// Distinct deadlines, ascending; window `i` spans `(deadlines[i-1], deadlines[i]]`.
    pub deadlines: Vec<Time>,
    /// Per window: `(start_time, core_index, task index)`, sorted by `start_time`.
    pri_schedule: Vec<Vec<(Time, usize, usize)>>,
    /// Per window: task indices placed in that window, kept in the
    /// workload-quota-descending placement order (the same order
    /// `backup_start`'s prefix sum consumes).
    pub backup_list: Vec<Vec<usize>>,
    backup_start: Vec<Time>,
}

/// `ceil_to_step(rate * length)`, shared by the `workload_quota` and
/// `backup_workload_quota` computations.
fn scaled_ceil(rate: f64, length: Time, time_step: Time) -> Time {
    let raw_ns = (rate * length.as_nanos() as f64).round() as u64;
    Time::nanos(raw_ns).ceil_to_step(time_step)
}

/// BB-overloading window start for a window given its current backup list:
/// reserve capacity for the `min(k, |backup_list|)` largest backup-workload
/// tasks, clamped to not precede `floor`. Called both at construction and
/// on every backup-list removal during simulation.
fn bb_overload_start(k: usize, deadline: Time, taskset: &[Task], backup_list: &[usize], window: usize, floor: Time) -> Time {
    let l = k.min(backup_list.len());
    let reserve: Time = backup_list[.. l].iter().map(|&idx| taskset[idx].backup_workload_quota(window)).sum();
    floor.max(deadline.saturating_sub(reserve))
}

impl EnsureSchedule {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            k: config.k,
            frame: config.frame(),
            time_step: config.time_step(),
            m_pri: config.num_lp_cores,
            lp_hp_ratio: config.lp_hp_ratio,
            taskset: Vec::new(),
            deadlines: Vec::new(),
            pri_schedule: Vec::new(),
            backup_list: Vec::new(),
            backup_start: Vec::new(),
        }
    }

    pub fn time_step(&self) -> Time {
        self.time_step
    }

    /// Partition `taskset` into deadline windows and place each window's
    /// workload quota across the LP cores.
    pub fn generate_schedule(&mut self, mut taskset: Vec<Task>) -> Result<(), SchedError> {
        tracing::debug!(
            num_tasks = taskset.len(),
            m_pri = self.m_pri,
            largest_weight = TasksetStats::largest_weight(&taskset),
            "placing EnSuRe workload quotas",
        );

        taskset.sort_by(|a, b| a.deadline.cmp(&b.deadline));

        let mut deadlines = Vec::new();
        for task in &taskset {
            let deadline = task.deadline
                .ok_or_else(|| SchedError::invalid_config("EnSuRe tasks must carry a deadline"))?;
            if deadlines.last() != Some(&deadline) {
                deadlines.push(deadline);
            }
        }

        let mut alive: Vec<usize> = (0 .. taskset.len()).collect();
        let mut pri_schedule = Vec::with_capacity(deadlines.len());
        let mut backup_list = Vec::with_capacity(deadlines.len());
        let mut backup_start = Vec::with_capacity(deadlines.len());

        for (window, &deadline) in deadlines.iter().enumerate() {
            let start = if window == 0 { Time::zero() } else { deadlines[window - 1] };
            let length = deadline - start;

            let mut total_wq = Time::zero();
            for &idx in &alive {
                let weight = taskset[idx].weight();
                let wq = scaled_ceil(weight, length, self.time_step);
                let bwq = scaled_ceil(self.lp_hp_ratio * weight, length, self.time_step);
                taskset[idx].push_workload_quota(wq);
                taskset[idx].push_backup_workload_quota(bwq);
                total_wq += wq;
            }

            if total_wq > length * self.m_pri as u64 {
                return Err(SchedError::infeasible_reason(format_args!(
                    "window {window}: workload quota {total_wq:?} exceeds {length:?} x {} LP cores",
                    self.m_pri
                )));
            }

            let mut placement_order = alive.clone();
            placement_order.sort_by(|&a, &b|
                taskset[b].workload_quota(window).cmp(&taskset[a].workload_quota(window)));

            let mut core_cursor = vec![start; self.m_pri];
            let mut current_core = 0usize;
            let mut window_schedule = Vec::with_capacity(placement_order.len());

            for &idx in &placement_order {
                let wq = taskset[idx].workload_quota(window);

                let mut attempts = 0;
                while core_cursor[current_core] + wq > start + length {
                    current_core = (current_core + 1) % self.m_pri;
                    attempts += 1;
                    if attempts > self.m_pri {
                        return Err(SchedError::infeasible_reason("unable to place workload quota onto any LP core"));
                    }
                }

                let slot_start = core_cursor[current_core];
                window_schedule.push((slot_start, current_core, idx));
                core_cursor[current_core] += wq;
                current_core = (current_core + 1) % self.m_pri;
            }

            window_schedule.sort_by_key(|&(slot_start, _, _)| slot_start);

            alive.retain(|&idx| taskset[idx].deadline != Some(deadline));

            let start_time = bb_overload_start(self.k, deadline, &taskset, &placement_order, window, Time::zero());

            pri_schedule.push(window_schedule);
            backup_list.push(placement_order);
            backup_start.push(start_time);
        }

        self.taskset = taskset;
        self.deadlines = deadlines;
        self.pri_schedule = pri_schedule;
        self.backup_list = backup_list;
        self.backup_start = backup_start;

        tracing::debug!(num_windows = self.deadlines.len(), "EnSuRe schedule generated");

        Ok(())
    }

    fn recompute_backup_start(&mut self, window: usize, floor: Time) {
        self.backup_start[window] = bb_overload_start(
            self.k, self.deadlines[window], &self.taskset, &self.backup_list[window], window, floor,
        );
    }

    fn remove_from_backup_list(&mut self, window: usize, task_idx: usize, floor: Time) {
        self.backup_list[window].retain(|&idx| idx != task_idx);
        self.recompute_backup_start(window, floor);
    }

    /// Drive the tick loop across every window, in sequence, without
    /// resetting simulation time at window boundaries.
    pub fn simulate(&mut self, lp_cores: &mut [Core], hp_core: &mut Core, rng: &mut dyn RngCore) {
        let mut t = Time::zero();
        let mut lp_assigned: Vec<Option<usize>> = vec![None; lp_cores.len()];
        // (window, task index) the HP core is currently serving. Keyed by
        // window because a backup reserved near a window boundary can still
        // be executing after the outer loop has moved on to the next one.
        let mut hp_assigned: Option<(usize, usize)> = None;

        for window in 0 .. self.deadlines.len() {
            tracing::debug!(window, deadline = ?self.deadlines[window], "entering EnSuRe window");

            for &(_, _, idx) in &self.pri_schedule[window] {
                self.taskset[idx].reset_encountered_fault();
            }

            let start = if window == 0 { Time::zero() } else { self.deadlines[window - 1] };
            let length = self.deadlines[window] - start;

            let schedule_pairs: Vec<(Time, usize)> =
                self.pri_schedule[window].iter().map(|&(s, _, idx)| (s, idx)).collect();

            fault::generate_faults(
                self.k,
                start,
                length,
                self.time_step,
                &schedule_pairs,
                &mut self.taskset,
                |task| task.workload_quota(window),
                |task, relative| task.record_fault_ensure(window, relative),
                rng,
            );

            let mut next_slot = 0usize;
            while t <= self.deadlines[window] {
                // 1. active duration accrual.
                for (core_idx, assigned) in lp_assigned.iter().enumerate() {
                    if assigned.is_some() {
                        lp_cores[core_idx].add_active_duration(self.time_step);
                    }
                }
                if hp_assigned.is_some() {
                    hp_core.add_active_duration(self.time_step);
                }

                // 2. primary completion.
                for core_idx in 0 .. lp_assigned.len() {
                    if let Some(idx) = lp_assigned[core_idx] {
                        let task = &self.taskset[idx];
                        let task_start = task.start_time.expect("LP-assigned task has a start_time");
                        if t >= task_start + task.workload_quota(window) {
                            if !task.encountered_fault {
                                self.taskset[idx].state = TaskSlotState::Completed;
                                self.taskset[idx].completion_time = Some(t);
                                self.taskset[idx].completed = true;
                                self.remove_from_backup_list(window, idx, t);
                                if hp_assigned == Some((window, idx)) {
                                    hp_assigned = None;
                                }
                            }
                            lp_assigned[core_idx] = None;
                        }
                    }
                }

                // 3. backup completion, evaluated against the window the
                // assignment actually came from (not the loop's current
                // window, which may already have moved on).
                if let Some((assigned_window, idx)) = hp_assigned {
                    let task = &self.taskset[idx];
                    let backup_start = task.backup_start_time.expect("HP-assigned task has a backup_start_time");
                    if t >= backup_start + task.backup_workload_quota(assigned_window) {
                        self.remove_from_backup_list(assigned_window, idx, t);
                        hp_assigned = None;
                    }
                }

                // 4. next primary assignment.
                while next_slot < self.pri_schedule[window].len() && t >= self.pri_schedule[window][next_slot].0 {
                    let (_, core_idx, idx) = self.pri_schedule[window][next_slot];
                    if lp_assigned[core_idx] != Some(idx) {
                        lp_assigned[core_idx] = Some(idx);
                        self.taskset[idx].start_time = Some(t);
                        self.taskset[idx].state = TaskSlotState::Running;
                        tracing::trace!(task_id = self.taskset[idx].id, core_idx, t = ?t, "primary assigned");
                    }
                    next_slot += 1;
                }

                // 5. backup assignment. Only claims the HP core when it is
                // truly idle: a carried-over backup from an earlier window
                // must run to completion before this window's reservation
                // can take the core, and an empty `backup_list[window]`
                // doesn't mean the HP core is free.
                if hp_assigned.is_none() && t >= self.backup_start[window] {
                    if let Some(&head) = self.backup_list[window].first() {
                        hp_assigned = Some((window, head));
                        self.taskset[head].backup_start_time = Some(t);
                        tracing::trace!(task_id = self.taskset[head].id, window, t = ?t, "backup assigned");
                    }
                }

                t += self.time_step;
            }
        }

        for core in lp_cores.iter_mut() {
            core.aggregate_energy(self.frame);
        }
        hp_core.aggregate_energy(self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config(k: usize, m_pri: usize) -> SchedulerConfig {
        SchedulerConfig {
            scheduler_type: crate::schedulers::SchedulerType::EnSuRe,
            k,
            frame_ms: 100,
            time_step_ms: 1,
            num_lp_cores: m_pri,
            lp_hp_ratio: 0.8,
            log_debug: false,
        }
    }

    fn cores(n: usize) -> (Vec<Core>, Core) {
        (
            (0 .. n).map(|i| Core::new(format!("lp{i}"), true, 0.5, 1.0, 0.1, 0.05)).collect(),
            Core::new("hp", false, 0.5, 1.0, 0.1, 0.05),
        )
    }

    #[test]
    fn single_window_feasible_schedule_reserves_both_backups() {
        let taskset = vec![
            Task::new(0, Time::millis(30), Time::millis(1), Some(Time::millis(100))),
            Task::new(1, Time::millis(40), Time::millis(1), Some(Time::millis(100))),
        ];

        let mut schedule = EnsureSchedule::new(config(2, 1));
        schedule.generate_schedule(taskset).unwrap();

        assert_eq!(schedule.deadlines, vec![Time::millis(100)]);
        assert!(TasksetStats::is_sorted_by_deadline(&schedule.taskset));
        assert_eq!(schedule.taskset[0].workload_quota(0), Time::millis(30));
        assert_eq!(schedule.taskset[1].workload_quota(0), Time::millis(40));
        assert_eq!(schedule.backup_start[0], Time::millis(44));

        // k equals the task count, so both tasks are guaranteed a fault
        // regardless of the RNG seed: l = min(k, n) = n forces every task
        // to be selected exactly once.
        let (mut lp_cores, mut hp_core) = cores(1);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        schedule.simulate(&mut lp_cores, &mut hp_core, &mut rng);

        assert_eq!(hp_core.active_duration, Time::millis(56));
    }

    #[test]
    fn overloaded_window_is_reported_infeasible() {
        let taskset = vec![
            Task::new(0, Time::millis(40), Time::millis(1), Some(Time::millis(50))),
            Task::new(1, Time::millis(40), Time::millis(1), Some(Time::millis(50))),
        ];

        let mut schedule = EnsureSchedule::new(config(1, 1));
        let result = schedule.generate_schedule(taskset);

        assert!(matches!(result, Err(e) if e.is_infeasible()));
    }
}
