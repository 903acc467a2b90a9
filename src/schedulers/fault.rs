//! Shared fault-injection routine for both schedulers.

use crate::prelude::*;
use rand::RngCore;

/// Inject up to `k` faults into the primary slots of `schedule`.
///
/// `schedule` pairs a slot's start time with the index of the `taskset`
/// entry occupying it. `slot_length` reports how long that index's current
/// slot runs for (`lp_exec` for FEST, `workload_quota(window)` for EnSuRe);
/// `record_fault` is invoked with the faulted task and the fault's offset
/// from the slot's own start, and is expected to set `encountered_fault`.
///
/// At most one fault per task: a resampled `fault_time` that lands on an
/// already-faulted task, or on no slot at all, is discarded and redrawn.
/// Exactly `min(k, schedule.len())` faults are produced.
///
/// Pure with respect to everything but `taskset`/`rng`: no hidden state is
/// read or written outside its arguments, so both schedulers can share this
/// one routine instead of duplicating the sampling loop.
pub fn generate_faults(
    k: usize,
    start: Time,
    length: Time,
    time_step: Time,
    schedule: &[(Time, usize)],
    taskset: &mut [Task],
    slot_length: impl Fn(&Task) -> Time,
    mut record_fault: impl FnMut(&mut Task, Time),
    rng: &mut dyn RngCore,
) -> Vec<TaskId> {
    let l = k.min(schedule.len());
    if l == 0 {
        return Vec::new();
    }

    let steps = length.as_nanos() / time_step.as_nanos();
    let mut faulted_ids = Vec::with_capacity(l);

    for _ in 0..l {
        let task_id = loop {
            let r = rng.next_u64() % (steps + 1);
            let fault_time = start + time_step * r;

            let hit = schedule.iter().find(|&&(slot_start, idx)| {
                fault_time >= slot_start && fault_time <= slot_start + slot_length(&taskset[idx])
            });

            match hit {
                Some(&(slot_start, idx)) if !taskset[idx].encountered_fault => {
                    let relative = fault_time.saturating_sub(slot_start);
                    record_fault(&mut taskset[idx], relative);
                    tracing::trace!(task_id = taskset[idx].id, ?fault_time, ?relative, "fault injected");
                    break taskset[idx].id;
                }
                _ => continue,
            }
        };

        faulted_ids.push(task_id);
    }

    faulted_ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn injects_at_most_one_fault_per_task_and_respects_k() {
        let mut taskset = vec![
            Task::new(1, Time::millis(10), Time::millis(5), None),
            Task::new(2, Time::millis(10), Time::millis(5), None),
            Task::new(3, Time::millis(10), Time::millis(5), None),
        ];
        let schedule = vec![(Time::millis(0), 0), (Time::millis(10), 1), (Time::millis(20), 2)];
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);

        let faulted = generate_faults(
            2,
            Time::zero(),
            Time::millis(30),
            Time::millis(1),
            &schedule,
            &mut taskset,
            |task| task.lp_exec,
            |task, relative| task.record_fault_fest(relative),
            &mut rng,
        );

        assert_eq!(faulted.len(), 2);
        assert_eq!(faulted.iter().collect::<std::collections::HashSet<_>>().len(), 2);
        assert_eq!(taskset.iter().filter(|t| t.encountered_fault).count(), 2);
    }

    #[test]
    fn k_zero_injects_nothing() {
        let mut taskset = vec![Task::new(1, Time::millis(10), Time::millis(5), None)];
        let schedule = vec![(Time::millis(0), 0)];
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);

        let faulted = generate_faults(
            0,
            Time::zero(),
            Time::millis(10),
            Time::millis(1),
            &schedule,
            &mut taskset,
            |task| task.lp_exec,
            |task, relative| task.record_fault_fest(relative),
            &mut rng,
        );

        assert!(faulted.is_empty());
        assert!(!taskset[0].encountered_fault);
    }
}
