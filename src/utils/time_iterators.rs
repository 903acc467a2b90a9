//! Custom iterators for stepping a simulated clock over `Time` ranges.

use crate::prelude::*;

/// Every `step`-sized tick from `start` up to and including `end`.
///
/// Drives the tick loop of the FEST scheduler: `time_step` is required to
/// divide `end - start`, so the iterator always lands exactly on `end`.
pub fn time_range_iterator_w_step(start: Time, end: Time, step: Time) -> impl Iterator<Item = Time> {
    let start_ns = start.value_ns;
    let end_ns = end.value_ns;
    let step_ns = step.value_ns;

    (start_ns ..= end_ns)
        .step_by(step_ns as usize)
        .map(Time::nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_inclusive_of_end() {
        let ticks: Vec<_> = time_range_iterator_w_step(Time::millis(0), Time::millis(10), Time::millis(5)).collect();

        assert_eq!(ticks, vec![Time::millis(0), Time::millis(5), Time::millis(10)]);
    }
}
