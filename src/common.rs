pub mod prelude {
    pub use super::taskset_serde::prelude::*;
    pub use super::{
        Time,
        TaskId,
        Task,
        TaskSlotState,
        Core,
        TasksetStats,
    };
}

pub mod taskset_serde;

#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq, PartialOrd, Ord)]
pub struct Time {
    pub value_ns: u64
}

/// Identity of a [`Task`] within a taskset.
pub type TaskId = u64;

/// State of a task's primary copy on its assigned LP slot.
///
/// Not branched on by the tick loop itself (which derives behaviour from raw
/// timing comparisons), but gives diagnostics and tests a name to assert
/// against instead of re-deriving state from durations.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(Default)]
#[derive(PartialEq, Eq)]
pub enum TaskSlotState {
    #[default]
    Idle,
    Running,
    Completed,
    Faulted,
}

/// One periodic job instance.
///
/// `deadline` is only meaningful for the EnSuRe scheduler; FEST tasks carry
/// `None` and are packed densely into a single frame instead.
#[derive(Clone)]
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub lp_exec: Time,
    pub hp_exec: Time,
    pub deadline: Option<Time>,

    /// per-window quota on the LP core (EnSuRe only; empty for FEST)
    #[serde(skip)]
    pub workload_quota: Vec<Time>,
    /// per-window quota reserved on the HP core (EnSuRe only; empty for FEST)
    #[serde(skip)]
    pub backup_workload_quota: Vec<Time>,

    #[serde(skip)]
    pub state: TaskSlotState,
    #[serde(skip)]
    pub encountered_fault: bool,
    #[serde(skip)]
    pub lp_executed_duration: Time,
    #[serde(skip)]
    pub hp_executed_duration: Time,
    #[serde(skip)]
    pub start_time: Option<Time>,
    #[serde(skip)]
    pub backup_start_time: Option<Time>,
    #[serde(skip)]
    pub completion_time: Option<Time>,
    #[serde(skip)]
    pub completed: bool,
}

/// One processor. Either a Low-Power core (`is_lp == true`) or the single
/// High-Performance backup core.
#[derive(Clone)]
#[derive(Debug)]
pub struct Core {
    pub name: String,
    pub is_lp: bool,

    // energy model parameters
    pub ai: f64,
    pub f: f64,
    pub xi: f64,
    pub p_idle: f64,

    pub active_duration: Time,
    pub energy_consumed: f64,
}

pub struct TasksetStats;

// =============================================================================

impl Time {
    pub const MICRO_TO_NANO: u64 = 1_000;
    pub const MILLI_TO_NANO: u64 = 1_000_000;
    pub const SECS_TO_NANO: u64 = 1_000_000_000;

    pub fn zero() -> Self {
        Self { value_ns: 0 }
    }

    pub fn nanos(time_ns: u64) -> Self {
        Self { value_ns: time_ns }
    }

    pub fn micros(time_us: u64) -> Self {
        Self { value_ns: time_us * Self::MICRO_TO_NANO }
    }

    pub fn millis(time_ms: u64) -> Self {
        Self { value_ns: time_ms * Self::MILLI_TO_NANO }
    }

    /// Build a `Time` from a floating-point millisecond quantity, as read
    /// from taskset CSV/JSON input. Rounds to the nearest nanosecond.
    pub fn millis_f64(time_ms: f64) -> Self {
        Self { value_ns: (time_ms * Self::MILLI_TO_NANO as f64).round() as u64 }
    }

    pub fn as_nanos(&self) -> u64 {
        self.value_ns
    }

    pub fn as_micros(&self) -> u64 {
        self.value_ns / Self::MICRO_TO_NANO
    }

    pub fn as_millis(&self) -> u64 {
        self.value_ns / Self::MILLI_TO_NANO
    }

    pub fn as_millis_f64(&self) -> f64 {
        (self.value_ns as f64) / (Self::MILLI_TO_NANO as f64)
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self { value_ns: self.value_ns.saturating_sub(other.value_ns) }
    }

    /// Ceil `self` up to the nearest multiple of `step` that is at least `step`.
    ///
    /// Rather than rounding a floating-point quantity to a fixed decimal
    /// precision, this ceils an exact integer-nanosecond quantity to the
    /// `step` grid, so no drift accumulates across windows.
    pub fn ceil_to_step(self, step: Self) -> Self {
        if step.value_ns == 0 {
            return self;
        }

        let ticks = self.value_ns.div_ceil(step.value_ns);
        let rounded = Self { value_ns: ticks * step.value_ns };

        if rounded.value_ns < step.value_ns { step } else { rounded }
    }

    /// Nearest-rounded count of `step`-sized ticks spanned by `self`.
    ///
    /// Diagnostic helper (e.g. CLI progress reporting); the feasibility-
    /// critical grid rounding always goes through [`Self::ceil_to_step`].
    pub fn ticks_rounded(self, step: Self) -> u64 {
        use rounded_div::RoundedDiv;
        self.value_ns.rounded_div(step.value_ns)
    }

    /// Whether `step` evenly divides `self`, i.e. `self` lies on the `step` grid.
    pub fn divisible_by(self, step: Self) -> bool {
        step.value_ns != 0 && self.value_ns % step.value_ns == 0
    }
}

impl std::ops::Add for Time {
    type Output = Time;

    fn add(self, rhs: Self) -> Self::Output {
        Self::Output { value_ns: self.value_ns + rhs.value_ns }
    }
}

impl std::ops::AddAssign for Time {
    fn add_assign(&mut self, rhs: Self) {
        self.value_ns += rhs.value_ns;
    }
}

impl std::ops::Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output { value_ns: self.value_ns - rhs.value_ns }
    }
}

impl std::ops::Mul<u64> for Time {
    type Output = Time;

    fn mul(self, rhs: u64) -> Self::Output {
        Self::Output { value_ns: self.value_ns * rhs }
    }
}

impl std::ops::Mul<Time> for u64 {
    type Output = Time;

    fn mul(self, rhs: Time) -> Self::Output {
        rhs * self
    }
}

impl std::ops::Div for Time {
    type Output = u64;

    fn div(self, rhs: Self) -> Self::Output {
        self.value_ns / rhs.value_ns
    }
}

impl std::ops::Div<u64> for Time {
    type Output = Time;

    fn div(self, rhs: u64) -> Self::Output {
        Time { value_ns: self.value_ns / rhs }
    }
}

impl std::iter::Sum for Time {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Time::zero(), |acc, val| acc + val)
    }
}

impl serde::Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer {
        format!("{} ns", self.value_ns).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Time {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de> {
        let time_string = String::deserialize(deserializer)?;

        let pieces: Vec<_> = time_string.trim().split_whitespace().collect();
        if pieces.len() == 1 {
            let time: u64 = pieces[0].parse()
                .map_err(|err| serde::de::Error::custom(format!("Invalid time: {err}")))?;

            Ok(Time { value_ns: time })
        } else if pieces.len() == 2 {
            let time: u64 = pieces[0].parse()
                .map_err(|err| serde::de::Error::custom(format!("Invalid time: {err}")))?;
            let unit = match pieces[1] {
                "s" => Time::SECS_TO_NANO,
                "ms" => Time::MILLI_TO_NANO,
                "us" => Time::MICRO_TO_NANO,
                "ns" => 1,
                u => { return Err(serde::de::Error::custom(format!("Unknown time unit: {u}"))); }
            };

            Ok(Time { value_ns: time * unit })
        } else {
            Err(serde::de::Error::custom("Parsing error, unknown format"))
        }
    }
}

impl Task {
    pub fn new(id: TaskId, lp_exec: Time, hp_exec: Time, deadline: Option<Time>) -> Self {
        Self {
            id,
            lp_exec,
            hp_exec,
            deadline,
            workload_quota: Vec::new(),
            backup_workload_quota: Vec::new(),
            state: TaskSlotState::Idle,
            encountered_fault: false,
            lp_executed_duration: lp_exec,
            hp_executed_duration: hp_exec,
            start_time: None,
            backup_start_time: None,
            completion_time: None,
            completed: false,
        }
    }

    /// Execution-rate demand of this task: `lp_exec / deadline` (EnSuRe only).
    ///
    /// Panics if called on a FEST task (no deadline); FEST never calls this.
    pub fn weight(&self) -> f64 {
        let deadline = self.deadline
            .expect("Task::weight requires a deadline (EnSuRe tasksets only)");

        (self.lp_exec.as_nanos() as f64) / (deadline.as_nanos() as f64)
    }

    pub fn workload_quota(&self, window: usize) -> Time {
        self.workload_quota[window]
    }

    pub fn backup_workload_quota(&self, window: usize) -> Time {
        self.backup_workload_quota[window]
    }

    pub fn push_workload_quota(&mut self, wq: Time) {
        self.workload_quota.push(wq);
    }

    pub fn push_backup_workload_quota(&mut self, bwq: Time) {
        self.backup_workload_quota.push(bwq);
    }

    pub fn reset_encountered_fault(&mut self) {
        self.encountered_fault = false;
        self.state = TaskSlotState::Idle;
    }

    /// Record a fault at `relative` time into the task's FEST primary slot:
    /// `lp_executed_duration := slot_length - relative`,
    /// `hp_executed_duration := hp_exec`.
    pub fn record_fault_fest(&mut self, relative: Time) {
        self.encountered_fault = true;
        self.state = TaskSlotState::Faulted;
        self.lp_executed_duration = self.lp_exec.saturating_sub(relative);
        self.hp_executed_duration = self.hp_exec;
    }

    /// Record a fault at `relative` time into the task's EnSuRe primary slot
    /// for window `window`:
    /// `lp_executed_duration := workload_quota[window] - relative`,
    /// `hp_executed_duration := backup_workload_quota[window]`.
    pub fn record_fault_ensure(&mut self, window: usize, relative: Time) {
        self.encountered_fault = true;
        self.state = TaskSlotState::Faulted;
        self.workload_quota[window] = self.workload_quota[window].saturating_sub(relative);
        self.lp_executed_duration = self.workload_quota[window];
        self.hp_executed_duration = self.backup_workload_quota[window];
    }
}

impl Core {
    pub fn new(name: impl Into<String>, is_lp: bool, ai: f64, f: f64, xi: f64, p_idle: f64) -> Self {
        Self {
            name: name.into(),
            is_lp,
            ai,
            f,
            xi,
            p_idle,
            active_duration: Time::zero(),
            energy_consumed: 0.0,
        }
    }

    /// Active power `P_act = ai*f^3 + xi`.
    pub fn active_power(&self) -> f64 {
        self.ai * self.f * self.f * self.f + self.xi
    }

    /// Idle power `P_idle = p_idle`.
    pub fn idle_power(&self) -> f64 {
        self.p_idle
    }

    pub fn energy_active(&self, duration: Time) -> f64 {
        self.active_power() * duration.as_millis_f64()
    }

    pub fn energy_idle(&self, duration: Time) -> f64 {
        self.idle_power() * duration.as_millis_f64()
    }

    pub fn add_active_duration(&mut self, step: Time) {
        self.active_duration += step;
    }

    /// Finalize this core's energy consumption for a run of length `frame`.
    pub fn aggregate_energy(&mut self, frame: Time) {
        let idle_duration = frame.saturating_sub(self.active_duration);
        self.energy_consumed = self.energy_active(self.active_duration) + self.energy_idle(idle_duration);
    }
}

impl TasksetStats {
    pub fn total_lp_exec(taskset: &[Task]) -> Time {
        taskset.iter().map(|t| t.lp_exec).sum()
    }

    pub fn largest_lp_exec(taskset: &[Task]) -> Time {
        taskset.iter().map(|t| t.lp_exec).max().unwrap_or(Time::zero())
    }

    /// Largest per-task weight (`lp_exec / deadline`) in the taskset.
    ///
    /// Diagnostic/reporting helper; the schedulers compute `weight()`
    /// per-task, per-window, directly.
    pub fn largest_weight(taskset: &[Task]) -> f64 {
        let max = taskset.iter()
            .filter(|t| t.deadline.is_some())
            .map(|t| ordered_float::OrderedFloat(t.weight()))
            .max();

        match max {
            Some(max) => *max,
            None => 0f64,
        }
    }

    pub fn is_sorted_by_lp_exec_desc(taskset: &[Task]) -> bool {
        taskset.windows(2).all(|w| w[0].lp_exec >= w[1].lp_exec)
    }

    pub fn is_sorted_by_deadline(taskset: &[Task]) -> bool {
        taskset.windows(2).all(|w| w[0].deadline <= w[1].deadline)
    }
}
