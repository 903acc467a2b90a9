pub mod prelude {
    pub use super::{Args, SchedulingArgs, TasksetArgs, DEFAULT_SEED};
}

const DEFAULT_AFTER_HELP: &str = "Refer to the crate's documentation for further help";

/// Fixed so a run is reproducible unless `--seed` is passed explicitly.
pub const DEFAULT_SEED: u64 = 0x5EED_0000_0001;

#[derive(clap::Parser, Debug)]
#[command(after_help=DEFAULT_AFTER_HELP)]
pub struct Args {
    /// Quiet mode / Exit code as run result
    ///
    /// When enabled, a zero exit code means a feasible schedule was
    /// simulated, a one means the taskset was infeasible, any other code
    /// means an error happened.
    #[arg(short='q', default_value="false", action=clap::ArgAction::SetTrue)]
    pub quiet: bool,

    /// Emit the run report as JSON instead of a plain-text summary
    #[arg(long, default_value="false", action=clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Enable debug-level logging
    #[arg(short='v', long="debug", default_value="false", action=clap::ArgAction::SetTrue)]
    pub debug: bool,

    /// RNG seed driving fault injection
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    #[command(flatten, next_help_heading="Scheduler Specification")]
    pub scheduler_specification: SchedulingArgs,

    #[command(flatten, next_help_heading="Taskset Specification")]
    pub taskset_args: TasksetArgs,
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = true)]
pub struct SchedulingArgs {
    /// Scheduling algorithm
    #[arg(short='a', long="algorithm", value_name="ALGORITHM")]
    pub algorithm: Option<bbo_sim::prelude::SchedulerType>,

    /// Number of primary faults tolerated per frame (FEST) or window (EnSuRe)
    #[arg(short='k', long, value_name="K")]
    pub k: Option<usize>,

    /// Frame length (FEST) / total horizon (EnSuRe), in ms
    #[arg(long="frame-ms", value_name="MS")]
    pub frame_ms: Option<u64>,

    /// Simulation grid, in ms
    #[arg(long="time-step-ms", value_name="MS", default_value_t = 1)]
    pub time_step_ms: u64,

    /// Number of LP cores. FEST requires exactly one
    #[arg(short='n', long="num-lp-cores", default_value_t = 1)]
    pub num_lp_cores: usize,

    /// Ratio of LP to HP core frequency, in (0, 1]
    #[arg(long="lp-hp-ratio", default_value_t = 0.5)]
    pub lp_hp_ratio: f64,

    /// Load the full scheduler configuration from a JSON file instead
    #[arg(short='c', long="config", value_name="CONFIG FILE")]
    pub config_file: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct TasksetArgs {
    /// Taskset data file
    #[arg(short='i', long="taskset", value_name="TASKSET FILE")]
    pub taskset_file: String,

    /// Taskset file type
    #[arg(value_enum, short='f', long="format", value_name="FORMAT", default_value="auto")]
    pub taskset_file_ty: bbo_sim::prelude::TasksetFileType,
}
