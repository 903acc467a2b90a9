use crate::prelude::*;
use bbo_sim::prelude::*;
use anyhow::Context;
use rand::SeedableRng;

pub mod prelude {
    pub use super::args::prelude::*;
}

pub mod args;

fn main() {
    let args = match <Args as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(err) => {
            use clap::error::ErrorKind::*;

            let exit_code = match err.kind() {
                DisplayHelp |
                DisplayHelpOnMissingArgumentOrSubcommand |
                DisplayVersion => 0,
                _ => 2,
            };

            err.print().unwrap();
            std::process::exit(exit_code);
        },
    };

    if let Err(err) = check_args(&args) {
        eprintln!("{err}");
        std::process::exit(2);
    }

    let log_level = if args.debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let quiet = args.quiet;
    match main_wo_exit_code(args) {
        Ok(feasible) => {
            if quiet {
                std::process::exit(if feasible { 0 } else { 1 });
            }
        },
        Err(err) => {
            eprintln!("{err:?}");
            std::process::exit(2);
        },
    };
}

fn check_args(args: &Args) -> anyhow::Result<()> {
    let spec = &args.scheduler_specification;
    let flags_given = spec.algorithm.is_some() && spec.k.is_some() && spec.frame_ms.is_some();

    match (flags_given, spec.config_file.is_some()) {
        (true, false) | (false, true) => Ok(()),
        _ => Err(anyhow::anyhow!(
            "Either specify --algorithm, --k and --frame-ms, or a --config file (run with -h for help)"
        )),
    }
}

fn build_scheduler_config(args: &Args) -> anyhow::Result<SchedulerConfig> {
    let spec = &args.scheduler_specification;

    if let Some(config_file) = &spec.config_file {
        let config_data = std::fs::read_to_string(config_file)
            .with_context(|| format!("reading config file {config_file}"))?;
        serde_json::from_str(&config_data)
            .with_context(|| format!("parsing config file {config_file}"))
    } else {
        Ok(SchedulerConfig {
            scheduler_type: spec.algorithm.expect("checked by check_args"),
            k: spec.k.expect("checked by check_args"),
            frame_ms: spec.frame_ms.expect("checked by check_args"),
            time_step_ms: spec.time_step_ms,
            num_lp_cores: spec.num_lp_cores,
            lp_hp_ratio: spec.lp_hp_ratio,
            log_debug: args.debug,
        })
    }
}

/// Returns whether the run produced a feasible schedule (for `-q`'s exit code).
fn main_wo_exit_code(args: Args) -> anyhow::Result<bool> {
    let taskset = parse_taskset(&args.taskset_args.taskset_file, args.taskset_args.taskset_file_ty)
        .context("failed to load taskset")?;

    let scheduler_config = build_scheduler_config(&args)?;
    let mut system = System::new(scheduler_config);
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(args.seed);

    match system.run(&taskset, &mut rng) {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(true)
        },
        Err(err) => match err.downcast_ref::<SchedError>() {
            Some(sched_err) if sched_err.is_infeasible() => {
                eprintln!("{sched_err}");
                Ok(false)
            },
            _ => Err(err),
        },
    }
}

fn print_report(report: &RunReport) {
    println!("{:<12} {:>14} {:>14}", "core", "active (ms)", "energy");
    for core in &report.per_core {
        println!("{:<12} {:>14} {:>14.3}", core.name, core.active_duration.as_millis(), core.energy_consumed);
    }
    println!("{:-<42}", "");
    println!("{:<12} {:>14} {:>14.3}", "total", "", report.total_energy);

    if !report.residual_backup_task_ids.is_empty() {
        println!("residual backup tasks: {:?}", report.residual_backup_task_ids);
    }
}
