use bbo_sim::prelude::*;
use rand::SeedableRng;

#[derive(clap::Parser, Debug, Clone)]
pub struct Args {
    pub taskset_file: String,

    #[arg(short='k', default_value_t = 1)]
    pub k: usize,

    #[arg(long="frame-ms", default_value_t = 200)]
    pub frame_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    let taskset = parse_taskset(&args.taskset_file, TasksetFileType::Auto)?;

    let config = SchedulerConfig {
        scheduler_type: SchedulerType::Fest,
        k: args.k,
        frame_ms: args.frame_ms,
        time_step_ms: 1,
        num_lp_cores: 1,
        lp_hp_ratio: 0.5,
        log_debug: false,
    };

    let mut system = System::new(config);
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
    let report = system.run(&taskset, &mut rng)?;

    for core in &report.per_core {
        println!("{}: active={:?} energy={:.3}", core.name, core.active_duration, core.energy_consumed);
    }
    println!("total energy: {:.3}", report.total_energy);

    Ok(())
}
