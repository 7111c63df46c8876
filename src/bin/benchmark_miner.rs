use logsift::{ChangeType, MinerConfig, Profiler, TemplateMiner};
use std::fs;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <log_file>", args[0]);
        std::process::exit(1);
    }

    let content = fs::read_to_string(&args[1])?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        eprintln!("{} has no lines", args[1]);
        std::process::exit(1);
    }

    let mut config = MinerConfig::default();
    config.masking.use_defaults = true;

    println!("Benchmarking template mining on {} lines...", lines.len());

    // Warmup on a throwaway miner so regexes are compiled and caches are hot
    let mut warm = TemplateMiner::new(config.clone())?;
    for line in lines.iter().take(1000) {
        warm.add_line(line);
    }

    let mut miner = TemplateMiner::with_profiler(config, Profiler::enabled())?;
    let start = Instant::now();
    let mut created = 0usize;
    let mut changed = 0usize;
    for line in &lines {
        match miner.add_line(line).change_type {
            ChangeType::ClusterCreated => created += 1,
            ChangeType::TemplateChanged => changed += 1,
            ChangeType::None => {}
        }
    }
    let duration = start.elapsed();
    let lines_per_sec = lines.len() as f64 / duration.as_secs_f64();

    println!("Results:");
    println!("  Total time: {:.3}s", duration.as_secs_f64());
    println!("  Lines per second: {:.0}", lines_per_sec);
    println!("  Clusters: {} (created {}, template changes {})", miner.clusters().len(), created, changed);
    println!("  Stages:");
    for section in miner.profiler().report() {
        println!("    {section}");
    }

    Ok(())
}
