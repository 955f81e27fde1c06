use std::path::PathBuf;
use log::info;

use lockstep::scheduler::{
    CommitPolicy, CompatibilityPolicy, DeadlockDetection, Scheduler, SchedulerConfig, VictimPolicy,
};
use lockstep::{load_histories, LockstepError, Schedule};

/// Demo histories, each with the behaviour it shows
const DEMO_HISTORIES: [(&str, &str); 5] = [
    ("History with no conflicts", "r1[x] r2[y] r1[y] c1 w2[x] c2"),
    ("History with an operation that needs to be delayed", "r1[x] w1[x] w2[x] c1 c2"),
    ("History with a deadlock", "r1[x] w2[y] r1[y] w2[x] c1 c2"),
    ("History with an operation that can't be executed", "r1[x] r2[y] r1[y] c1 r1[x] w2[x] c2"),
    (
        "History with more than one operation that has to be delayed",
        "r1[x] w1[x] w2[x] r2[y] w2[y] c1 c2",
    ),
];

fn print_help() {
    println!("Lockstep - A strict two-phase locking scheduler simulator");
    println!();
    println!("Usage: lockstep [OPTIONS]");
    println!();
    println!("Without --history or --file the built-in demo histories are scheduled.");
    println!();
    println!("Options:");
    println!("  -H, --history TEXT        Schedule one history, e.g. \"r1[x] w2[x] c1 c2\"");
    println!("  -f, --file PATH           Schedule every history in PATH (one per line, # comments)");
    println!("      --json                Print each schedule as JSON");
    println!("      --marked              Prefix operations that had to wait with '*'");
    println!("      --legacy              Use the classic simulator rules");
    println!("      --compat MODE         all-holders (default) | first-holder");
    println!("      --detection MODE      pairwise (default) | graph");
    println!("      --victim MODE         requester (default) | first-waiter");
    println!("      --commit MODE         retry (default) | skip");
    println!("      --keep-phase          Do not reset an aborted transaction to growing");
    println!("      --max-steps N         Stop a run after N steps (default: no limit)");
    println!("  -h, --help                Show this help");
}

/// Output options
#[derive(Default)]
struct Output {
    json: bool,
    marked: bool,
}

fn report(history: &str, schedule: &Schedule, output: &Output) -> Result<(), LockstepError> {
    if output.json {
        let report = serde_json::json!({
            "history": history,
            "final_history": schedule.render(", "),
            "schedule": schedule,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // Notices already went to the log while scheduling
    println!("Original history: {}", history);
    let final_history = if output.marked {
        schedule.render_marked(", ")
    } else {
        schedule.render(", ")
    };
    if !final_history.is_empty() {
        println!("Final history: {}", final_history);
    }
    println!("--------------------");
    Ok(())
}

fn next_value(args: &[String], i: usize, option: &str) -> Result<String, LockstepError> {
    args.get(i + 1)
        .cloned()
        .ok_or_else(|| LockstepError::Config(format!("Missing value for {}", option)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    // Parse command line arguments (simple)
    let args: Vec<String> = std::env::args().collect();

    let mut config = SchedulerConfig::default();
    let mut output = Output::default();
    let mut histories: Vec<(String, String)> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--history" | "-H" => {
                let history = next_value(&args, i, arg)?;
                histories.push(("History".to_string(), history));
                i += 1;
            }
            "--file" | "-f" => {
                let path = PathBuf::from(next_value(&args, i, arg)?);
                for (n, history) in load_histories(&path)?.into_iter().enumerate() {
                    histories.push((format!("{} #{}", path.display(), n + 1), history));
                }
                i += 1;
            }
            "--json" => output.json = true,
            "--marked" => output.marked = true,
            "--legacy" => config = SchedulerConfig { max_steps: config.max_steps, ..SchedulerConfig::legacy() },
            "--compat" => {
                config.compatibility = CompatibilityPolicy::from_name(&next_value(&args, i, arg)?)?;
                i += 1;
            }
            "--detection" => {
                config.detection = DeadlockDetection::from_name(&next_value(&args, i, arg)?)?;
                i += 1;
            }
            "--victim" => {
                config.victim = VictimPolicy::from_name(&next_value(&args, i, arg)?)?;
                i += 1;
            }
            "--commit" => {
                config.commit = CommitPolicy::from_name(&next_value(&args, i, arg)?)?;
                i += 1;
            }
            "--keep-phase" => config.reset_phase_on_abort = false,
            "--max-steps" => {
                config.max_steps = Some(next_value(&args, i, arg)?.parse()?);
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(LockstepError::Config(format!("Unknown option: {}", other)).into());
            }
        }
        i += 1;
    }

    if histories.is_empty() {
        histories = DEMO_HISTORIES
            .iter()
            .map(|(title, history)| (title.to_string(), history.to_string()))
            .collect();
    }

    info!("Scheduler configuration: {}", config);
    let scheduler = Scheduler::new(config);

    for (title, history) in &histories {
        if !output.json {
            println!("{}", title);
        }
        let schedule = scheduler.execute_history(history)?;
        report(history, &schedule, &output)?;
    }

    Ok(())
}
