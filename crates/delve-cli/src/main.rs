//! `delve-cli` – command line entry point for the delve control layer.
//!
//! ```text
//! delve run [--ticks N] [--sim-runs N] [--offline]   drive the orchestrator against the simulator
//! delve price <name>                                 refresh reference prices and look one up
//! delve init [--force]                               write the default ~/.delve/config.toml
//! ```
//!
//! Ctrl-C and a tripped error breaker both set the shared shutdown flag; the
//! tick loop checks it before every tick.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info, warn};

use delve_hal::SimClient;
use delve_kernel::{Clock, ErrorBreaker, SystemClock};
use delve_pricing::PriceCache;
use delve_runtime::{Orchestrator, TickOutcome, register_default_tasks};
use delve_types::ItemRef;

#[derive(Parser)]
#[command(name = "delve", version)]
#[command(about = "Task orchestration for an instanced game loop")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator against the simulated client
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Apparatus items seeded into the simulated storage; also caps the run limit
        #[arg(long, default_value_t = 3)]
        sim_runs: u32,

        /// Skip the reference price feed
        #[arg(long)]
        offline: bool,
    },

    /// Refresh the reference price cache and print the value for an item
    Price {
        /// Item name (exact, case-insensitive or substring match)
        name: String,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = delve_runtime::init_tracing("delve");

    let result = match cli.command {
        Command::Run {
            ticks,
            sim_runs,
            offline,
        } => run(ticks, sim_runs, offline),
        Command::Price { name } => price(&name),
        Command::Init { force } => init(force),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// delve run
// ─────────────────────────────────────────────────────────────────────────────

fn run(ticks: Option<u64>, sim_runs: u32, offline: bool) -> Result<ExitCode, String> {
    print_banner();
    let mut cfg = config::load()?;
    cfg.settings.max_runs = run_limit(cfg.settings.max_runs, sim_runs);
    info!(max_runs = cfg.settings.max_runs, tick_ms = cfg.tick_ms, "configuration loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current tick …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = Arc::new(
        SimClient::builder(clock.clone())
            .with_storage(seed_storage(sim_runs))
            .with_loot_table(vec![
                "Chaos Orb".to_string(),
                "Exalted Orb".to_string(),
                "Orb of Transmutation".to_string(),
            ])
            .build(),
    );

    let stop_flag = shutdown.clone();
    let breaker = ErrorBreaker::from_settings(&cfg.settings.breaker, clock.clone())
        .with_stop_action(move |reason| {
            error!(%reason, "error breaker tripped; stopping");
            stop_flag.store(true, Ordering::SeqCst);
        });

    let mut orchestrator = Orchestrator::new(client.clone(), clock.clone(), breaker);

    // Held until the loop ends so background refreshes keep running.
    let runtime = if offline {
        None
    } else {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to start async runtime: {}", e))?;
        let cache = PriceCache::from_settings(&cfg.settings.pricing, clock.clone())
            .map_err(|e| format!("Failed to build price client: {}", e))?
            .on_runtime(runtime.handle().clone());
        match runtime.block_on(cache.force_refresh()) {
            Ok(report) => println!(
                "  Reference prices: {} entries (generation {})",
                report.entries.to_string().bold(),
                report.generation
            ),
            Err(e) => println!(
                "  {} {}",
                "Reference prices unavailable:".yellow(),
                e.to_string().dimmed()
            ),
        }
        orchestrator = orchestrator.with_prices(cache);
        Some(runtime)
    };

    register_default_tasks(&mut orchestrator, &cfg.settings);
    println!(
        "  Session {}  tasks: {}\n",
        orchestrator.session_id().to_string().dimmed(),
        orchestrator.task_names().join(" → ").cyan()
    );

    let tick_interval = Duration::from_millis(cfg.tick_ms);
    while !shutdown.load(Ordering::SeqCst) {
        if ticks.is_some_and(|limit| orchestrator.tick_count() >= limit) {
            info!(ticks = orchestrator.tick_count(), "tick limit reached");
            break;
        }
        match orchestrator.execute() {
            TickOutcome::Halted => break,
            TickOutcome::Idle if cfg.settings.max_runs > 0 => {
                info!("run limit reached and nothing left to do");
                break;
            }
            TickOutcome::Failed { task, error } => {
                println!("  {} {}: {}", "✗".red(), task.bold(), error);
            }
            TickOutcome::Ran { .. } | TickOutcome::Idle => {}
        }
        clock.sleep(tick_interval);
    }
    drop(runtime);

    let counters = delve_hal::StateQuery::counters(client.as_ref());
    println!();
    println!(
        "  Instances completed: {}  ticks: {}",
        counters.completed.to_string().bold(),
        orchestrator.tick_count()
    );

    if let Err(e) = orchestrator.health() {
        println!("  {} {}", "Halted:".red().bold(), e);
        return Ok(ExitCode::FAILURE);
    }
    println!("  {}", "✓ Done.".green());
    Ok(ExitCode::SUCCESS)
}

/// Effective run limit: `sim_runs` caps the configured limit (0 = unlimited).
fn run_limit(configured: u32, sim_runs: u32) -> u32 {
    match configured {
        0 => sim_runs,
        n => n.min(sim_runs),
    }
}

fn seed_storage(count: u32) -> Vec<ItemRef> {
    (0..count)
        .map(|i| {
            let tier = 1 + (i % 16) as u8;
            ItemRef::new(1_000 + u64::from(i), format!("Tier {tier} Map"), tier)
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// delve price
// ─────────────────────────────────────────────────────────────────────────────

fn price(name: &str) -> Result<ExitCode, String> {
    let cfg = config::load()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = PriceCache::from_settings(&cfg.settings.pricing, clock)
        .map_err(|e| format!("Failed to build price client: {}", e))?
        .on_runtime(runtime.handle().clone());

    print!("  Refreshing from {} … ", cfg.settings.pricing.base_url.dimmed());
    let report = runtime
        .block_on(cache.force_refresh())
        .map_err(|e| format!("price refresh failed: {}", e))?;
    println!("{} ({} entries)", "ok".green(), report.entries);
    if !report.failed.is_empty() {
        println!("  {} {}", "Unavailable categories:".yellow(), report.failed.join(", "));
    }

    let snapshot = cache.snapshot();
    match snapshot.lookup_with_tier(name) {
        Some((entry, tier)) => {
            println!(
                "  {}  {}  ({:?} match on {}, category {})",
                name.bold(),
                format!("{:.2}", entry.value).green().bold(),
                tier,
                entry.key,
                entry.category
            );
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("  {} no reference price", name.bold());
            Ok(ExitCode::FAILURE)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// delve init
// ─────────────────────────────────────────────────────────────────────────────

fn init(force: bool) -> Result<ExitCode, String> {
    let path = config::config_path();
    if path.exists() && !force {
        println!(
            "  Config already exists at {} (use {} to overwrite)",
            path.display().to_string().bold(),
            "--force".bold()
        );
        return Ok(ExitCode::SUCCESS);
    }
    config::save(&config::Config::default())?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(ExitCode::SUCCESS)
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"      __     __         "#.bold().cyan());
    println!("{}", r#"  ___/ /__  / /  _____  "#.bold().cyan());
    println!("{}", r#" / _  / -_)/ / |/ / -_) "#.bold().cyan());
    println!("{}", r#" \_,_/\__//_/|___/\__/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "delve".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_runs_caps_the_configured_limit() {
        assert_eq!(run_limit(0, 3), 3);
        assert_eq!(run_limit(5, 3), 3);
        assert_eq!(run_limit(2, 3), 2);
    }

    #[test]
    fn seeded_storage_holds_distinct_maps() {
        let items = seed_storage(3);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], ItemRef::new(1_000, "Tier 1 Map", 1));
        assert_eq!(items[2].tier, 3);
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from(["delve", "run", "--ticks", "10", "--sim-runs", "2"])
            .expect("valid arguments");
        match cli.command {
            Command::Run {
                ticks,
                sim_runs,
                offline,
            } => {
                assert_eq!(ticks, Some(10));
                assert_eq!(sim_runs, 2);
                assert!(!offline);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_requires_price_name() {
        assert!(Cli::try_parse_from(["delve", "price"]).is_err());
    }
}
