//! Binary entrypoint for the Growquest CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `status` - print store record counts and engine counters
//! - `catalog` - load and validate the configured catalog
//! - `inspect <user>` - print a user's inventory, timers, pet, progress and achievements
//!
//! See the library crate docs for module-level details: `growquest::`.
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};

use growquest::config::Config;
use growquest::engine::{achievement, inventory, pet, progression, timers, Catalog, Engine};
use growquest::metrics;

#[derive(Parser)]
#[command(name = "growquest")]
#[command(about = "Progression and simulation engine for a gamified learning platform")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Show store record counts and counters
    Status,
    /// Validate the catalog and print definition counts
    Catalog,
    /// Print everything the engine holds for one user
    Inspect {
        /// User id
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        return Ok(());
    }

    let config = match Config::load(&cli.config).await {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("{} (using defaults)", e);
            None
        }
    };
    init_logging(&config, cli.verbose);
    let config = config.unwrap_or_default();

    match cli.command {
        Commands::Init => {}
        Commands::Status => {
            let engine = Engine::from_config(&config).context("opening engine store")?;
            let counts = engine.store.counts();
            println!("Growquest v{}", env!("CARGO_PKG_VERSION"));
            println!("Data dir: {}", config.storage.data_dir);
            println!("  inventory rows:  {}", counts.inventory);
            println!("  timer records:   {}", counts.timers);
            println!("  pet records:     {}", counts.pets);
            println!("  zone progress:   {}", counts.progress);
            println!("  unlocks:         {}", counts.unlocks);
            println!("  submissions:     {}", counts.submissions);
            let snapshot = metrics::snapshot();
            println!(
                "Counters: events={} dropped={} unlocked={} check_failures={} pets_ran_away={}",
                snapshot.events_delivered,
                snapshot.deliveries_dropped,
                snapshot.achievements_unlocked,
                snapshot.achievement_check_failures,
                snapshot.pets_ran_away
            );
        }
        Commands::Catalog => {
            let catalog = match &config.storage.catalog_file {
                Some(path) => Catalog::load_json(path)
                    .with_context(|| format!("loading catalog {}", path))?,
                None => {
                    warn!("No catalog_file configured; using the starter catalog");
                    Catalog::starter()
                }
            };
            let counts = catalog.counts();
            println!("Catalog OK");
            println!("  seeds:        {}", counts.seeds);
            println!("  animals:      {}", counts.animals);
            println!("  chains:       {}", counts.chains);
            println!("  consumables:  {}", counts.consumables);
            println!("  tasks:        {}", counts.tasks);
            println!("  achievements: {}", counts.achievements);
        }
        Commands::Inspect { user } => {
            let engine = Engine::from_config(&config).context("opening engine store")?;
            inspect(&engine, &user)?;
        }
    }

    Ok(())
}

fn inspect(engine: &Engine, user: &str) -> Result<()> {
    let now = Utc::now();
    println!("User {} at {}", user, now.format("%Y-%m-%dT%H:%M:%SZ"));

    println!("Inventory:");
    for entry in inventory::list_inventory(engine, user)? {
        println!("  {:<16} {}", entry.item_id, entry.quantity);
    }

    println!("Plants:");
    for view in timers::list_plants(engine, user, now)? {
        println!(
            "  {}/{} {} {:?}",
            view.record.zone_id, view.record.slot_index, view.record.seed_item_id, view.readiness
        );
    }
    println!("Animals:");
    for view in timers::list_animals(engine, user, now)? {
        println!(
            "  {} happiness={} {:?}",
            view.record.animal_id, view.record.happiness, view.readiness
        );
    }
    println!("Production:");
    for view in timers::list_orders(engine, user, now)? {
        println!(
            "  {}/{} {} {:?}",
            view.record.zone_id, view.record.slot_index, view.record.chain_id, view.readiness
        );
    }

    match pet::pet_vitality(engine, user, now)? {
        Some(view) => println!(
            "Pet: {} the {} hunger={} thirst={} happiness={}{}",
            view.pet.name,
            view.pet.pet_type,
            view.vitality.hunger,
            view.vitality.thirst,
            view.vitality.happiness,
            if view.vitality.runs_away {
                " (about to run away)"
            } else {
                ""
            }
        ),
        None => println!("Pet: none"),
    }

    println!("Progress:");
    for zone in progression::list_progress(engine, user)? {
        println!(
            "  {:<12} level {} ({} xp, {} tasks)",
            zone.zone_id, zone.level, zone.experience, zone.tasks_completed
        );
    }
    println!("Achievements:");
    for unlocked in achievement::unlocked_achievements(engine, user)? {
        println!(
            "  {} ({})",
            unlocked.achievement.name,
            unlocked.unlocked_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity only ever raises the configured level
    let base_level = match verbosity {
        0 => configured,
        1 => configured.max(log::LevelFilter::Debug),
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
