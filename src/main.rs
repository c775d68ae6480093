use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cells::config::CellsConfig;
use cells::parcels::ParcelAllocator;
use cells::sample::sample_tiers;
use cells::watch::LevelsWatcher;
use cells::{CellService, Host};
use cells_blocks::BlockPalette;
use cells_edit::WorldEdits;
use cells_store::{
    CellLoader, CellRepository, CellStore, Clock, JsonFileRepository, MemoryRepository, PlayerId,
    SystemClock, TtlPolicy, lock_cell,
};
use cells_structures::{StructureLoader, TierTable};
use clap::{Parser, Subcommand};

const TICK: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "cells")]
#[command(about = "Upgradable player cells built tier by tier")]
struct Args {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "cells.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print size, layers and block totals of a structure file
    Inspect { file: PathBuf },
    /// Load and list the configured tier table
    Tiers,
    /// Claim and upgrade cells for synthetic players against in-memory storage
    Simulate {
        #[arg(long, default_value = "4")]
        players: u32,
        #[arg(long, default_value = "2")]
        upgrades: u32,
        /// Use this many generated tiers instead of the configured ones
        #[arg(long = "sample-tiers")]
        sample: Option<u32>,
    },
    /// Run the tick loop on file storage and reload tiers when the levels directory changes
    Watch {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },
}

fn load_config(path: &Path) -> Result<CellsConfig, Box<dyn Error>> {
    if path.exists() {
        Ok(CellsConfig::load(path)?)
    } else {
        log::warn!("config {:?} not found, using defaults", path);
        Ok(CellsConfig::default())
    }
}

fn inspect(file: &Path) -> Result<(), Box<dyn Error>> {
    let palette = Arc::new(BlockPalette::new());
    let loader = StructureLoader::new(Arc::clone(&palette));
    let s = loader.load(file)?;
    let size = s.size();
    println!("{}: {}x{}x{}", s.name(), size.x, size.y, size.z);
    println!(
        "  {} sections, {} placed positions",
        s.section_count(),
        s.block_count()
    );
    for (key, n) in s.block_counts(&palette) {
        println!("  {n:>8}  {key}");
    }
    Ok(())
}

fn print_tiers(tiers: &TierTable) {
    for t in tiers.iter() {
        let structure = t
            .structure
            .as_ref()
            .map(|s| format!("{} ({} sections)", s.name(), s.section_count()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "level {:>2}  cost {:>10.2}  spawn {}  zones {}  structure {}",
            t.level,
            t.cost,
            t.spawn,
            t.build_zones.len(),
            structure
        );
    }
}

fn simulate(
    cfg: &CellsConfig,
    players: u32,
    upgrades: u32,
    sample: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let palette = Arc::new(BlockPalette::new());
    let repo = Arc::new(MemoryRepository::new());
    let service = match sample {
        Some(levels) => {
            let tiers = sample_tiers(levels, 9, &palette)?;
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let store = Arc::new(CellStore::with_clock(
                repo.clone(),
                TtlPolicy::new(cfg.cache.ttl()),
                Arc::clone(&clock),
            ));
            let parcels = ParcelAllocator::new(&cfg.parcels, 0);
            CellService::new(cfg, tiers, store, parcels, StructureLoader::new(palette), clock)
        }
        None => CellService::from_config(cfg, repo.clone(), palette)?,
    };
    let mut host = Host::new(service, WorldEdits::default(), cfg.cache.sweep_ticks);

    let started = Instant::now();
    let owners: Vec<PlayerId> = (1..=players as u128).map(PlayerId).collect();
    for owner in &owners {
        host.service_mut().claim(*owner)?;
    }
    let mut ticks = host.run_until_idle(u64::MAX);
    for round in 0..upgrades {
        for owner in &owners {
            match host.service_mut().upgrade_next(*owner) {
                Ok(_) => {}
                Err(e) => log::info!("round {round}: {owner}: {e}"),
            }
        }
        ticks += host.run_until_idle(u64::MAX);
    }
    host.shutdown();

    for shared in host.service().top_cells(owners.len()) {
        let c = lock_cell(&shared);
        println!(
            "cell {:>3}  owner {}  level {}  origin {}  busy {}",
            c.id, c.owner, c.level, c.origin, c.busy
        );
    }
    let world = host.world().stats();
    let cache = host.service().store().stats();
    println!(
        "{ticks} ticks, {} block writes in {} chunks, {:.2?}",
        world.writes, world.chunk_entries, started.elapsed()
    );
    println!(
        "cache: {} hits, {} misses, {} saves; storage holds {} cells",
        cache.hits,
        cache.misses,
        cache.saves,
        repo.len()
    );
    Ok(())
}

fn watch(cfg: &CellsConfig, max_ticks: Option<u64>) -> Result<(), Box<dyn Error>> {
    let palette = Arc::new(BlockPalette::new());
    let repo: Arc<dyn CellRepository> = Arc::new(JsonFileRepository::open(&cfg.storage_dir)?);
    let service = CellService::from_config(cfg, repo, palette)?;
    let loader = CellLoader::new(Arc::clone(service.store()), cfg.cache.loader_threads)?;
    let mut host =
        Host::new(service, WorldEdits::default(), cfg.cache.sweep_ticks).with_loader(loader);
    let watcher = LevelsWatcher::new(&cfg.levels_dir)?;

    let mut next = Instant::now();
    while max_ticks.is_none_or(|m| host.ticks() < m) {
        if watcher.changed() {
            if let Err(e) = host.service_mut().reload_tiers() {
                log::error!("tier reload failed, keeping previous tiers: {e}");
            }
        }
        host.tick();
        next += TICK;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
    host.shutdown();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.command {
        Command::Inspect { file } => inspect(&file),
        Command::Tiers => {
            let cfg = load_config(&args.config)?;
            let loader = StructureLoader::new(Arc::new(BlockPalette::new()));
            let tiers = TierTable::load(&cfg.tiers, &cfg.levels_dir, &loader)?;
            print_tiers(&tiers);
            Ok(())
        }
        Command::Simulate {
            players,
            upgrades,
            sample,
        } => {
            let cfg = load_config(&args.config)?;
            simulate(&cfg, players, upgrades, sample)
        }
        Command::Watch { ticks } => {
            let cfg = load_config(&args.config)?;
            watch(&cfg, ticks)
        }
    }
}
