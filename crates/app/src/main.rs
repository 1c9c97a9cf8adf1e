use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use daggerwalk_core::{
    config::parse_seconds, execute, AppConfig, Catalog, CategoryFilter, Clock, DebouncedWriter,
    Directive, FileStorage, GameDate, LocationType, ManualClock, Player, PlayerSample,
    SimulatedPlayer, SongCommand, TelemetryLogger, TelemetrySnapshot, TrackScheduler,
    WeatherConditions,
};
use tracing_subscriber::EnvFilter;

fn main() -> daggerwalk_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulation(args),
        Commands::Catalog { catalog, categories } => run_catalog(catalog.as_ref(), &categories),
    }
}

fn run_simulation(args: SimulateArgs) -> daggerwalk_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(output) = &args.output {
        config.writer.output_path = output.display().to_string();
    }
    let catalog = load_catalog(args.catalog.as_ref())?;

    tracing::info!(
        ticks = args.ticks,
        output = %config.writer.output_path,
        "starting simulation"
    );

    let clock = ManualClock::new();
    let mut scheduler = match args.seed {
        Some(seed) => {
            TrackScheduler::with_seed(catalog, clock.clone(), config.scheduler.clone(), seed)
        }
        None => TrackScheduler::new(catalog, clock.clone(), config.scheduler.clone()),
    };
    let mut player = SimulatedPlayer::new(clock.clone(), args.track_secs);

    let writer = DebouncedWriter::with_flush_timeout(
        FileStorage::new(&config.writer.output_path),
        config.writer.flush_timeout(),
    );
    let mut logger = TelemetryLogger::new(writer, &config.telemetry);
    logger.on_world_initialized();
    logger.on_save_loaded();

    let commands = if args.commands.is_empty() {
        vec!["song shuffle".to_string()]
    } else {
        args.commands.clone()
    };
    for line in &commands {
        let command = SongCommand::parse_line(line)?;
        let outcome = execute(&mut scheduler, &command)?;
        println!("{}", outcome.reply);
        if outcome.directive != Directive::Idle {
            player.apply(outcome.directive);
        }
    }

    let step = args.tick_secs.max(Duration::from_millis(1));
    for tick in 0..args.ticks {
        clock.advance(step);
        if let Directive::Play(track) = scheduler.tick_with(&mut player) {
            println!("[{:>8.1}s] now playing {track}", clock.now().as_secs_f32());
        }

        let current = scheduler.current();
        logger.poll(clock.now(), || {
            TelemetrySnapshot::capture_now(&demo_sample(tick), current)
        })?;
    }

    logger.shutdown();
    let stats = logger.writer().stats();
    tracing::info!(
        writes = stats.writes,
        failures = stats.failures,
        coalesced = stats.coalesced,
        status = ?scheduler.status(),
        "simulation finished"
    );
    Ok(())
}

fn run_catalog(path: Option<&PathBuf>, categories: &[String]) -> daggerwalk_core::Result<()> {
    let catalog = load_catalog(path)?;
    let filter = CategoryFilter::parse(categories)?;

    for track in catalog.pool(&filter) {
        if let Some(category) = catalog.category_of(track) {
            println!("{track:>4}  {category}");
        }
    }
    Ok(())
}

fn load_catalog(path: Option<&PathBuf>) -> daggerwalk_core::Result<Catalog> {
    match path {
        Some(path) => Catalog::from_json_file(path),
        None => Ok(Catalog::daggerfall()),
    }
}

/// A walker heading east along the Iliac Bay coast.
fn demo_sample(tick: u32) -> PlayerSample {
    let step = i32::try_from(tick).unwrap_or(i32::MAX);
    PlayerSample {
        name: Some("Daggerwalker".to_string()),
        race: Some("Breton".to_string()),
        class: Some("Spellsword".to_string()),
        world_x: 106_000_i32.saturating_add(step.saturating_mul(8)),
        world_z: 104_000,
        map_pixel: (207 + step / 4_096, 213),
        region: "Daggerfall".to_string(),
        location: None,
        location_type: LocationType::Wilderness,
        position: [step as f32 * 0.25, 0.0, 0.0],
        date: GameDate {
            day_name: "Morndas".to_string(),
            day_of_month: 1,
            month_name: "Last Seed".to_string(),
            year: 405,
            time: "12:00".to_string(),
        },
        weather: WeatherConditions {
            daytime: true,
            ..WeatherConditions::default()
        },
        health: 100,
        max_health: 100,
        fatigue: 120,
        magicka: 60,
        gold: 350,
        level: 5,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Daggerwalk music scheduler and telemetry tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the scheduler against a simulated player and persist telemetry.
    Simulate(SimulateArgs),
    /// List the tracks a category filter would shuffle over.
    Catalog {
        /// JSON catalog to load instead of the built-in song table.
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Category names (world, dungeon, battle, misc, off, all).
        categories: Vec<String>,
    },
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// JSON catalog to load instead of the built-in song table.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Where to write the telemetry snapshot; overrides the config file.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Console commands to run before the first tick, e.g. "song shuffle world".
    #[arg(long = "command")]
    commands: Vec<String>,
    /// Seed for reproducible shuffles.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 3_600)]
    ticks: u32,
    /// Simulated seconds per tick.
    #[arg(long, default_value = "1.0", value_parser = parse_secs_arg)]
    tick_secs: Duration,
    /// Length of every simulated track in seconds.
    #[arg(long, default_value = "180.0", value_parser = parse_secs_arg)]
    track_secs: Duration,
}

fn parse_secs_arg(raw: &str) -> Result<Duration, String> {
    let secs: f32 = raw.parse().map_err(|err| format!("{err}"))?;
    parse_seconds("seconds", secs).map_err(|err| err.to_string())
}
