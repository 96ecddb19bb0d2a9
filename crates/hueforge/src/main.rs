use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use hueforge::hub::DryRun;
use hueforge::hub::HttpHub;
use hueforge::HubClient;
use hueforge::SyncError;
use hueforge::Synchronizer;
use hueforge_config::Diagnostics;
use hueforge_config::RoomConfig;
use hueforge_config::Settings;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Compile room files into Hue bridge rules and apply them.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Bridge address, API key and logging settings
    #[arg(long, default_value = "settings.toml")]
    settings: PathBuf,

    /// Log every write instead of sending it to the bridge
    #[arg(long)]
    dry_run: bool,

    /// Room files, configured in the given order
    #[arg(required = true)]
    rooms: Vec<PathBuf>,
}

/// Print warnings of a loaded file and pass the value on.
fn load<T>(result: Result<(T, Diagnostics), Diagnostics>) -> Result<T, Diagnostics> {
    let (value, warnings) = result?;
    if !warnings.0.is_empty() {
        eprint!("{}", warnings);
    }
    Ok(value)
}

fn init_logging(settings: &Settings) {
    let logging = &settings.logging;
    let filter = Targets::new()
        .with_default(LevelFilter::from(logging.level))
        .with_targets(
            logging
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
        );
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

/// Configure every room, then report what else lives on the bridge.
///
/// A room that fails is logged and skipped; returns whether all succeeded.
fn run<H: HubClient>(hub: H, settings: &Settings, rooms: &[RoomConfig]) -> anyhow::Result<bool> {
    let mut sync =
        Synchronizer::connect(hub, settings).context("failed to read bridge state")?;

    let mut ok = true;
    for room in rooms {
        match sync.configure(&room.blocks, &room.label) {
            Ok(report) => println!("{}", report),
            Err(SyncError::Remote {
                kind,
                name,
                source,
                report,
            }) => {
                tracing::error!(label = %room.label, %kind, %name, error = %source, "room aborted");
                println!("{} (aborted at {} '{}')", report, kind, name);
                ok = false;
            }
            Err(err) => {
                tracing::error!(label = %room.label, error = %err, "room skipped");
                ok = false;
            }
        }
    }

    sync.refresh().context("failed to re-read bridge state")?;
    let warnings = sync.find_foreign_data(&settings.other_keys);
    for warning in &warnings {
        println!("{}", warning);
    }
    tracing::info!(rooms = rooms.len(), warnings = warnings.len(), "done");
    Ok(ok)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match load(Settings::from_file(&args.settings)) {
        Ok(settings) => settings,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings);

    let mut rooms = Vec::new();
    let mut failed = false;
    for path in &args.rooms {
        match load(RoomConfig::from_file(path)) {
            Ok(room) => rooms.push(room),
            Err(diagnostics) => {
                eprint!("{}", diagnostics);
                failed = true;
            }
        }
    }
    if failed {
        return ExitCode::FAILURE;
    }

    let result = HttpHub::new(&settings.bridge, &settings.api_key)
        .context("failed to set up bridge client")
        .and_then(|hub| {
            if args.dry_run {
                run(DryRun::new(hub), &settings, &rooms)
            } else {
                run(hub, &settings, &rooms)
            }
        });
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
