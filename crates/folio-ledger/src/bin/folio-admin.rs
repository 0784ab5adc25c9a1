//! # folio-admin
//!
//! Back-office tool for the fiscal ledger.
//!
//! ## Usage
//! ```text
//! folio-admin [--config <path>] [--db <path>] <command>
//!
//! Commands:
//!   init                     Migrate the store, seed [[series]] and [fiscal]
//!   series                   List series and their positions
//!   verify <type> <series>   Integrity scan of one series
//!   stats [--json]           All-time statistics
//! ```
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=folio::alert=error` - Alerts only
//! - Default: `info,folio=debug,sqlx=warn`

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use folio_core::{DocumentType, SeriesKey, StatsPeriod};
use folio_ledger::{FolioService, LedgerConfig, LedgerResult};

const ADMIN_ACTOR: &str = "folio-admin";

const USAGE: &str = "usage: folio-admin [--config <path>] [--db <path>] <init|series|verify <type> <series>|stats [--json]>";

enum Command {
    Init,
    Series,
    Verify(SeriesKey),
    Stats { json: bool },
}

struct Args {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(code = e.code(), error = %e, "folio-admin failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> LedgerResult<ExitCode> {
    let mut config = LedgerConfig::load(args.config)?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let service = FolioService::open(&config).await?;

    match args.command {
        Command::Init => init(&service, &config).await,
        Command::Series => list_series(&service).await,
        Command::Verify(key) => verify(&service, &key).await,
        Command::Stats { json } => stats(&service, json).await,
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn init(service: &FolioService, config: &LedgerConfig) -> LedgerResult<ExitCode> {
    for definition in &config.series {
        let key = definition.key();
        if service.get_series(&key).await?.is_some() {
            info!(series = %key, "Series already configured, leaving it alone");
            continue;
        }
        service.configure_series(definition, ADMIN_ACTOR).await?;
    }

    let fiscal = service.database().fiscal_config();
    for (key, value) in &config.fiscal {
        fiscal.set(key, value).await?;
    }

    info!(
        series = config.series.len(),
        fiscal_entries = config.fiscal.len(),
        path = %config.database_path.display(),
        "Store initialized"
    );
    Ok(ExitCode::SUCCESS)
}

async fn list_series(service: &FolioService) -> LedgerResult<ExitCode> {
    for counter in service.list_series().await? {
        println!(
            "{:<12} {:<8} next={:<10} max={:<10} remaining={:<10} {}",
            counter.document_type,
            counter.series,
            counter.current_value,
            counter.max_value,
            counter.remaining(),
            if counter.active { "active" } else { "inactive" }
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn verify(service: &FolioService, key: &SeriesKey) -> LedgerResult<ExitCode> {
    let report = service.verify_integrity(key).await?;

    println!("series:           {key}");
    println!("checked:          {}", report.checked);
    if let (Some(first), Some(last)) = (report.first_number, report.last_number) {
        println!("range:            {first}..={last}");
    }
    println!("gaps:             {:?}", report.gaps);
    println!("reconciled gaps:  {:?}", report.reconciled_gaps);
    println!("hash mismatches:  {:?}", report.hash_mismatches);

    if !report.hash_mismatches.is_empty() {
        return Ok(ExitCode::from(3));
    }
    if !report.unreconciled_gaps().is_empty() {
        warn!(series = %key, "Unreconciled gaps present");
        return Ok(ExitCode::from(4));
    }
    Ok(ExitCode::SUCCESS)
}

async fn stats(service: &FolioService, json: bool) -> LedgerResult<ExitCode> {
    let stats = service.get_statistics(StatsPeriod::all_time()).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&stats)?;
        println!("{rendered}");
        return Ok(ExitCode::SUCCESS);
    }

    for document_type in DocumentType::ALL {
        println!(
            "{:<12} issued={:<8} annulled={:<8} emitted_gross={}",
            document_type,
            stats.issued_by_type.get(&document_type).copied().unwrap_or(0),
            stats.annulled_by_type.get(&document_type).copied().unwrap_or(0),
            stats
                .emitted_gross_by_type
                .get(&document_type)
                .copied()
                .unwrap_or_default(),
        );
    }
    for position in &stats.current_numbers {
        println!(
            "{}/{} next={} max={}",
            position.document_type, position.series, position.current, position.max
        );
    }
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// Setup
// =============================================================================

fn parse_args(raw: Vec<String>) -> Result<Args, String> {
    let mut config = None;
    let mut db = None;
    let mut rest = Vec::new();

    let mut iter = raw.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(iter.next().ok_or("--config needs a path")?)),
            "--db" => db = Some(PathBuf::from(iter.next().ok_or("--db needs a path")?)),
            "-h" | "--help" => return Err("folio-admin: fiscal ledger administration".to_string()),
            _ => rest.push(arg),
        }
    }

    let command = match rest.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["init"] => Command::Init,
        ["series"] => Command::Series,
        ["verify", document_type, series] => {
            let document_type = document_type
                .parse::<DocumentType>()
                .map_err(|e| e.to_string())?;
            Command::Verify(SeriesKey::new(document_type, *series))
        }
        ["stats"] => Command::Stats { json: false },
        ["stats", "--json"] => Command::Stats { json: true },
        [] => return Err("missing command".to_string()),
        other => return Err(format!("unknown command: {}", other.join(" "))),
    };

    Ok(Args {
        config,
        db,
        command,
    })
}

/// Initializes the tracing subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,folio=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
