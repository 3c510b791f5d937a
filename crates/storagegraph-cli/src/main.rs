//! storagegraph CLI
//!
//! - `ingest`: provider records (JSON / JSON lines dump) → paired Objects / Relationships streams
//! - `scan`: walk a local directory tree and ingest it the same way
//! - `name`: decode an output file name back into its run metadata
//! - `profiles`: list or show the built-in provider profiles

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use storagegraph_ingest::{
    load_records, local_provider, scan_local, IngestRun, LocalScanOptions, Pipeline,
    PipelineConfig, ProviderProfile, RunReport,
};
use storagegraph_model::{Provenance, ProviderKind, RunFileName};
use storagegraph_output::{RunTarget, RunWriter};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "storagegraph")]
#[command(
    author,
    version,
    about = "Normalize storage listings into a containment graph"
)]
struct Cli {
    /// Configuration file (defaults to ./storagegraph.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a records dump (`.json` array / listing page, or `.jsonl`).
    Ingest {
        /// Input records file
        input: PathBuf,
        /// Provider profile (posix, windows, google-drive, onedrive, dropbox)
        #[arg(short, long)]
        provider: String,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Scan a local directory tree and ingest it.
    Scan {
        /// Root directory to scan
        root: PathBuf,
        /// Maximum depth below the root
        #[arg(long)]
        max_depth: Option<usize>,
        /// Directory names to skip (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Stop after this many entries
        #[arg(long)]
        max_entries: Option<usize>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Decode an output file name into its run metadata.
    Name {
        /// File name or path
        file: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List built-in provider profiles, or show one as JSON.
    Profiles {
        /// Profile to show in full
        name: Option<String>,
    },
}

/// Run metadata and output options shared by `ingest` and `scan`.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Output directory
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
    /// File name prefix
    #[arg(long)]
    prefix: Option<String>,
    /// Platform label recorded in the file name
    #[arg(long)]
    platform: Option<String>,
    /// Machine identifier recorded in the file name
    #[arg(long)]
    machine: Option<String>,
    /// Storage description recorded in the file name
    #[arg(long)]
    storage: Option<String>,
    /// Ingester identifier (defaults to the profile's service id)
    #[arg(long)]
    ingester: Option<uuid::Uuid>,
    /// Build the graph and print the report without writing files
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Ingest {
            input,
            provider,
            run,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let kind = parse_provider(&provider)?;
            let records = load_records(&input)
                .with_context(|| format!("failed to load {}", input.display()))?;
            println!(
                "{} {} records from {}",
                "Ingesting".green().bold(),
                kind,
                input.display()
            );
            cmd_run(&config, kind, records, &run, None)
        }
        Commands::Scan {
            root,
            max_depth,
            exclude,
            max_entries,
            run,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let options = LocalScanOptions {
                max_depth,
                exclude_dir_names: exclude,
                max_entries,
            };
            println!("{} {}", "Scanning".green().bold(), root.display());
            let records = scan_local(&root, &options)
                .with_context(|| format!("failed to scan {}", root.display()))?;
            let storage = Some(root.display().to_string());
            cmd_run(&config, local_provider(), records, &run, storage)
        }
        Commands::Name { file, json } => cmd_name(&file, json),
        Commands::Profiles { name } => cmd_profiles(name.as_deref()),
    }
}

fn parse_provider(name: &str) -> Result<ProviderKind> {
    ProviderKind::parse(name).ok_or_else(|| {
        let known: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
        anyhow!("unknown provider `{name}` (expected one of: {})", known.join(", "))
    })
}

fn cmd_run(
    config: &Config,
    kind: ProviderKind,
    records: Vec<Value>,
    args: &RunArgs,
    default_storage: Option<String>,
) -> Result<()> {
    let version = config
        .provenance
        .version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let mut pipeline_config = PipelineConfig::for_provider(kind, version.clone());
    if let Some(ingester) = args.ingester.or(config.provenance.ingester) {
        pipeline_config = pipeline_config.with_provenance(Provenance::new(ingester, version));
    }

    let pipeline = Pipeline::new(pipeline_config)?;
    let run = pipeline.run(records, Utc::now())?;
    print_report(&run);

    if args.dry_run {
        println!("{} nothing written", "Dry run:".yellow().bold());
        return Ok(());
    }

    let target = RunTarget {
        platform: args
            .platform
            .clone()
            .or_else(|| config.run.platform.clone())
            .unwrap_or_else(|| std::env::consts::OS.to_string()),
        machine: args
            .machine
            .clone()
            .or_else(|| config.run.machine_id.clone())
            .unwrap_or_else(config::default_machine_id),
        storage: args
            .storage
            .clone()
            .or_else(|| config.run.storage.clone())
            .or(default_storage),
    };

    let out_dir = args
        .out_dir
        .clone()
        .or_else(|| config.output.dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut writer = RunWriter::new(out_dir).with_vocabulary(config.vocabulary());
    if let Some(prefix) = args.prefix.clone().or_else(|| config.output.prefix.clone()) {
        writer = writer.with_prefix(prefix);
    }

    let committed = writer.commit(&run, &target)?;
    println!("  {} {}", "→".cyan(), committed.objects_path.display());
    println!("  {} {}", "→".cyan(), committed.relationships_path.display());
    Ok(())
}

fn print_report(run: &IngestRun) {
    let RunReport {
        records_seen,
        objects_built,
        edges_built,
        skipped,
        duplicates,
        orphans,
        self_references,
        ambiguous,
        dropped_timestamps,
        skip_reasons,
    } = &run.report;

    println!("{}", "Run summary".bold());
    println!("  records seen     {records_seen}");
    println!("  objects          {}", objects_built.to_string().green());
    println!("  edges            {}", edges_built.to_string().green());
    let skipped_line = format!("{skipped}");
    println!(
        "  skipped          {}",
        if *skipped > 0 {
            skipped_line.yellow()
        } else {
            skipped_line.normal()
        }
    );
    for (field, count) in skip_reasons {
        println!("    missing {field:<8} {count}");
    }
    println!("  duplicates       {duplicates}");
    println!("  orphans          {orphans}");
    println!("  self references  {self_references}");
    println!("  ambiguous        {ambiguous}");
    println!("  bad timestamps   {dropped_timestamps}");
}

fn cmd_name(file: &std::path::Path, json: bool) -> Result<()> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no UTF-8 file name", file.display()))?;
    let decoded = RunFileName::decode(name).with_context(|| format!("cannot decode `{name}`"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decoded)?);
        return Ok(());
    }

    println!("{:<10} {}", "prefix".bold(), decoded.prefix);
    println!("{:<10} {}", "platform".bold(), decoded.platform);
    println!("{:<10} {}", "ingester".bold(), decoded.ingester);
    println!("{:<10} {}", "machine".bold(), decoded.machine);
    println!(
        "{:<10} {}",
        "storage".bold(),
        decoded.storage.as_deref().unwrap_or("-")
    );
    println!("{:<10} {}", "timestamp".bold(), decoded.timestamp.to_rfc3339());
    println!("{:<10} {}", "kind".bold(), decoded.kind.as_str());
    println!("{:<10} {}", "paired".bold(), decoded.paired().encode()?.dimmed());
    Ok(())
}

fn cmd_profiles(name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => {
            let kind = parse_provider(name)?;
            let profile = ProviderProfile::builtin(kind);
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        None => {
            for profile in ProviderProfile::builtins() {
                let strategy = match profile.containment {
                    storagegraph_ingest::ContainmentRule::PathKeyed { .. } => "path-keyed",
                    storagegraph_ingest::ContainmentRule::NativeIdKeyed { .. } => "native-id-keyed",
                };
                println!(
                    "{:<14} {:<16} {}",
                    profile.name.green().bold(),
                    strategy,
                    profile.service_id.to_string().dimmed()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_arguments() {
        let cli = Cli::try_parse_from([
            "storagegraph",
            "-v",
            "ingest",
            "dump.jsonl",
            "--provider",
            "onedrive",
            "--out-dir",
            "out",
            "--machine",
            "ws-17",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Ingest {
                input,
                provider,
                run,
            } => {
                assert_eq!(input, PathBuf::from("dump.jsonl"));
                assert_eq!(provider, "onedrive");
                assert_eq!(run.out_dir, Some(PathBuf::from("out")));
                assert_eq!(run.machine.as_deref(), Some("ws-17"));
                assert!(run.dry_run);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(parse_provider("icloud").is_err());
        assert_eq!(parse_provider("Google-Drive").unwrap(), ProviderKind::GoogleDrive);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&format!(
            "[run]\nplatform = \"FromFile\"\nmachine_id = \"m1\"\n[output]\ndir = {:?}\nprefix = \"cfg\"\n",
            dir.path().join("ignored")
        ))
        .unwrap();
        let args = RunArgs {
            out_dir: Some(dir.path().to_path_buf()),
            platform: Some("FromFlag".to_string()),
            ..Default::default()
        };
        let records = vec![serde_json::json!({
            "path_display": "/a.txt", ".tag": "file", "name": "a.txt", "size": 3,
        })];

        cmd_run(&config, ProviderKind::Dropbox, records, &args, None).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        for name in names {
            let decoded = RunFileName::decode(&name).unwrap();
            assert_eq!(decoded.prefix, "cfg");
            assert_eq!(decoded.platform, "FromFlag");
            assert_eq!(decoded.machine, "m1");
        }
    }
}
