// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use clap::error::ErrorKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use epgcast_core::{ExitCode, MachineError, ENV_EPGCAST_LOG_LEVEL};
use epgcast_ingest::{
    parse_feed, partition_feed, run_pipeline, IngestError, IngestErrorCode, OrphanPolicy,
    PipelineOptions, PipelineResult, DEFAULT_COMPRESSION_LEVEL,
};
use epgcast_store::{
    write_atomic, IndexPublisher, PublishLayout, StoreError, StoreErrorCode, DEFAULT_PUBLIC_PREFIX,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode as ProcessExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "epgcast", version)]
#[command(about = "Partition an XMLTV feed into per-channel daily artifacts and publish an index")]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a local feed file into a data root.
    Publish {
        #[arg(long)]
        feed: PathBuf,
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value = DEFAULT_PUBLIC_PREFIX)]
        prefix: String,
        #[arg(long, value_enum, default_value_t = OrphansCli::Synthesize)]
        orphans: OrphansCli,
        #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
        gzip_level: u32,
    },
    /// Download a feed, keep a raw copy in the data root and publish it.
    Fetch {
        #[arg(long)]
        url: String,
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value = DEFAULT_PUBLIC_PREFIX)]
        prefix: String,
        #[arg(long, default_value = "feed.xml")]
        cache_file: PathBuf,
        #[arg(long, default_value_t = 60_000)]
        timeout_ms: u64,
        #[arg(long, value_enum, default_value_t = OrphansCli::Synthesize)]
        orphans: OrphansCli,
    },
    /// Show the currently published index of a data root.
    Status {
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value = DEFAULT_PUBLIC_PREFIX)]
        prefix: String,
    },
    /// Parse and partition a feed without writing anything.
    Inspect {
        #[arg(long)]
        feed: PathBuf,
        #[arg(long, value_enum, default_value_t = OrphansCli::Synthesize)]
        orphans: OrphansCli,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrphansCli {
    Synthesize,
    Skip,
}

impl From<OrphansCli> for OrphanPolicy {
    fn from(value: OrphansCli) -> Self {
        match value {
            OrphansCli::Synthesize => Self::Synthesize,
            OrphansCli::Skip => Self::Skip,
        }
    }
}

struct CliError {
    exit: ExitCode,
    error: MachineError,
}

impl CliError {
    fn new(exit: ExitCode, code: &str, message: impl AsRef<str>) -> Self {
        Self {
            exit,
            error: MachineError::new(code, message.as_ref()),
        }
    }
}

impl From<IngestError> for CliError {
    fn from(err: IngestError) -> Self {
        let exit = match err.code {
            IngestErrorCode::Parse => ExitCode::Validation,
            IngestErrorCode::Io => ExitCode::Failure,
            _ => ExitCode::Internal,
        };
        let mut error = MachineError::new(err.code.as_str(), &err.message);
        for (key, value) in &err.details {
            error = error.with_detail(key, value);
        }
        Self { exit, error }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let exit = match err.code {
            StoreErrorCode::Validation => ExitCode::Validation,
            _ => ExitCode::Failure,
        };
        Self::new(exit, err.code.as_str(), err.message)
    }
}

struct Output {
    message: String,
    data: Value,
    summary: Vec<String>,
}

fn main() -> ProcessExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = err.print();
                return ProcessExitCode::from(ExitCode::Success as u8);
            }
            let machine = MachineError::new("usage_error", err.to_string().trim());
            eprintln!("{}", serde_json::to_string(&machine).unwrap_or_else(|_| machine.to_string()));
            return ProcessExitCode::from(ExitCode::Usage as u8);
        }
    };
    init_logging(cli.verbose);

    let json_output = cli.json;
    match run(cli.command) {
        Ok(output) => {
            if json_output {
                let envelope = json!({"code": 0, "message": output.message, "data": output.data});
                println!("{envelope}");
            } else {
                println!("{}", output.message);
                for line in output.summary {
                    println!("  {line}");
                }
            }
            ProcessExitCode::from(ExitCode::Success as u8)
        }
        Err(err) => {
            if json_output {
                let envelope = json!({"code": 1, "message": err.error.to_string(), "data": {"error": err.error}});
                eprintln!("{envelope}");
            } else {
                eprintln!("error: {}", err.error);
                for (key, value) in &err.error.details {
                    eprintln!("  {key}: {value}");
                }
            }
            ProcessExitCode::from(err.exit as u8)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(ENV_EPGCAST_LOG_LEVEL).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(command: Commands) -> Result<Output, CliError> {
    match command {
        Commands::Publish {
            feed,
            root,
            prefix,
            orphans,
            gzip_level,
        } => {
            let bytes = fs::read(&feed).map_err(|e| {
                CliError::new(ExitCode::Failure, "io_error", format!("read {}: {e}", feed.display()))
            })?;
            let options = PipelineOptions {
                layout: PublishLayout::new(root, prefix),
                orphan_policy: orphans.into(),
                compression_level: gzip_level,
            };
            Ok(published_output(run_pipeline(&bytes, &options)?))
        }
        Commands::Fetch {
            url,
            root,
            prefix,
            cache_file,
            timeout_ms,
            orphans,
        } => {
            let bytes = download(&url, Duration::from_millis(timeout_ms))?;
            info!(url = %url, bytes = bytes.len(), "feed downloaded");
            fs::create_dir_all(&root).map_err(|e| {
                CliError::new(ExitCode::Failure, "io_error", format!("create {}: {e}", root.display()))
            })?;
            let cache = if cache_file.is_absolute() {
                cache_file
            } else {
                root.join(cache_file)
            };
            write_atomic(&cache, &bytes)?;
            let options = PipelineOptions {
                layout: PublishLayout::new(root, prefix),
                orphan_policy: orphans.into(),
                compression_level: DEFAULT_COMPRESSION_LEVEL,
            };
            Ok(published_output(run_pipeline(&bytes, &options)?))
        }
        Commands::Status { root, prefix } => status(&root, prefix),
        Commands::Inspect { feed, orphans } => inspect(&feed, orphans.into()),
    }
}

fn download(url: &str, timeout: Duration) -> Result<Vec<u8>, CliError> {
    let fetch_error = |message: String| CliError::new(ExitCode::DependencyFailure, "fetch_error", message);
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_error(format!("http client: {e}")))?;
    let resp = client
        .get(url)
        .send()
        .map_err(|e| fetch_error(format!("download failed url={url}: {e}")))?;
    if !resp.status().is_success() {
        return Err(fetch_error(format!(
            "download failed status={} url={url}",
            resp.status()
        )));
    }
    let body = resp
        .bytes()
        .map_err(|e| fetch_error(format!("read body failed url={url}: {e}")))?;
    if body.is_empty() {
        return Err(fetch_error(format!("empty feed body url={url}")));
    }
    Ok(body.to_vec())
}

fn published_output(result: PipelineResult) -> Output {
    let message = if result.changed() { "ok" } else { "no change" };
    let summary = vec![
        format!("checksum: {}", result.checksum()),
        format!("index_file: {}", result.index_file()),
        format!(
            "artifacts: {} written, {} unchanged, {} pruned",
            result.artifacts_written, result.artifacts_reused, result.pruned.artifacts
        ),
        format!(
            "programmes: {} across {} channels",
            result.programmes, result.channels
        ),
    ];
    let data = json!({
        "checksum": result.checksum(),
        "index_file": result.index_file(),
        "changed": result.changed(),
        "dates": result.index.date_count(),
        "artifacts_written": result.artifacts_written,
        "artifacts_reused": result.artifacts_reused,
        "pruned_artifacts": result.pruned.artifacts,
        "skipped_orphans": result.skipped_orphans,
        "synthesized_channels": result.synthesized_channels.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "duplicate_channels": result.duplicate_channels,
    });
    Output {
        message: message.to_string(),
        data,
        summary,
    }
}

fn status(root: &Path, prefix: String) -> Result<Output, CliError> {
    let layout = PublishLayout::new(root, prefix);
    let publisher = IndexPublisher::new(&layout);
    let current = publisher.current()?.ok_or_else(|| {
        CliError::new(
            ExitCode::Failure,
            "not_found",
            format!("nothing published under {}", root.display()),
        )
    })?;
    let index = publisher.load_current()?.unwrap_or_default();
    let dates: Vec<&str> = index.dates().collect();
    Ok(Output {
        message: "ok".to_string(),
        summary: vec![
            format!("checksum: {}", current.checksum),
            format!("index_file: {}", current.index_file),
            format!("dates: {}", dates.join(", ")),
            format!("artifacts: {}", index.artifact_count()),
        ],
        data: json!({
            "checksum": current.checksum,
            "index_file": current.index_file,
            "dates": dates,
            "artifacts": index.artifact_count(),
        }),
    })
}

fn inspect(feed: &Path, policy: OrphanPolicy) -> Result<Output, CliError> {
    let bytes = fs::read(feed).map_err(|e| {
        CliError::new(ExitCode::Failure, "io_error", format!("read {}: {e}", feed.display()))
    })?;
    let parsed = parse_feed(&bytes)?;
    let (channels, programmes, duplicates) = (
        parsed.channels.len(),
        parsed.programmes.len(),
        parsed.duplicate_channels,
    );
    let plan = partition_feed(parsed, policy);

    let mut per_date: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for partition in &plan.partitions {
        let entry = per_date.entry(partition.key.date_string()).or_default();
        entry.0 += 1;
        entry.1 += partition.programmes.len();
    }
    let summary = per_date
        .iter()
        .map(|(date, (c, p))| format!("{date}: {c} channels, {p} programmes"))
        .collect();
    let dates: BTreeMap<&String, Value> = per_date
        .iter()
        .map(|(date, (c, p))| (date, json!({"channels": c, "programmes": p})))
        .collect();
    Ok(Output {
        message: format!(
            "{} partitions from {programmes} programmes on {channels} channels",
            plan.partitions.len()
        ),
        summary,
        data: json!({
            "channels": channels,
            "programmes": programmes,
            "duplicate_channels": duplicates,
            "partitions": plan.partitions.len(),
            "skipped_orphans": plan.skipped_orphans,
            "orphan_policy": policy.as_str(),
            "dates": dates,
        }),
    })
}
