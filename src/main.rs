use anyhow::{anyhow, Context, Result};
use clap::Parser;
use enrichr::cancel::CancellationToken;
use enrichr::config::{DecodePolicy, EnrichConfig, PROGRESS_INTERVAL};
use enrichr::pipeline::{self, RunSummary};
use enrichr::status::{format_count, StatusSink};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "enrichr")]
#[command(about = "Enrich a CSV table with records from a line-delimited JSON index")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// CSV table to enrich
    #[arg(short, long)]
    input: String,

    /// JSON-lines index file (.jsonl, or .jsonl.bz2)
    #[arg(short = 'x', long)]
    index: String,

    /// Name of the identifier column in the table
    #[arg(short, long)]
    column: String,

    /// Output path (defaults to <input>_enriched.<ext>)
    #[arg(short, long)]
    output: Option<String>,

    /// Report scan progress every N index lines
    #[arg(long, default_value_t = PROGRESS_INTERVAL)]
    progress_interval: u64,

    /// Enrich rows on a single thread
    #[arg(long)]
    sequential: bool,

    /// Abort on the first malformed index line instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

/// Renders the headline and detail channels as two stacked spinner lines.
struct ProgressStatus {
    _multi: MultiProgress,
    headline: ProgressBar,
    detail: ProgressBar,
}

impl ProgressStatus {
    fn new() -> Self {
        let multi = MultiProgress::new();
        let headline = multi.add(make_spinner("{spinner:.cyan} {msg}", "Ready"));
        let detail = multi.add(make_spinner("  {msg}", ""));
        Self {
            _multi: multi,
            headline,
            detail,
        }
    }

    fn finish(&self) {
        self.headline.finish();
        self.detail.finish();
    }
}

impl StatusSink for ProgressStatus {
    fn headline(&self, message: &str) {
        debug!(headline = message);
        self.headline.set_message(message.to_string());
    }

    fn detail(&self, message: &str) {
        debug!(detail = message);
        self.detail.set_message(message.to_string());
    }
}

fn make_spinner(template: &str, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", summary.elapsed_secs);
    println!();
    println!("Rows in table:      {}", format_count(summary.total_rows));
    println!("Rows with an ID:    {}", format_count(summary.non_empty_keys));
    println!("Rows without an ID: {}", format_count(summary.empty_keys));
    println!("Distinct IDs:       {}", format_count(summary.distinct_keys));
    println!("Index lines read:   {}", format_count(summary.scan.records_scanned));
    println!(
        "IDs matched:        {} / {}",
        format_count(summary.scan.matched),
        format_count(summary.scan.goal)
    );
    println!("Malformed lines:    {}", format_count(summary.scan.malformed_lines));
    println!("Duplicate hits:     {}", format_count(summary.scan.duplicate_hits));
    println!(
        "Rows enriched:      {}",
        format_count(summary.enrichment.rows_matched)
    );
    println!(
        "Rows not found:     {}",
        format_count(summary.enrichment.rows_unmatched)
    );
    if let Some(path) = &summary.output_path {
        println!("Output:             {}", path.display());
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = EnrichConfig::new(&cli.input, &cli.index, &cli.column)
        .with_progress_interval(cli.progress_interval)
        .with_parallel(!cli.sequential);
    if cli.strict {
        config = config.with_decode_policy(DecodePolicy::Halt);
    }
    if let Some(output) = &cli.output {
        config = config.with_output(output);
    }

    let status = Arc::new(ProgressStatus::new());
    let (tx, rx) = mpsc::channel();
    let worker = pipeline::spawn(
        config,
        status.clone() as Arc<dyn StatusSink>,
        CancellationToken::new(),
        move |result| {
            let _ = tx.send(result);
        },
    )?;

    let result = rx
        .recv()
        .context("Enrichment worker exited without reporting a result")?;
    worker
        .join()
        .map_err(|_| anyhow!("Enrichment worker panicked"))?;
    status.finish();

    let summary = result?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    match run(cli) {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
