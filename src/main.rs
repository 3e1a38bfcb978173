//! Command line entry point for evidence-dl

use anyhow::{Context, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;
use evidence_dl::{BatchSummary, Config, Credential, EvidenceDownloader, Event, TestCaseId};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

const COMPLETION_BANNER: &str = "------Downloading Evidence Completed for all TCs------";

/// Download test-run evidence for a batch of test cases
#[derive(Parser, Debug)]
#[command(name = "evidence-dl", version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated test case ids (prompted for when omitted)
    #[arg(short, long)]
    test_cases: Option<String>,

    /// Bearer token (prompted for when omitted)
    #[arg(long, env = "EVIDENCE_DL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Maximum number of runs processed at once
    #[arg(short, long)]
    workers: Option<usize>,

    /// Root folder for downloaded evidence
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Folder for execution and test case logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Base URL of the REST API
    #[arg(long)]
    api_url: Option<String>,

    /// Base URL attachments are served from
    #[arg(long)]
    attachment_url: Option<String>,

    /// Only runs started after this instant (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long, value_parser = parse_cutoff)]
    cutoff: Option<NaiveDateTime>,

    /// Verify the service's TLS certificates
    #[arg(long)]
    verify_tls: bool,
}

fn parse_cutoff(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    if let Ok(instant) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(instant);
    }
    if let Ok(instant) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(instant);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::default()))
        .map_err(|_| format!("expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS, got {value:?}"))
}

/// Progress display on stderr, hidden when stderr is not a terminal
fn progress_display() -> MultiProgress {
    if std::io::stderr().is_terminal() {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }
}

/// `tracing` writer that clears the progress bars while a line is printed
#[derive(Clone)]
struct ProgressAwareWriter<W> {
    multi: MultiProgress,
    make_sink: fn() -> W,
}

struct SuspendedLine<W> {
    multi: MultiProgress,
    sink: W,
}

impl<W: Write> Write for SuspendedLine<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let sink = &mut self.sink;
        self.multi.suspend(|| sink.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }
}

impl<'a, W: Write + 'a> MakeWriter<'a> for ProgressAwareWriter<W> {
    type Writer = SuspendedLine<W>;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedLine {
            multi: self.multi.clone(),
            sink: (self.make_sink)(),
        }
    }
}

fn init_tracing(multi: &MultiProgress) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(ProgressAwareWriter {
            multi: multi.clone(),
            make_sink: std::io::stderr,
        })
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(workers) = cli.workers {
        config.max_workers = workers;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = dir.clone();
    }
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(url) = &cli.attachment_url {
        config.attachment_base_url = url.clone();
    }
    if let Some(cutoff) = cli.cutoff {
        config.cutoff = cutoff;
    }
    if cli.verify_tls {
        config.accept_invalid_certs = false;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Token from the flag or environment, else the prompt, else the configured default
fn read_credential(cli: &Cli, config: &Config) -> anyhow::Result<Credential> {
    if let Some(token) = &cli.token {
        let credential = Credential::new(token.as_str());
        if !credential.is_empty() {
            return Ok(credential);
        }
    }

    if std::io::stdin().is_terminal() {
        let entered = rpassword::prompt_password("Enter Bearer Token (leave empty to use the default): ")
            .context("failed to read token from the terminal")?;
        let credential = Credential::new(entered);
        if !credential.is_empty() {
            return Ok(credential);
        }
    }

    match config.default_token.as_deref().map(Credential::new) {
        Some(credential) if !credential.is_empty() => Ok(credential),
        _ => bail!("no token supplied; use --token, EVIDENCE_DL_TOKEN or default_token in the config file"),
    }
}

fn read_test_cases(cli: &Cli) -> anyhow::Result<Vec<TestCaseId>> {
    let raw = match &cli.test_cases {
        Some(raw) => raw.clone(),
        None => {
            print!("Enter comma-separated Test Case IDs: ");
            std::io::stdout().flush().context("failed to write prompt")?;
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read test case ids")?;
            line
        }
    };

    let ids = TestCaseId::parse_list(&raw);
    if ids.is_empty() {
        bail!("no test case ids given");
    }
    Ok(ids)
}

fn bar_style(total_bytes: u64) -> ProgressStyle {
    let template = if total_bytes > 0 {
        "{msg:40!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})"
    } else {
        "{spinner:.green} {msg:40!} {bytes} ({bytes_per_sec})"
    };
    ProgressStyle::with_template(template)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Render per-file progress bars until the batch completes
async fn render_progress(multi: MultiProgress, mut events: tokio::sync::broadcast::Receiver<Event>) {
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress display lagged behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            Event::DownloadStarted {
                run_key,
                file_name,
                total_bytes,
                ..
            } => {
                let bar = multi.add(ProgressBar::new(total_bytes));
                bar.set_style(bar_style(total_bytes));
                bar.set_message(format!("{run_key}/{file_name}"));
                bars.insert(format!("{run_key}/{file_name}"), bar);
            }
            Event::DownloadProgress {
                run_key,
                file_name,
                downloaded_bytes,
                ..
            } => {
                if let Some(bar) = bars.get(&format!("{run_key}/{file_name}")) {
                    bar.set_position(downloaded_bytes);
                }
            }
            Event::DownloadFinished {
                run_key, outcome, ..
            } => {
                let Some(file_name) = outcome.resolved_file_name.as_deref() else {
                    continue;
                };
                if let Some(bar) = bars.remove(&format!("{run_key}/{file_name}")) {
                    bar.finish_and_clear();
                }
            }
            Event::BatchCompleted { .. } => break,
            _ => {}
        }
    }

    for bar in bars.into_values() {
        bar.abandon();
    }
}

async fn run(cli: Cli, multi: MultiProgress) -> anyhow::Result<BatchSummary> {
    let config = load_config(&cli)?;
    let credential = read_credential(&cli, &config)?;
    let test_cases = read_test_cases(&cli)?;

    let downloader =
        EvidenceDownloader::new(config, &credential).context("failed to start downloader")?;
    let progress = tokio::spawn(render_progress(multi, downloader.subscribe()));

    let summary = downloader.run(&test_cases).await;

    if let Err(e) = progress.await {
        tracing::warn!(error = %e, "progress display stopped unexpectedly");
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let multi = progress_display();
    init_tracing(&multi);
    let cli = Cli::parse();

    match run(cli, multi).await {
        Ok(summary) => {
            println!("{COMPLETION_BANNER}");
            println!("{summary}");
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
