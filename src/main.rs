use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use subtitler::config::{Config, TranslationPolicy};
use subtitler::subtitle::parse_srt;
use subtitler::timecode::format_timecode;
use subtitler::{
    print_summary, CancelToken, JobOptions, JobRequest, JobSource, PipelineOrchestrator,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subtitler")]
#[command(version, about = "Translated subtitles for any video")]
#[command(
    long_about = "Transcribe the speech in a video, translate it, and write a UTF-8 SRT file. Optionally burn the subtitles into a new video."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to ~/.config/subtitler/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate translated subtitles for a video
    Run(RunArgs),

    /// Print the cues of an existing SRT file
    Inspect {
        /// Subtitle file
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Input video file
    input: PathBuf,

    /// Target language code (e.g., ar, fr, ja)
    #[arg(short, long, default_value = "ar")]
    to: String,

    /// Source language code, or "auto"
    #[arg(short, long)]
    from: Option<String>,

    /// Also burn the subtitles into a copy of the video
    #[arg(long)]
    burn: bool,

    /// Do not keep the .srt file (requires --burn)
    #[arg(long)]
    no_srt: bool,

    /// Directory for the finished files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Failed translations: keep-source or abort
    #[arg(long)]
    policy: Option<String>,

    /// Number of concurrent translation requests
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Hide progress bars
    #[arg(long)]
    quiet: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Config::load().context("Failed to load configuration"),
    }
}

fn inspect(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let track = parse_srt(&content).with_context(|| format!("Invalid SRT: {}", file.display()))?;

    for cue in &track.cues {
        println!(
            "{} {} --> {}",
            style(format!("#{}", cue.index)).bold(),
            format_timecode(cue.start),
            format_timecode(cue.end)
        );
        for line in cue.text.lines() {
            println!("    {}", line);
        }
    }
    println!();
    println!(
        "{} cue(s), BOM {}",
        track.len(),
        if content.starts_with('\u{FEFF}') {
            style("present").green()
        } else {
            style("missing").yellow()
        }
    );
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(ref from) = args.from {
        config.translator.source_language = from.clone();
    }
    if let Some(ref dir) = args.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(ref policy) = args.policy {
        config.translator.policy = policy
            .parse::<TranslationPolicy>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Some(concurrency) = args.concurrency {
        config.translator.concurrency = concurrency;
    }
    Ok(())
}

async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, &args)?;

    let options = JobOptions {
        produce_subtitle_file: !args.no_srt,
        produce_burned_video: args.burn,
    };

    info!("Input:    {}", args.input.display());
    info!("Language: {} -> {}", config.translator.source_language, args.to);
    info!("Output:   {}", config.output.dir.display());

    let orchestrator = PipelineOrchestrator::from_config(&config)
        .context("Failed to initialise the pipeline")?
        .with_progress(!args.quiet);

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling, cleaning up...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let request = JobRequest::new(JobSource::Path(args.input), args.to, options);
    match orchestrator.run_with_cancel(request, &token).await {
        Ok(output) => {
            print_summary(&output);
            Ok(())
        }
        Err(failure) => {
            error!("{}", failure);
            let detail = failure.detail();
            eprintln!("{} [{}] {}", style("✗").red(), detail.kind, detail.message);
            anyhow::bail!("job {} failed", detail.job_id)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args, cli.config.as_deref()).await,
        Command::Inspect { file } => inspect(&file),
    }
}
