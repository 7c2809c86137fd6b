//! CLI binary for geonarrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use geonarrator::audio::{CpalOutput, PlaybackEvent};
use geonarrator::config::AudioConfig;
use geonarrator::gateway::{GeminiConfig, GeminiGateway};
use geonarrator::presentation::{format_clock, stage_label};
use geonarrator::redact::RedactedString;
use geonarrator::{NarratorConfig, PlaybackController, RunOutcome, TourPipeline, TourResult};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// GeoNarrator: photograph a landmark, hear its story.
#[derive(Parser)]
#[command(name = "geonarrator", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Identify the landmark in a photo and narrate its history.
    Tour {
        /// JPEG or PNG photo of the landmark.
        image: PathBuf,

        /// Print the tour without playing the narration.
        #[arg(long)]
        no_audio: bool,

        /// Prebuilt narration voice, overriding the config file.
        #[arg(long)]
        voice: Option<String>,
    },

    /// List available audio output devices.
    Devices,

    /// Print the effective configuration.
    Config,
}

/// What the user chose after a tour ended.
enum Next {
    Reset,
    Quit,
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("geonarrator=info,reqwest=warn,hyper=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        NarratorConfig::from_file(path)?
    } else {
        NarratorConfig::load_or_default()?
    };

    match cli.command {
        Command::Tour {
            image,
            no_audio,
            voice,
        } => run_tour(config, image, no_audio, voice).await,
        Command::Devices => list_devices(),
        Command::Config => print_config(config),
    }
}

async fn run_tour(
    config: NarratorConfig,
    image: PathBuf,
    no_audio: bool,
    voice: Option<String>,
) -> anyhow::Result<()> {
    println!("GeoNarrator v{}", env!("CARGO_PKG_VERSION"));

    let api_key = config.gateway.resolve_api_key()?;
    let mut gemini = GeminiConfig::from_gateway_config(&config.gateway, api_key);
    if let Some(voice) = voice {
        gemini = gemini.with_voice(voice);
    }
    let gateway = GeminiGateway::new(gemini);
    let pipeline = TourPipeline::new(gateway, &config.audio);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut next_image = Some(image);
    while let Some(path) = next_image.take() {
        let next = match scan(&pipeline, &path).await? {
            RunOutcome::Completed(result) => {
                print_tour(&result);
                if no_audio {
                    Next::Quit
                } else {
                    narrate(&result, &config.audio, &mut lines).await?
                }
            }
            RunOutcome::Failed(message) => {
                println!("\nSYSTEM FAILURE: {message}");
                println!("[r] reboot system  [q] quit");
                match read_command(&mut lines).await?.as_deref() {
                    Some("r") => Next::Reset,
                    _ => Next::Quit,
                }
            }
            RunOutcome::Abandoned => Next::Quit,
        };

        if let Next::Reset = next {
            pipeline.reset();
            println!("\nPath to the next photo (blank to quit):");
            next_image = read_command(&mut lines)
                .await?
                .filter(|line| !line.is_empty())
                .map(PathBuf::from);
        }
    }

    info!("session ended");
    Ok(())
}

/// Run one tour while showing the current stage on a spinner.
async fn scan(
    pipeline: &TourPipeline<GeminiGateway>,
    path: &Path,
) -> anyhow::Result<RunOutcome> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut updates = pipeline.subscribe();
    let submit = pipeline.submit_file(path);
    tokio::pin!(submit);

    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome?,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut submit).await?;
                }
                let label = stage_label(updates.borrow_and_update().state);
                spinner.set_message(format!("{}: {}", label.title, label.detail));
            }
        }
    };

    spinner.finish_and_clear();
    Ok(outcome)
}

fn print_tour(result: &TourResult) {
    let landmark = result.landmark();
    let history = result.history();

    println!("\n== {} ==", landmark.name);
    println!("{}", landmark.short_description);
    println!("\n{}", history.text);

    if history.sources.is_empty() {
        println!("\nNo sources cited.");
    } else {
        println!("\nSources:");
        for (idx, source) in history.sources.iter().enumerate() {
            println!("  {}. {} <{}>", idx + 1, source.display_title(), source.uri);
        }
    }
    println!("\nNarration: {}", format_clock(result.audio().duration_secs()));
}

/// Play the narration until the user resets or quits.
async fn narrate(
    result: &TourResult,
    audio: &AudioConfig,
    lines: &mut StdinLines,
) -> anyhow::Result<Next> {
    let mut controller = PlaybackController::new(CpalOutput::new(audio));
    controller.load(Arc::clone(result.audio()));
    if let Err(err) = controller.play() {
        println!("audio unavailable: {}", err.message());
    }

    println!("[enter] play/pause  [r] new scan  [q] quit");
    let next = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break Next::Quit;
                };
                match line.trim() {
                    "" | "p" => {
                        if let Err(err) = controller.toggle() {
                            println!("audio unavailable: {}", err.message());
                            continue;
                        }
                        let status = if controller.is_playing() { "playing" } else { "paused" };
                        println!(
                            "{status} at {} / {}",
                            format_clock(controller.position()),
                            format_clock(controller.duration())
                        );
                    }
                    "r" => break Next::Reset,
                    "q" => break Next::Quit,
                    other => println!("unknown command '{other}'"),
                }
            }
            event = controller.next_event() => {
                match event {
                    Some((PlaybackEvent::Finished { .. }, true)) => {
                        println!("narration finished ([enter] to replay)");
                    }
                    Some((PlaybackEvent::Failed { message, .. }, true)) => {
                        println!("audio stopped: {message}");
                    }
                    _ => {}
                }
            }
        }
    };

    controller.close();
    Ok(next)
}

async fn read_command(lines: &mut StdinLines) -> anyhow::Result<Option<String>> {
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

fn list_devices() -> anyhow::Result<()> {
    println!("Output devices:");
    for name in CpalOutput::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

fn print_config(mut config: NarratorConfig) -> anyhow::Result<()> {
    if config.gateway.api_key.is_some() {
        config.gateway.api_key = Some(RedactedString::new("[REDACTED]"));
    }
    println!("# {}", NarratorConfig::default_config_path().display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
