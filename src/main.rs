use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ivr_tutor::services::{OpenAiSpeech, SpeechService};
use ivr_tutor::{Config, Gateway, Language};

/// IVR Tutor - spoken science answers over the phone
#[derive(Parser)]
#[command(name = "ivr-tutor", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "IVR_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "IVR_PORT")]
    port: Option<u16>,

    /// Public base URL the telephony provider reaches us on
    #[arg(long, env = "IVR_PUBLIC_BASE_URL")]
    base_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the IVR webhook server (default)
    Serve,
    /// Print the effective configuration with secrets masked
    ShowConfig,
    /// Synthesize text and write the audio to a file
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Language to speak in
        #[arg(short, long, default_value = "english")]
        language: Language,
        /// Output file
        #[arg(short, long, default_value = "tts-test.mp3")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,ivr_tutor=info",
        1 => "info,ivr_tutor=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.server.public_base_url = base_url.trim_end_matches('/').to_string();
    }
    config.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Command::TestTts {
            text,
            language,
            out,
        } => test_tts(&config, &text, language, &out).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "starting ivr tutor"
    );
    tracing::debug!(?config, "loaded configuration");

    let gateway = Gateway::new(config)?;
    gateway.run().await?;

    Ok(())
}

fn show_config(config: &Config) {
    for (name, value) in config.summary() {
        println!("{name:>24}: {value}");
    }
}

/// Test TTS output
async fn test_tts(
    config: &Config,
    text: &str,
    language: Language,
    out: &std::path::Path,
) -> anyhow::Result<()> {
    println!("Synthesizing ({language}): \"{text}\"");

    let speech = OpenAiSpeech::new(&config.speech)?;
    let audio = speech.synthesize(text, language).await?;
    std::fs::write(out, &audio)?;

    println!("Wrote {} bytes to {}", audio.len(), out.display());
    Ok(())
}
