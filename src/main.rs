//! cog-explorer: terminal front-end for the COG band-processing backend.
//!
//! Without a subcommand an interactive shell is started. Subcommands run a
//! single action, print the result and exit non-zero if it failed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use cog_explorer::config::{self, Settings};
use cog_explorer::{Explorer, HttpBackend, Shell, logging};

#[derive(Parser, Debug)]
#[command(name = "cog-explorer", version, about = "Satellite band explorer")]
struct Args {
    /// Backend base URL (overrides the config file and COG_EXPLORER_BACKEND)
    #[arg(short, long)]
    backend_url: Option<String>,

    /// Config file (default: ~/.config/cog-explorer/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available bands
    Bands,
    /// Convert a band and show it
    Show {
        band: String,
        /// Write the image to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Ratio of two bands
    Ratio {
        numerator: String,
        denominator: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Difference of two bands
    Difference {
        band1: String,
        band2: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// RGB composite of three bands
    Rgb {
        red: String,
        green: String,
        blue: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Statistics of a band
    Stats { band: String },
}

impl Command {
    /// The shell commands equivalent to this one-shot command.
    fn script(&self) -> Vec<String> {
        let (mut lines, out) = match self {
            Command::Bands => (vec!["bands".to_string()], None),
            Command::Show { band, out } => (vec![format!("select {band}"), "show".into()], out.as_ref()),
            Command::Ratio {
                numerator,
                denominator,
                out,
            } => (
                vec![format!("ratio {numerator} {denominator}"), "show".into()],
                out.as_ref(),
            ),
            Command::Difference { band1, band2, out } => (
                vec![format!("difference {band1} {band2}"), "show".into()],
                out.as_ref(),
            ),
            Command::Rgb {
                red,
                green,
                blue,
                out,
            } => (
                vec![format!("rgb {red} {green} {blue}"), "show".into()],
                out.as_ref(),
            ),
            Command::Stats { band } => (vec![format!("select {band}"), "stats".into()], None),
        };
        if let Some(path) = out {
            lines.push(format!("save {}", path.display()));
        }
        lines
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init();

    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let mut settings = Settings::load(&config_path)?;
    settings.apply_env();
    settings.override_base_url(args.backend_url.clone());
    if let Some(secs) = args.timeout_secs {
        settings.backend.timeout_secs = secs;
    }
    info!(base_url = %settings.backend.base_url, "starting cog-explorer");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let failed = runtime.block_on(async {
        let backend = HttpBackend::new(&settings.backend.base_url, settings.request_timeout())?;
        let explorer = Explorer::start(backend, settings.notification_ttl());
        // Image fetches may take as long as one request.
        let mut shell = Shell::new(explorer, settings.request_timeout() + Duration::from_secs(1));

        match &args.command {
            None => {
                shell.run().await?;
                anyhow::Ok(false)
            }
            Some(command) => {
                shell.mount().await;
                print_output(&mut shell);
                for line in command.script() {
                    shell.execute(&line).await;
                    print_output(&mut shell);
                }
                Ok(shell.error_count() > 0)
            }
        }
    })?;

    runtime.shutdown_timeout(Duration::from_secs(1));

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_output(shell: &mut Shell<HttpBackend>) {
    for (line, kind) in shell.take_output() {
        match kind {
            cog_explorer::OutputKind::Error => eprintln!("{line}"),
            _ => println!("{line}"),
        }
    }
}
