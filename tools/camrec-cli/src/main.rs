//! camrec CLI: headless control surface for the camera recorder.
//!
//! Usage:
//!   camrec run [OPTIONS]     View and record cameras, controlled from stdin
//!   camrec check             Validate the camera list and GStreamer setup
//!   camrec probe <URL>       Print a stream's native properties

use std::path::PathBuf;

use camrec_common::config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "camrec",
    about = "View and record several network cameras to MJPEG/AVI segments",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View and record cameras; reads `view`, `record`, `status`, `quit` from stdin
    Run {
        /// Camera list file
        #[arg(short, long, default_value = "video-recorder.json")]
        cameras: PathBuf,

        /// Output directory for segments (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not open display windows
        #[arg(long)]
        headless: bool,

        /// Cameras to start viewing (all cameras when omitted)
        #[arg(long = "view", value_name = "NAME")]
        view: Vec<String>,

        /// Cameras to start recording right away
        #[arg(long = "record", value_name = "NAME")]
        record: Vec<String>,
    },

    /// Check the camera list and required GStreamer elements
    Check {
        /// Camera list file
        #[arg(short, long, default_value = "video-recorder.json")]
        cameras: PathBuf,
    },

    /// Open a stream and print its native width, height and frame rate
    Probe {
        /// Stream URL, device path or file
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    camrec_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            cameras,
            output,
            headless,
            view,
            record,
        } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            if headless {
                config.display.enabled = false;
            }
            commands::run::run(config, cameras, view, record).await
        }
        Commands::Check { cameras } => commands::check::run(cameras),
        Commands::Probe { url } => commands::probe::run(&config, &url),
    }
}
