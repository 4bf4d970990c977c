mod config;
mod image;
mod tcp;

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use emmcprg_core::{ChannelKind, ChannelProfile, Engine, Halt, Status, TransportError};
use tracing::{error, info, warn};

use config::SimConfig;
use image::ImageDevice;
use tcp::TcpChannel;

/// Pause between polls while the host is quiet.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChannelArg {
    Serial,
    Bulk,
}

impl From<ChannelArg> for ChannelKind {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Serial => ChannelKind::Serial,
            ChannelArg::Bulk => ChannelKind::Bulk,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "eMMC download protocol target simulator", long_about = None)]
struct Args {
    /// Simulator configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to accept the host tool on
    #[arg(long)]
    listen: Option<String>,

    /// Directory holding the card area images
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Channel behaviour to emulate
    #[arg(long, value_enum)]
    channel: Option<ChannelArg>,

    /// Serve a single session, then exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load_from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(dir) = args.image_dir {
        config.image_dir = dir;
    }
    if let Some(channel) = args.channel {
        config.channel = channel.into();
    }

    let listener = TcpListener::bind(&config.listen)
        .with_context(|| format!("Failed to listen on {}", config.listen))?;
    info!(
        listen = %config.listen,
        images = %config.image_dir.display(),
        channel = ?config.channel,
        "Waiting for host"
    );

    for stream in listener.incoming() {
        let stream = stream.context("Accept failed")?;
        match serve(stream, &config)? {
            Some(halt) => info!(reason = %halt, "Session ended"),
            None => info!("Host disconnected"),
        }
        if args.once {
            break;
        }
        info!("Target restarted, waiting for host");
    }
    Ok(())
}

/// Run one session on `stream`. Returns the halt reason, or `None` when
/// the host went away first.
fn serve(stream: TcpStream, config: &SimConfig) -> Result<Option<Halt>> {
    info!(peer = ?stream.peer_addr().ok(), "Host connected");
    let channel = TcpChannel::new(stream, ChannelProfile::for_kind(config.channel))?;
    let device = ImageDevice::open(&config.image_dir, config.user_sectors, config.boot_sectors)
        .with_context(|| format!("Failed to open images in {}", config.image_dir.display()))?;
    let mut engine = Engine::new(channel, device, config.engine.clone());

    loop {
        match engine.run_once() {
            Ok(Status::Idle) => std::thread::sleep(IDLE_SLEEP),
            Ok(Status::Processed(_)) => {}
            Ok(Status::Halted(halt)) => return Ok(Some(halt)),
            Err(TransportError::Disconnected) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "Channel failed");
                return Err(e.into());
            }
        }
    }
}
