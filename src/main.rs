//! termimg
//!
//! Image overlay daemon for X11 terminals. Finds the terminal window that
//! hosts a given process, then shows and clears images over it on request
//! from `termimg-client`.

mod config;
mod control;
mod overlay;
mod process;
mod reactor;
mod signals;
mod terminal;
mod x11;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, ConfigSource, LoggingConfig};
use control::ControlChannel;
use overlay::OverlayController;
use overlay::decode::FileLoader;
use process::ProcFs;
use process::pty::PtyResolver;
use reactor::{Flow, Reactor, StopHandle};
use signals::SignalSource;
use terminal::{TerminalInfo, TerminalResolver};
use x11::XDisplay;
use x11::overlay::{OverlayWindow, X11Surface};

const DEFAULT_LOG_FILTER: &str = "termimg=info,warn";

#[derive(Parser)]
#[command(name = "termimg")]
#[command(about = "Show images over the terminal window running a process", long_about = None)]
struct Cli {
    /// Process inside the terminal, usually the shell's own pid
    pid: u32,

    /// Config file (defaults to ~/.config/termimg/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Everything the reactor handlers touch
struct Daemon {
    display: XDisplay,
    terminal: TerminalInfo,
    window: OverlayWindow,
    controller: OverlayController<FileLoader>,
    stop: StopHandle,
}

impl Daemon {
    fn handle_message(&mut self, bytes: &[u8]) -> Result<()> {
        let mut surface = X11Surface::new(&self.display, &self.terminal, &self.window);
        let flow = self.controller.handle_message(&mut surface, bytes)?;
        if flow == Flow::Stop {
            self.stop.stop();
        }
        // Replies read above may have queued events the socket no longer signals
        self.handle_x_events()
    }

    fn handle_x_events(&mut self) -> Result<()> {
        if self.display.drain_events(self.terminal.window())? == Flow::Stop {
            self.stop.stop();
        }
        Ok(())
    }

    fn shutdown(mut self) -> Result<()> {
        debug!("Overlay at exit: {:?}", self.controller.state());
        let mut surface = X11Surface::new(&self.display, &self.terminal, &self.window);
        self.controller.shutdown(&mut surface)?;
        self.window.destroy(&self.display)?;
        Ok(())
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging);

    match &source {
        ConfigSource::File(path) => info!("Configuration loaded from {:?}", path),
        ConfigSource::Defaults(path) => info!("Config file not found at {:?}, using defaults", path),
    }
    debug!("Config: {:?}", config);

    info!("Starting termimg for process {}", cli.pid);

    // Before anything else so no signal slips past the signalfd
    let mut signals = SignalSource::install()?;

    let display = XDisplay::connect()?;
    let processes = ProcFs::new();
    let ptys = PtyResolver::new(&config.resolver.pts_dir);
    let terminal = TerminalResolver::new(
        &processes,
        &display,
        &ptys,
        display.atoms().application_markers(),
    )
    .resolve(cli.pid)
    .context("Failed to find the terminal")?;

    let window = OverlayWindow::create(&display, terminal.window(), &config.overlay)?;
    display.watch(terminal.window())?;

    let mut reactor = Reactor::<Daemon>::new()?;

    reactor.register(signals.fd(), move |daemon: &mut Daemon| {
        for signal in signals.drain()? {
            info!("Received {}, shutting down", signal);
            daemon.stop.stop();
        }
        Ok(())
    })?;
    reactor.register(display.fd(), |daemon: &mut Daemon| daemon.handle_x_events())?;

    let mut channel = ControlChannel::bind(config.socket_path())?;
    channel.on_message(|daemon: &mut Daemon, bytes: &[u8]| daemon.handle_message(bytes));
    channel.attach(&mut reactor)?;

    let mut daemon = Daemon {
        display,
        terminal,
        window,
        controller: OverlayController::new(FileLoader, config.overlay.filter.into()),
        stop: reactor.stop_handle(),
    };

    let result = reactor.run(&mut daemon);
    if let Err(e) = &result {
        warn!("Event loop failed: {:#}", e);
    }

    daemon.shutdown()?;
    // Closes and unlinks the control socket
    drop(reactor);

    info!("termimg stopped");
    result
}
