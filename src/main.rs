//! sysinstall - Main entry point
//!
//! Headless front end for the installer core: loads a descriptor, then
//! validates, pre-checks, installs or prints it. Progress is rendered on
//! the main thread while the worker runs.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use sysinstall::cli::{Cli, Commands};
use sysinstall::controller::{Controller, DryRunBackend, InstallBackend, ScriptBackend};
use sysinstall::error::{InstallerError, first_line};
use sysinstall::progress::{
    ChannelClient, JsonLinesClient, LogClient, Orchestrator, ProgressClient, ProgressEvent,
};
use sysinstall::worker::{self, WorkerHandle};
use sysinstall::{SystemInstall, validate};

/// Initialize the logger; RUST_LOG overrides the default `info` level.
///
/// Logs go to stderr so JSON progress on stdout stays machine-readable.
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("Full error: {:?}", e);
            error!("{}", first_line(&format!("{:#}", e)));
            if let Some(InstallerError::Validation(errors)) = e.downcast_ref::<InstallerError>() {
                for violation in errors.violations() {
                    eprintln!("  - {}", violation);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let orchestrator = Orchestrator::new();

    match &cli.command {
        Commands::Validate { descriptor } => {
            let model = load(cli, descriptor)?;
            validate(&model).map_err(InstallerError::from)?;
            println!("✓ Descriptor is valid: {}", descriptor.display());
            Ok(())
        }
        Commands::Show { descriptor } => {
            let model = load(cli, descriptor)?;
            let text = if cli.json {
                serde_json::to_string_pretty(&model).context("Failed to serialize plan")?
            } else {
                model.to_yaml_string()?
            };
            println!("{}", text.trim_end());
            Ok(())
        }
        Commands::Precheck { descriptor, .. } => {
            let model = load(cli, descriptor)?;
            let controller = Controller::new(cli.install_options(), Box::new(DryRunBackend::new()))
                .with_aliases(cli.alias_registry());

            let (client, rx) = ChannelClient::channel();
            let session =
                orchestrator.begin_session(Box::new(client.with_loop_wait(cli.loop_wait())))?;
            let handle = controller.spawn_pre_check(session, model)?;

            drive(cli, handle, rx)?;
            info!("Pre-check passed");
            Ok(())
        }
        Commands::Install {
            descriptor,
            root,
            scripts_dir,
            ..
        } => {
            let model = load(cli, descriptor)?;
            let options = cli.install_options();
            if !options.confirm_destructive {
                anyhow::bail!(
                    "Install erases the target media; pass --yes to confirm or --dry-run to preview"
                );
            }

            let backend: Box<dyn InstallBackend> = match (cli.dry_run, scripts_dir) {
                (true, _) => Box::new(DryRunBackend::new()),
                (false, Some(dir)) => Box::new(ScriptBackend::new(dir)),
                (false, None) => anyhow::bail!("--scripts-dir is required unless --dry-run is given"),
            };
            let controller = Controller::new(options, backend).with_aliases(cli.alias_registry());

            let (client, rx) = ChannelClient::channel();
            let session =
                orchestrator.begin_session(Box::new(client.with_loop_wait(cli.loop_wait())))?;
            let root = root.clone();
            let handle = worker::spawn("install", session, move |s| {
                let mut controller = controller;
                controller.pre_check(s, &model)?;
                controller.install(s, &root, &model)
            })?;

            drive(cli, handle, rx)?;
            info!("Installation complete");
            Ok(())
        }
    }
}

fn load(cli: &Cli, descriptor: &Path) -> Result<SystemInstall> {
    info!("Loading descriptor {:?}", descriptor);
    let model = SystemInstall::load_file_with_aliases(descriptor, &cli.alias_registry())?;
    Ok(model)
}

/// Render forwarded events until the worker signals, then return its result.
fn drive(cli: &Cli, mut handle: WorkerHandle<()>, rx: Receiver<ProgressEvent>) -> Result<()> {
    let mut renderer: Box<dyn ProgressClient> = if cli.json {
        Box::new(JsonLinesClient::new(io::stdout()))
    } else {
        Box::new(LogClient::new())
    };
    let tick = cli.loop_wait().min(Duration::from_millis(50));

    loop {
        for event in rx.try_iter() {
            event.dispatch(renderer.as_mut());
        }
        if let Some(success) = handle.try_outcome() {
            debug!("Worker signaled success={}", success);
            break;
        }
        thread::sleep(tick);
    }
    for event in rx.try_iter() {
        event.dispatch(renderer.as_mut());
    }
    io::stdout().flush().ok();

    handle.join()?;
    Ok(())
}
