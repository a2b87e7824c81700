//! Pre-check and install orchestration
//!
//! [`Controller`] drives the two long-running procedures. Each reports every
//! step through the [`ProgressSession`] it is given and returns one terminal
//! result; the concrete operations are [`Action`]s for the configured
//! [`InstallBackend`].
//!
//! # Install Flow
//!
//! ```text
//! confirm_destructive?
//!     ↓
//! Validating installation plan
//!     ↓
//! Preparing <disk>            (one step per target medium, destructive)
//!     ↓
//! Mounting root filesystem
//!     ↓
//! Installing bundles          (one partial per bundle)
//!     ↓
//! Configuring hostname, keyboard, language, timezone,
//! network, users, kernel arguments, telemetry
//!     ↓
//! Finalizing installation
//! ```

pub mod backend;

use crate::error::{InstallerError, Result};
use crate::hardware::{HostProbe, SystemProbe};
use crate::model::SystemInstall;
use crate::progress::ProgressSession;
use crate::storage::AliasRegistry;
use crate::validation::validate;
use crate::worker::{self, WorkerHandle};
use std::path::{Path, PathBuf};

pub use backend::{Action, DryRunBackend, InstallBackend, ScriptBackend};

/// Run-time switches for pre-check and install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Record actions instead of running them; skip the privilege check
    pub dry_run: bool,
    /// Do not require network connectivity
    pub offline: bool,
    /// The user accepted that target media will be erased
    pub confirm_destructive: bool,
    /// Accept BIOS firmware
    pub allow_legacy_boot: bool,
}

/// Drives pre-check and install for one plan.
pub struct Controller {
    options: InstallOptions,
    probe: Box<dyn HostProbe>,
    aliases: AliasRegistry,
    backend: Box<dyn InstallBackend>,
}

impl Controller {
    /// Controller probing the live host and running actions on `backend`.
    pub fn new(options: InstallOptions, backend: Box<dyn InstallBackend>) -> Self {
        Self {
            options,
            probe: Box::new(SystemProbe::new()),
            aliases: AliasRegistry::new(),
            backend,
        }
    }

    /// Replace the host probe.
    pub fn with_probe(mut self, probe: Box<dyn HostProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Accept these alias device files as present.
    pub fn with_aliases(mut self, aliases: AliasRegistry) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Check that the plan and the host are ready for an install.
    pub fn pre_check(&self, session: &mut ProgressSession, model: &SystemInstall) -> Result<()> {
        tracing::info!("Starting pre-check");

        session.run_step("Validating installation plan", |_| {
            validate(model).map_err(InstallerError::from)
        })?;

        if self.options.dry_run {
            tracing::info!("Dry run: skipping privilege check");
        } else {
            session.run_step("Checking privileges", |_| {
                if self.probe.is_privileged() {
                    Ok(())
                } else {
                    Err(InstallerError::worker("The installer must run as root"))
                }
            })?;
        }

        session.run_step("Checking firmware", |_| {
            let firmware = self.probe.firmware_mode();
            tracing::info!("Firmware mode: {}", firmware);
            if firmware.is_uefi() || self.options.allow_legacy_boot {
                Ok(())
            } else {
                Err(InstallerError::worker(
                    "UEFI firmware required\nBoot the installer in UEFI mode or allow legacy boot",
                ))
            }
        })?;

        session.run_step("Checking target media", |_| self.check_target_media(model))?;

        if self.options.offline {
            tracing::info!("Offline mode: skipping network check");
        } else {
            let probe = self.probe.as_ref();
            let state = session.pulse_while("Checking network connectivity", || {
                let state = probe.network_state();
                if state.is_online() {
                    Ok(state)
                } else {
                    Err(InstallerError::worker(
                        "Network is unreachable\nConfigure a network connection or run offline",
                    ))
                }
            })?;
            tracing::info!("Network: {}", state);
        }

        tracing::info!("Pre-check passed");
        Ok(())
    }

    fn check_target_media(&self, model: &SystemInstall) -> Result<()> {
        for disk in model.target_media() {
            let file = disk.device_file();
            if self.aliases.is_available(&file) {
                continue;
            }
            if self.options.dry_run {
                tracing::warn!("Target media {:?} not present (dry run)", file);
                continue;
            }
            return Err(InstallerError::worker(format!(
                "Target media {} not found",
                file.display()
            )));
        }
        Ok(())
    }

    /// Install the plan onto its target media, mounted under `root_dir`.
    pub fn install(
        &mut self,
        session: &mut ProgressSession,
        root_dir: &Path,
        model: &SystemInstall,
    ) -> Result<()> {
        if !self.options.confirm_destructive {
            return Err(InstallerError::state(
                "Refusing to modify target media without confirmation",
            ));
        }
        tracing::info!("Starting install into {:?}", root_dir);

        session.run_step("Validating installation plan", |_| {
            validate(model).map_err(InstallerError::from)
        })?;

        for disk in model.target_media() {
            let action = Action::PrepareMedia {
                name: disk.name.clone(),
                device: disk.device_file(),
            };
            self.step(session, root_dir, format!("Preparing {}", disk.name), action)?;
        }

        let root = model
            .target_media()
            .iter()
            .flat_map(|d| d.walk())
            .find(|d| d.is_root())
            .ok_or_else(|| InstallerError::worker("No root partition defined"))?;
        let action = Action::MountRoot {
            device: root.device_file(),
        };
        self.step(session, root_dir, "Mounting root filesystem", action)?;

        self.install_bundles(session, root_dir, model)?;
        self.configure(session, root_dir, model)?;

        self.step(session, root_dir, "Finalizing installation", Action::Finalize)?;
        tracing::info!("Install finished");
        Ok(())
    }

    fn install_bundles(
        &mut self,
        session: &mut ProgressSession,
        root_dir: &Path,
        model: &SystemInstall,
    ) -> Result<()> {
        let mut bundles: Vec<&str> = Vec::new();
        if let Some(kernel) = model.kernel() {
            bundles.push(kernel);
        }
        for bundle in model.all_bundles() {
            if !bundles.contains(&bundle) {
                bundles.push(bundle);
            }
        }
        if bundles.is_empty() {
            return Ok(());
        }

        let backend = &mut self.backend;
        let total = bundles.len() as u64;
        session.run_step("Installing bundles", |s| {
            for (done, bundle) in bundles.iter().enumerate() {
                backend.run(
                    root_dir,
                    &Action::InstallBundle {
                        bundle: bundle.to_string(),
                    },
                )?;
                s.partial(total, done as u64 + 1)?;
            }
            Ok(())
        })
    }

    fn configure(
        &mut self,
        session: &mut ProgressSession,
        root_dir: &Path,
        model: &SystemInstall,
    ) -> Result<()> {
        if let Some(hostname) = model.hostname() {
            let action = Action::SetHostname(hostname.to_string());
            self.step(session, root_dir, "Configuring hostname", action)?;
        }
        if let Some(keyboard) = model.keyboard() {
            let action = Action::SetKeyboard(keyboard.to_string());
            self.step(session, root_dir, "Configuring keyboard", action)?;
        }
        if let Some(language) = model.language() {
            let action = Action::SetLanguage(language.to_string());
            self.step(session, root_dir, "Configuring language", action)?;
        }
        if let Some(timezone) = model.timezone() {
            let action = Action::SetTimezone(timezone.to_string());
            self.step(session, root_dir, "Configuring timezone", action)?;
        }

        let actions: Vec<Action> = model
            .network_interfaces()
            .iter()
            .cloned()
            .map(Action::ConfigureNetwork)
            .collect();
        self.batch(session, root_dir, "Configuring network", actions)?;

        let actions: Vec<Action> = model
            .users()
            .iter()
            .cloned()
            .map(Action::CreateUser)
            .collect();
        self.batch(session, root_dir, "Creating user accounts", actions)?;

        if let Some(args) = model.kernel_arguments() {
            if !args.add().is_empty() || !args.remove().is_empty() {
                let action = Action::KernelArguments {
                    add: args.add().to_vec(),
                    remove: args.remove().to_vec(),
                };
                self.step(session, root_dir, "Configuring kernel arguments", action)?;
            }
        }

        let action = Action::Telemetry {
            enabled: model.is_telemetry_enabled(),
        };
        self.step(session, root_dir, "Configuring telemetry", action)
    }

    /// One action as one reported step.
    fn step(
        &mut self,
        session: &mut ProgressSession,
        root_dir: &Path,
        text: impl Into<String>,
        action: Action,
    ) -> Result<()> {
        let backend = &mut self.backend;
        session.run_step(text, |_| backend.run(root_dir, &action))
    }

    /// Several actions as one step with partial progress; nothing when empty.
    fn batch(
        &mut self,
        session: &mut ProgressSession,
        root_dir: &Path,
        text: &str,
        actions: Vec<Action>,
    ) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let backend = &mut self.backend;
        let total = actions.len() as u64;
        session.run_step(text, |s| {
            for (done, action) in actions.iter().enumerate() {
                backend.run(root_dir, action)?;
                s.partial(total, done as u64 + 1)?;
            }
            Ok(())
        })
    }

    /// Run [`Controller::pre_check`] on a worker thread.
    pub fn spawn_pre_check(
        self,
        session: ProgressSession,
        model: SystemInstall,
    ) -> Result<WorkerHandle<()>> {
        worker::spawn("pre-check", session, move |s| self.pre_check(s, &model))
    }

    /// Run [`Controller::install`] on a worker thread.
    pub fn spawn_install(
        mut self,
        session: ProgressSession,
        root_dir: PathBuf,
        model: SystemInstall,
    ) -> Result<WorkerHandle<()>> {
        worker::spawn("install", session, move |s| {
            self.install(s, &root_dir, &model)
        })
    }
}
