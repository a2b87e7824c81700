//! Install backends
//!
//! The orchestrator never touches disks or packages itself. Every concrete
//! operation is an [`Action`] handed to an [`InstallBackend`]:
//!
//! - [`DryRunBackend`] logs and records the actions, changing nothing
//! - [`ScriptBackend`] runs one hook script per action,
//!   `<scripts_dir>/<action>.sh`, with typed CLI arguments and environment

use crate::error::{InstallerError, Result};
use crate::model::{NetworkInterface, User};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// One concrete installation operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Partition and format a target medium (destructive)
    PrepareMedia { name: String, device: PathBuf },
    /// Mount the root partition and everything below it under the target root
    MountRoot { device: PathBuf },
    InstallBundle { bundle: String },
    SetHostname(String),
    SetKeyboard(String),
    SetLanguage(String),
    SetTimezone(String),
    ConfigureNetwork(NetworkInterface),
    CreateUser(User),
    KernelArguments { add: Vec<String>, remove: Vec<String> },
    Telemetry { enabled: bool },
    Finalize,
}

impl Action {
    /// Hook script basename, without the `.sh` extension.
    pub fn script_name(&self) -> &'static str {
        match self {
            Action::PrepareMedia { .. } => "prepare-media",
            Action::MountRoot { .. } => "mount-root",
            Action::InstallBundle { .. } => "install-bundle",
            Action::SetHostname(_) => "set-hostname",
            Action::SetKeyboard(_) => "set-keyboard",
            Action::SetLanguage(_) => "set-language",
            Action::SetTimezone(_) => "set-timezone",
            Action::ConfigureNetwork(_) => "configure-network",
            Action::CreateUser(_) => "create-user",
            Action::KernelArguments { .. } => "kernel-arguments",
            Action::Telemetry { .. } => "telemetry",
            Action::Finalize => "finalize",
        }
    }

    /// Arguments exactly as the hook script parses them.
    pub fn to_cli_args(&self) -> Vec<String> {
        match self {
            Action::PrepareMedia { name, device } => vec![
                "--device".to_string(),
                device.display().to_string(),
                "--name".to_string(),
                name.clone(),
            ],
            Action::MountRoot { device } => {
                vec!["--device".to_string(), device.display().to_string()]
            }
            Action::InstallBundle { bundle } => vec!["--bundle".to_string(), bundle.clone()],
            Action::SetHostname(value)
            | Action::SetKeyboard(value)
            | Action::SetLanguage(value)
            | Action::SetTimezone(value) => vec!["--value".to_string(), value.clone()],
            Action::ConfigureNetwork(iface) => {
                let mut args = vec!["--interface".to_string(), iface.name.clone()];
                if iface.dhcp {
                    args.push("--dhcp".to_string());
                }
                for addr in &iface.addrs {
                    args.push("--address".to_string());
                    args.push(format!("{}/{}", addr.ip, addr.netmask));
                }
                if let Some(gateway) = &iface.gateway {
                    args.push("--gateway".to_string());
                    args.push(gateway.clone());
                }
                if let Some(dns) = &iface.dns {
                    args.push("--dns".to_string());
                    args.push(dns.clone());
                }
                args
            }
            Action::CreateUser(user) => {
                let mut args = vec!["--login".to_string(), user.login.clone()];
                if let Some(name) = &user.full_name {
                    args.push("--full-name".to_string());
                    args.push(name.clone());
                }
                if user.admin {
                    args.push("--admin".to_string());
                }
                args
            }
            Action::KernelArguments { add, remove } => {
                let mut args = Vec::new();
                for arg in add {
                    args.push("--add".to_string());
                    args.push(arg.clone());
                }
                for arg in remove {
                    args.push("--remove".to_string());
                    args.push(arg.clone());
                }
                args
            }
            Action::Telemetry { enabled } => {
                vec![if *enabled { "--enable" } else { "--disable" }.to_string()]
            }
            Action::Finalize => Vec::new(),
        }
    }

    /// Environment the hook script requires besides `SYSINSTALL_ROOT`.
    ///
    /// Secrets travel here rather than on the command line.
    pub fn get_env_vars(&self) -> Vec<(String, String)> {
        match self {
            Action::PrepareMedia { .. } => {
                vec![("CONFIRM_WIPE_DISK".to_string(), "yes".to_string())]
            }
            Action::CreateUser(user) => {
                let mut env = Vec::new();
                if let Some(hash) = &user.password {
                    env.push(("USER_PASSWORD_HASH".to_string(), hash.clone()));
                }
                if !user.ssh_keys.is_empty() {
                    env.push(("USER_SSH_KEYS".to_string(), user.ssh_keys.join("\n")));
                }
                env
            }
            _ => Vec::new(),
        }
    }

    /// True for actions that destroy data on a target medium.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Action::PrepareMedia { .. })
    }
}

/// Opaque executor of installation actions.
pub trait InstallBackend: Send {
    /// Carry out `action` against the target rooted at `root_dir`.
    fn run(&mut self, root_dir: &Path, action: &Action) -> Result<()>;
}

/// Records what would run without touching the host; clones share the record.
#[derive(Debug, Default, Clone)]
pub struct DryRunBackend {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions seen so far, in order.
    pub fn actions(&self) -> Vec<Action> {
        match self.actions.lock() {
            Ok(actions) => actions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl InstallBackend for DryRunBackend {
    fn run(&mut self, root_dir: &Path, action: &Action) -> Result<()> {
        tracing::info!(
            "[dry-run] {} {:?} (root {:?})",
            action.script_name(),
            action.to_cli_args(),
            root_dir
        );
        self.actions
            .lock()
            .map_err(|_| InstallerError::state("dry-run action log poisoned"))?
            .push(action.clone());
        Ok(())
    }
}

/// Runs `<scripts_dir>/<action>.sh` through bash for every action.
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    scripts_dir: PathBuf,
}

/// Captured result of one hook script
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    /// None if terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ScriptOutput {
    /// Error out on a non-zero exit, with the script's stderr on later lines.
    pub fn ensure_success(&self, context: &str) -> anyhow::Result<()> {
        if self.success {
            return Ok(());
        }
        let code = self.exit_code.unwrap_or(-1);
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            anyhow::bail!("{} failed (exit code {})", context, code)
        }
        anyhow::bail!("{} failed (exit code {})\n{}", context, code, stderr)
    }
}

impl ScriptBackend {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn script_path(&self, action: &Action) -> PathBuf {
        self.scripts_dir.join(format!("{}.sh", action.script_name()))
    }

    fn execute(&self, root_dir: &Path, action: &Action) -> anyhow::Result<ScriptOutput> {
        let script_path = self.script_path(action);
        if !script_path.is_file() {
            anyhow::bail!("Hook script {:?} not found", script_path);
        }

        let cli_args = action.to_cli_args();
        let env_vars = action.get_env_vars();
        tracing::info!(
            "Running {:?} args={:?} env={:?}",
            script_path,
            cli_args,
            env_vars.iter().map(|(k, _)| k).collect::<Vec<_>>()
        );

        let mut cmd = Command::new("bash");
        cmd.arg(&script_path)
            .args(&cli_args)
            .env("SYSINSTALL_ROOT", root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &env_vars {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to spawn hook script {:?}", script_path))?;

        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }
}

impl InstallBackend for ScriptBackend {
    fn run(&mut self, root_dir: &Path, action: &Action) -> Result<()> {
        self.execute(root_dir, action)
            .and_then(|output| {
                if !output.stdout.trim().is_empty() {
                    tracing::debug!("{}: {}", action.script_name(), output.stdout.trim());
                }
                output.ensure_success(action.script_name())
            })
            .map_err(|e| InstallerError::worker(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(format!("{}.sh", name)), body).unwrap();
    }

    #[test]
    fn test_prepare_media_contract() {
        let action = Action::PrepareMedia {
            name: "sda".to_string(),
            device: PathBuf::from("/dev/sda"),
        };
        assert_eq!(action.script_name(), "prepare-media");
        assert_eq!(action.to_cli_args(), ["--device", "/dev/sda", "--name", "sda"]);
        assert_eq!(
            action.get_env_vars(),
            [("CONFIRM_WIPE_DISK".to_string(), "yes".to_string())]
        );
        assert!(action.is_destructive());
    }

    #[test]
    fn test_user_password_stays_off_command_line() {
        let user = User::new("alice")
            .with_admin(true)
            .with_password_hash("$6$salt$hash");
        let action = Action::CreateUser(user);

        let args = action.to_cli_args();
        assert_eq!(args, ["--login", "alice", "--admin"]);
        assert!(!args.iter().any(|a| a.contains("$6$")));
        assert_eq!(action.get_env_vars()[0].0, "USER_PASSWORD_HASH");
    }

    #[test]
    fn test_dry_run_records() {
        let mut backend = DryRunBackend::new();
        backend
            .run(Path::new("/mnt"), &Action::SetHostname("box".into()))
            .unwrap();
        backend.run(Path::new("/mnt"), &Action::Finalize).unwrap();
        assert_eq!(backend.actions().len(), 2);
    }

    #[test]
    fn test_script_backend_runs_hook() {
        let scripts = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        write_script(
            scripts.path(),
            "set-hostname",
            "[ \"$1\" = --value ] && echo \"$2\" > \"$SYSINSTALL_ROOT/hostname\"\n",
        );

        let mut backend = ScriptBackend::new(scripts.path());
        backend
            .run(root.path(), &Action::SetHostname("clr-box".into()))
            .unwrap();

        let written = fs::read_to_string(root.path().join("hostname")).unwrap();
        assert_eq!(written.trim(), "clr-box");
    }

    #[test]
    fn test_script_failure_summary_first() {
        let scripts = TempDir::new().unwrap();
        write_script(scripts.path(), "finalize", "echo 'umount: target busy' >&2\nexit 3\n");

        let mut backend = ScriptBackend::new(scripts.path());
        let err = backend.run(Path::new("/mnt"), &Action::Finalize).unwrap_err();
        assert_eq!(err.summary(), "finalize failed (exit code 3)");
        assert!(err.to_string().contains("target busy"));
    }

    #[test]
    fn test_missing_script() {
        let scripts = TempDir::new().unwrap();
        let mut backend = ScriptBackend::new(scripts.path());
        let err = backend.run(Path::new("/mnt"), &Action::Finalize).unwrap_err();
        assert!(err.summary().contains("not found"));
    }
}
