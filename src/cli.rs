use crate::controller::InstallOptions;
use crate::progress::DEFAULT_LOOP_WAIT;
use crate::storage::AliasRegistry;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// sysinstall - Declarative OS installer
#[derive(Parser, Debug)]
#[command(name = "sysinstall")]
#[command(about = "Validate, pre-check and install an OS from a YAML descriptor")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: record what would be executed without making changes.
    ///
    /// Destructive actions are logged instead of run and the privilege
    /// check is skipped, so a plan can be previewed as a regular user.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Report progress as JSON lines on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Pause between progress pulses, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub loop_wait_ms: Option<u64>,

    /// Accept this device file as an alias target even if absent (repeatable)
    #[arg(long = "alias", global = true, value_name = "FILE")]
    pub aliases: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Host requirements that can be relaxed
#[derive(Args, Debug, Clone, Default)]
pub struct HostFlags {
    /// Do not require network connectivity
    #[arg(long)]
    pub offline: bool,

    /// Accept legacy BIOS firmware
    #[arg(long)]
    pub allow_legacy_boot: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a descriptor and list every problem found
    Validate {
        /// Path to the YAML descriptor
        descriptor: PathBuf,
    },
    /// Check that the descriptor and this host are ready for an install
    Precheck {
        descriptor: PathBuf,

        #[command(flatten)]
        host: HostFlags,
    },
    /// Erase the target media and install the descriptor's system
    Install {
        descriptor: PathBuf,

        /// Directory the target root filesystem is mounted on
        #[arg(long, default_value = "/mnt/target")]
        root: PathBuf,

        /// Confirm that target media will be erased
        #[arg(short, long)]
        yes: bool,

        /// Directory holding the install hook scripts
        #[arg(long, value_name = "DIR")]
        scripts_dir: Option<PathBuf>,

        #[command(flatten)]
        host: HostFlags,
    },
    /// Print the descriptor as loaded, with aliases resolved
    Show { descriptor: PathBuf },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    pub fn loop_wait(&self) -> Duration {
        self.loop_wait_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_LOOP_WAIT)
    }

    pub fn alias_registry(&self) -> AliasRegistry {
        let mut registry = AliasRegistry::new();
        for file in &self.aliases {
            registry.register(file.clone());
        }
        registry
    }

    /// Options for the selected subcommand.
    pub fn install_options(&self) -> InstallOptions {
        let mut options = InstallOptions {
            dry_run: self.dry_run,
            ..InstallOptions::default()
        };
        match &self.command {
            Commands::Precheck { host, .. } => {
                options.offline = host.offline;
                options.allow_legacy_boot = host.allow_legacy_boot;
            }
            Commands::Install { host, yes, .. } => {
                options.offline = host.offline;
                options.allow_legacy_boot = host.allow_legacy_boot;
                options.confirm_destructive = *yes || self.dry_run;
            }
            Commands::Validate { .. } | Commands::Show { .. } => {}
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["sysinstall"]).is_err());
    }

    #[test]
    fn test_cli_validate() {
        let cli = Cli::try_parse_from(["sysinstall", "validate", "plan.yaml"]).unwrap();
        match &cli.command {
            Commands::Validate { descriptor } => assert_eq!(*descriptor, PathBuf::from("plan.yaml")),
            other => panic!("Expected Validate command, got {:?}", other),
        }
        assert!(!cli.dry_run);
        assert_eq!(cli.loop_wait(), DEFAULT_LOOP_WAIT);
    }

    #[test]
    fn test_cli_install_flags() {
        let cli = Cli::try_parse_from([
            "sysinstall",
            "install",
            "plan.yaml",
            "--root",
            "/target",
            "-y",
            "--scripts-dir",
            "/usr/share/sysinstall/hooks",
            "--offline",
        ])
        .unwrap();

        let options = cli.install_options();
        assert!(options.confirm_destructive);
        assert!(options.offline);
        assert!(!options.allow_legacy_boot);
        match cli.command {
            Commands::Install {
                root, scripts_dir, ..
            } => {
                assert_eq!(root, PathBuf::from("/target"));
                assert!(scripts_dir.is_some());
            }
            other => panic!("Expected Install command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_dry_run_implies_confirmation() {
        let cli = Cli::try_parse_from(["sysinstall", "install", "plan.yaml", "--dry-run"]).unwrap();
        assert!(cli.install_options().confirm_destructive);
        assert!(cli.install_options().dry_run);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sysinstall",
            "precheck",
            "plan.yaml",
            "--json",
            "--loop-wait-ms",
            "50",
            "--alias",
            "/dev/loop0",
            "--alias",
            "/dev/loop1",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.loop_wait(), Duration::from_millis(50));
        let registry = cli.alias_registry();
        assert!(registry.is_registered(std::path::Path::new("/dev/loop1")));
        assert!(!cli.install_options().confirm_destructive);
    }
}
