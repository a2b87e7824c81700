//! Installation plan validation.
//!
//! [`validate`] is a pure function over a [`SystemInstall`]: it never
//! mutates the plan and collects every violation in one pass instead of
//! stopping at the first, so a front end can show them all at once.

use crate::model::SystemInstall;
use std::fmt;
use thiserror::Error;

/// Longest hostname accepted; one DNS label
pub const MAX_HOSTNAME_LEN: usize = 63;

/// A single broken constraint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Keyboard layout not set")]
    MissingKeyboard,

    #[error("System language not set")]
    MissingLanguage,

    #[error("Telemetry not acknowledged")]
    MissingTelemetry,

    #[error("No target media selected")]
    NoTargetMedia,

    #[error("No bootable partition defined")]
    NoBootablePartition,

    #[error("No root partition defined")]
    NoRootPartition,

    #[error("{0} partitions are mounted at /; exactly one root is allowed")]
    MultipleRootPartitions(usize),

    #[error("Partitions of {device} need {needed} bytes but the disk holds {available}")]
    PartitionsExceedDisk {
        device: String,
        needed: u64,
        available: u64,
    },

    #[error("Invalid hostname '{hostname}': {reason}")]
    InvalidHostname { hostname: String, reason: String },

    #[error("Invalid user '{login}': {reason}")]
    InvalidUser { login: String, reason: String },

    #[error("Invalid network configuration: {0}")]
    InvalidNetworkInterface(String),

    #[error("Kernel argument '{0}' is both added and removed")]
    ConflictingKernelArgument(String),
}

/// Every violation found in a plan, in check order. Never empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn contains(&self, violation: &Violation) -> bool {
        self.violations.contains(violation)
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

// First line is the headline; the full list follows on later lines.
impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.violations.first() else {
            return write!(f, "Invalid installation plan");
        };

        match self.violations.len() {
            1 => write!(f, "{}", first)?,
            2 => write!(f, "{} (and 1 more problem)", first)?,
            n => write!(f, "{} (and {} more problems)", first, n - 1)?,
        }
        if self.violations.len() > 1 {
            for violation in &self.violations {
                write!(f, "\n  - {}", violation)?;
            }
        }
        Ok(())
    }
}

/// Check the plan against every installation constraint.
pub fn validate(model: &SystemInstall) -> Result<(), ValidationErrors> {
    let mut violations = Vec::new();

    if model.keyboard().is_none() {
        violations.push(Violation::MissingKeyboard);
    }
    if model.language().is_none() {
        violations.push(Violation::MissingLanguage);
    }
    if model.telemetry().is_none() {
        violations.push(Violation::MissingTelemetry);
    }

    check_media(model, &mut violations);

    if let Some(hostname) = model.hostname() {
        if let Err(reason) = check_hostname(hostname) {
            violations.push(Violation::InvalidHostname {
                hostname: hostname.to_string(),
                reason,
            });
        }
    }

    for user in model.users() {
        if let Err(reason) = user.validate_login() {
            violations.push(Violation::InvalidUser {
                login: user.login.clone(),
                reason,
            });
        }
    }

    for iface in model.network_interfaces() {
        violations.extend(
            iface
                .problems()
                .into_iter()
                .map(Violation::InvalidNetworkInterface),
        );
    }

    if let Some(args) = model.kernel_arguments() {
        violations.extend(
            args.conflicts()
                .into_iter()
                .map(|arg| Violation::ConflictingKernelArgument(arg.to_string())),
        );
    }

    if violations.is_empty() {
        Ok(())
    } else {
        tracing::debug!("Plan failed validation with {} violation(s)", violations.len());
        Err(ValidationErrors { violations })
    }
}

fn check_media(model: &SystemInstall, violations: &mut Vec<Violation>) {
    let media = model.target_media();
    if media.is_empty() {
        violations.push(Violation::NoTargetMedia);
    }

    if !media.iter().any(|d| d.has_bootable_partition()) {
        violations.push(Violation::NoBootablePartition);
    }

    match media.iter().map(|d| d.root_count()).sum::<usize>() {
        0 => violations.push(Violation::NoRootPartition),
        1 => {}
        n => violations.push(Violation::MultipleRootPartitions(n)),
    }

    // A disk scanned without a size reports 0; only check known capacities.
    for disk in media.iter().filter(|d| d.size > 0) {
        let needed = disk.allocated();
        if needed > disk.size {
            violations.push(Violation::PartitionsExceedDisk {
                device: disk.name.clone(),
                needed,
                available: disk.size,
            });
        }
    }
}

/// RFC 1123 host name: dot-separated labels of letters, digits and hyphens,
/// no label starting or ending with a hyphen.
fn check_hostname(hostname: &str) -> Result<(), String> {
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(format!("longer than {} characters", MAX_HOSTNAME_LEN));
    }

    for label in hostname.split('.') {
        if label.is_empty() {
            return Err("empty label".to_string());
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("labels cannot start or end with a hyphen".to_string());
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err("only letters, digits and hyphens are allowed".to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkInterface, User};
    use crate::storage::{AliasRegistry, BlockDevice, FileSystem};

    fn valid_model() -> SystemInstall {
        let mut disk = BlockDevice::disk("sda", 16 << 30);
        disk.add_partition(Some(FileSystem::Vfat), Some("/boot"), 512 << 20);
        disk.add_partition(Some(FileSystem::Ext4), Some("/"), 15 << 30);

        let mut si = SystemInstall::new();
        si.set_keyboard("us");
        si.set_language("en_US.UTF-8");
        si.enable_telemetry(false);
        si.add_target_media(disk);
        si
    }

    #[test]
    fn test_valid_model_passes() {
        assert!(validate(&valid_model()).is_ok());
    }

    #[test]
    fn test_empty_model_reports_everything() {
        let err = validate(&SystemInstall::new()).unwrap_err();
        for expected in [
            Violation::MissingKeyboard,
            Violation::MissingLanguage,
            Violation::MissingTelemetry,
            Violation::NoTargetMedia,
            Violation::NoBootablePartition,
            Violation::NoRootPartition,
        ] {
            assert!(err.contains(&expected), "missing {:?}", expected);
        }
    }

    #[test]
    fn test_missing_telemetry_headline() {
        let mut si = SystemInstall::new();
        si.set_keyboard("us");
        si.set_language("en_US.UTF-8");
        let mut disk = BlockDevice::disk("sda", 0);
        disk.add_partition(Some(FileSystem::Vfat), Some("/boot/efi"), 0);
        disk.add_partition(Some(FileSystem::Ext4), Some("/"), 0);
        si.add_target_media(disk);

        let err = validate(&si).unwrap_err();
        assert_eq!(err.violations(), [Violation::MissingTelemetry]);
        assert!(err.to_string().to_lowercase().contains("telemetry"));
    }

    #[test]
    fn test_multiple_roots() {
        let mut si = valid_model();
        let mut second = BlockDevice::disk("sdb", 0);
        second.add_partition(Some(FileSystem::Xfs), Some("/"), 0);
        si.add_target_media(second);

        let err = validate(&si).unwrap_err();
        assert_eq!(err.violations(), [Violation::MultipleRootPartitions(2)]);
    }

    #[test]
    fn test_oversized_partitions() {
        let mut si = SystemInstall::new();
        si.set_keyboard("us");
        si.set_language("en_US.UTF-8");
        si.enable_telemetry(true);
        let mut disk = BlockDevice::disk("sda", 1 << 30);
        disk.add_partition(Some(FileSystem::Vfat), Some("/boot"), 512 << 20);
        disk.add_partition(Some(FileSystem::Ext4), Some("/"), 1 << 30);
        si.add_target_media(disk);

        let err = validate(&si).unwrap_err();
        assert!(matches!(
            err.violations(),
            [Violation::PartitionsExceedDisk { .. }]
        ));
    }

    #[test]
    fn test_overflowing_partition_sizes() {
        let yaml = "\
keyboard: us
language: en_US.UTF-8
telemetry: true
target-media:
  - name: sda
    size: 8G
    children:
      - name: sda1
        fstype: vfat
        mountpoint: /boot
        size: 10000P
      - name: sda2
        fstype: ext4
        mountpoint: /
        size: 10000P
";
        let si = SystemInstall::from_yaml_str(yaml, &AliasRegistry::new()).unwrap();

        let err = validate(&si).unwrap_err();
        assert_eq!(
            err.violations(),
            [Violation::PartitionsExceedDisk {
                device: "sda".to_string(),
                needed: u64::MAX,
                available: 8 << 30,
            }]
        );
    }

    #[test]
    fn test_hostname_rules() {
        assert!(check_hostname("clr-box").is_ok());
        assert!(check_hostname("node1.lab.example").is_ok());
        assert!(check_hostname("-bad").is_err());
        assert!(check_hostname("under_score").is_err());
        assert!(check_hostname("a..b").is_err());
        assert!(check_hostname(&"h".repeat(64)).is_err());
    }

    #[test]
    fn test_user_network_and_kernel_checks() {
        let mut si = valid_model();
        si.add_user(User::new("Bad Login"));
        si.add_network_interface(NetworkInterface {
            name: "eth0".to_string(),
            ..NetworkInterface::default()
        });
        si.add_extra_kernel_arguments(["quiet"]);
        si.remove_kernel_arguments(["quiet"]);

        let err = validate(&si).unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(matches!(err.violations()[0], Violation::InvalidUser { .. }));
        assert!(matches!(
            err.violations()[1],
            Violation::InvalidNetworkInterface(_)
        ));
        assert_eq!(
            err.violations()[2],
            Violation::ConflictingKernelArgument("quiet".to_string())
        );
    }

    #[test]
    fn test_display_headline_then_list() {
        let err = validate(&SystemInstall::new()).unwrap_err();
        let text = err.to_string();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Keyboard layout not set (and 5 more problems)")
        );
        assert_eq!(lines.count(), 6);
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let si = valid_model();
        let before = si.to_yaml_string().unwrap();
        let _ = validate(&si);
        assert_eq!(si.to_yaml_string().unwrap(), before);
    }
}
