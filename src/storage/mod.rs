//! Block device model
//!
//! A [`BlockDevice`] is a disk or a partition together with its ordered
//! children. Devices are plain values: `Clone` is a deep copy and equality
//! is structural over every attribute and every child, in order. The
//! configuration model relies on that equality to de-duplicate target media.
//!
//! # Naming
//!
//! Children are named positionally after their parent: the Nth partition of
//! `sda` is `sda{N}`, while disks whose name ends in a digit (`nvme0n1`,
//! `mmcblk0`, `loop0`) use a `p` separator (`nvme0n1p1`). A device without an
//! explicit device file resolves to `/dev/<name>`.

pub mod alias;
pub mod size;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

pub use alias::{AliasRegistry, AliasTable, DeviceAlias};

/// Directory device files live in when no alias says otherwise.
pub const DEV_DIR: &str = "/dev";

/// Mount point that makes a partition the root of the installed system.
pub const ROOT_MOUNT: &str = "/";

/// Kind of block device, mirroring lsblk's TYPE column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockDeviceType {
    #[default]
    Disk,
    Part,
    Loop,
    Crypt,
    Lvm2,
    Rom,
    #[serde(other)]
    Unknown,
}

/// Filesystem a partition is (or will be) formatted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileSystem {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    F2fs,
    /// FAT filesystem used for the EFI System Partition
    Vfat,
    Swap,
}

/// A disk or partition and its partition tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockDevice {
    /// Display name, e.g. `sda` or `sda1`; may hold a `${alias}` template
    /// until the descriptor loader expands it
    pub name: String,

    /// Resolved device file; `/dev/<name>` when absent
    #[serde(default, rename = "file", skip_serializing_if = "Option::is_none")]
    pub device_file: Option<PathBuf>,

    #[serde(default, rename = "type")]
    pub kind: BlockDeviceType,

    #[serde(default, rename = "fstype", skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<FileSystem>,

    #[serde(default, rename = "mountpoint", skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,

    /// Size in bytes
    #[serde(default, with = "size")]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, rename = "ro", skip_serializing_if = "is_false")]
    pub read_only: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub removable: bool,

    /// Explicit boot marker, for layouts where the ESP is not mounted at /boot
    #[serde(default, skip_serializing_if = "is_false")]
    pub bootable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BlockDevice>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl BlockDevice {
    /// Create a whole-disk device.
    pub fn disk(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: BlockDeviceType::Disk,
            size,
            ..Self::default()
        }
    }

    /// Resolved device file path.
    pub fn device_file(&self) -> PathBuf {
        match &self.device_file {
            Some(file) => file.clone(),
            None => Path::new(DEV_DIR).join(&self.name),
        }
    }

    /// Directory this device's file lives in; children resolve next to it.
    pub fn device_dir(&self) -> PathBuf {
        self.device_file()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEV_DIR))
    }

    /// Name of the `index`-th (1-based) child partition.
    pub fn child_name(&self, index: usize) -> String {
        if self.name.ends_with(|c: char| c.is_ascii_digit()) {
            format!("{}p{}", self.name, index)
        } else {
            format!("{}{}", self.name, index)
        }
    }

    /// Append a partition, named positionally, and return it for further edits.
    pub fn add_partition(
        &mut self,
        fs_type: Option<FileSystem>,
        mount_point: Option<&str>,
        size: u64,
    ) -> &mut BlockDevice {
        let name = self.child_name(self.children.len() + 1);
        let device_file = self.device_file.as_ref().map(|_| self.device_dir().join(&name));

        self.children.push(BlockDevice {
            name,
            device_file,
            kind: BlockDeviceType::Part,
            fs_type,
            mount_point: mount_point.map(str::to_string),
            size,
            ..BlockDevice::default()
        });

        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// True if this device is marked bootable or is a vfat ESP mounted at
    /// `/boot` or `/boot/efi`.
    pub fn is_bootable(&self) -> bool {
        self.bootable
            || (self.fs_type == Some(FileSystem::Vfat)
                && matches!(self.mount_point.as_deref(), Some("/boot" | "/boot/efi")))
    }

    /// True if this device is mounted at the root of the installed system.
    pub fn is_root(&self) -> bool {
        self.mount_point.as_deref() == Some(ROOT_MOUNT)
    }

    /// True if this device or any descendant is bootable.
    pub fn has_bootable_partition(&self) -> bool {
        self.walk().any(BlockDevice::is_bootable)
    }

    /// True if this device or any descendant is the root mount.
    pub fn has_root(&self) -> bool {
        self.walk().any(BlockDevice::is_root)
    }

    /// Number of root mounts in this device tree.
    pub fn root_count(&self) -> usize {
        self.walk().filter(|d| d.is_root()).count()
    }

    /// Sum of the sizes of the direct children, saturating at `u64::MAX`.
    pub fn allocated(&self) -> u64 {
        self.children
            .iter()
            .fold(0u64, |total, c| total.saturating_add(c.size))
    }

    /// Depth-first, pre-order iterator over this device and its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

/// Iterator returned by [`BlockDevice::walk`]
pub struct Walk<'a> {
    stack: Vec<&'a BlockDevice>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a BlockDevice;

    fn next(&mut self) -> Option<Self::Item> {
        let device = self.stack.pop()?;
        self.stack.extend(device.children.iter().rev());
        Some(device)
    }
}
