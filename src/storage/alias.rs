//! Device alias resolution.
//!
//! Descriptors may name their target media indirectly:
//!
//! ```yaml
//! block-devices:
//!   - name: bdevice
//!     file: /dev/sda
//! target-media:
//!   - name: ${bdevice}
//!     children:
//!       - name: ${bdevice}1
//! ```
//!
//! `${bdevice}` expands to the basename of the alias file (`sda`) and the
//! device file becomes the alias file's directory joined with the expanded
//! name (`/dev/sda`, `/dev/sda1`). Test suites register loopback or
//! placeholder files with an [`AliasRegistry`] so they never touch a real
//! disk; anything not registered must exist on the host.

use crate::descriptor::DescriptorError;
use crate::storage::BlockDevice;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One `block-devices` entry of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAlias {
    pub name: String,
    pub file: PathBuf,
}

/// Device files accepted as alias targets without checking the host.
///
/// Production runs use an empty registry, so every alias must point at an
/// existing device file.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    files: BTreeSet<PathBuf>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognize `file` as an alias target.
    pub fn register(&mut self, file: impl Into<PathBuf>) {
        self.files.insert(file.into());
    }

    pub fn is_registered(&self, file: &Path) -> bool {
        self.files.contains(file)
    }

    /// Registered, or present on the host.
    pub fn is_available(&self, file: &Path) -> bool {
        self.is_registered(file) || file.exists()
    }
}

/// Alias name to device file mapping built from a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, PathBuf>,
}

impl AliasTable {
    /// Build the table, rejecting duplicate names and unavailable files.
    pub fn from_aliases(
        aliases: &[DeviceAlias],
        registry: &AliasRegistry,
    ) -> Result<Self, DescriptorError> {
        let mut entries = BTreeMap::new();

        for alias in aliases {
            if !registry.is_available(&alias.file) {
                return Err(DescriptorError::AliasDeviceMissing {
                    alias: alias.name.clone(),
                    file: alias.file.clone(),
                });
            }
            if entries.insert(alias.name.clone(), alias.file.clone()).is_some() {
                return Err(DescriptorError::DuplicateAlias(alias.name.clone()));
            }
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Device file for `name`; unknown names are already device paths.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.entries
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Expand alias templates in `device` and its children, in place.
    pub fn expand(&self, device: &mut BlockDevice) -> Result<(), DescriptorError> {
        self.expand_under(device, None)
    }

    fn expand_under(
        &self,
        device: &mut BlockDevice,
        parent_dir: Option<&Path>,
    ) -> Result<(), DescriptorError> {
        match split_template(&device.name)? {
            Some((prefix, alias, suffix)) => {
                let file = self
                    .entries
                    .get(alias)
                    .ok_or_else(|| DescriptorError::UnknownAlias {
                        alias: alias.to_string(),
                        device: device.name.clone(),
                    })?;
                let base = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let expanded = format!("{}{}{}", prefix, base, suffix);
                let dir = file.parent().unwrap_or_else(|| Path::new("/"));

                device.device_file = Some(dir.join(&expanded));
                device.name = expanded;
            }
            None => {
                if device.device_file.is_none() {
                    if let Some(dir) = parent_dir {
                        device.device_file = Some(dir.join(&device.name));
                    }
                }
            }
        }

        let dir = device.device_file.as_ref().map(|_| device.device_dir());
        for child in &mut device.children {
            self.expand_under(child, dir.as_deref())?;
        }

        Ok(())
    }
}

/// Split `pre${alias}post` into its parts; `None` when there is no template.
fn split_template(name: &str) -> Result<Option<(&str, &str, &str)>, DescriptorError> {
    let Some(start) = name.find("${") else {
        return Ok(None);
    };

    let rest = &name[start + 2..];
    let end = rest
        .find('}')
        .ok_or_else(|| DescriptorError::MalformedTemplate(name.to_string()))?;
    let alias = &rest[..end];
    let suffix = &rest[end + 1..];

    if alias.is_empty() || suffix.contains("${") {
        return Err(DescriptorError::MalformedTemplate(name.to_string()));
    }

    Ok(Some((&name[..start], alias, suffix)))
}
