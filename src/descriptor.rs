//! Descriptor file handling for loading and saving installation plans.
//!
//! A descriptor is a YAML document with kebab-case keys. Loading is all or
//! nothing: a read, parse or alias failure yields an error and no model.
//! Alias templates in `target-media` are expanded against the descriptor's
//! `block-devices` section during the load, so the written form carries
//! resolved names and device files and needs no aliases to reload.

use crate::model::SystemInstall;
use crate::storage::{AliasRegistry, AliasTable};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading, expanding or writing a descriptor
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Cannot read descriptor {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed descriptor {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Cannot write descriptor {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize descriptor: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Alias '{alias}' points at {file:?}, which is neither registered nor present")]
    AliasDeviceMissing { alias: String, file: PathBuf },

    #[error("Alias '{0}' is declared more than once")]
    DuplicateAlias(String),

    #[error("Device '{device}' refers to unknown alias '{alias}'")]
    UnknownAlias { alias: String, device: String },

    #[error("Malformed alias template in device name '{0}'")]
    MalformedTemplate(String),
}

impl SystemInstall {
    /// Load a descriptor, accepting only alias files present on the host.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, DescriptorError> {
        Self::load_file_with_aliases(path, &AliasRegistry::new())
    }

    /// Load a descriptor, also accepting alias files known to `registry`.
    pub fn load_file_with_aliases<P: AsRef<Path>>(
        path: P,
        registry: &AliasRegistry,
    ) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let model = parse(&content, &path.display().to_string(), registry)?;
        tracing::debug!(
            "Loaded descriptor {:?}: {} target media, {} bundles",
            path,
            model.target_media().len(),
            model.bundles().len()
        );
        Ok(model)
    }

    /// Parse descriptor text.
    pub fn from_yaml_str(content: &str, registry: &AliasRegistry) -> Result<Self, DescriptorError> {
        parse(content, "<inline>", registry)
    }

    /// Serialize to descriptor text.
    pub fn to_yaml_string(&self) -> Result<String, DescriptorError> {
        serde_yaml::to_string(self).map_err(DescriptorError::Serialize)
    }

    /// Write the plan back as a descriptor.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DescriptorError> {
        let path = path.as_ref();
        let yaml = self.to_yaml_string()?;

        fs::write(path, yaml).map_err(|source| DescriptorError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Wrote descriptor {:?}", path);
        Ok(())
    }
}

fn parse(
    content: &str,
    origin: &str,
    registry: &AliasRegistry,
) -> Result<SystemInstall, DescriptorError> {
    let mut model: SystemInstall =
        serde_yaml::from_str(content).map_err(|source| DescriptorError::Parse {
            origin: origin.to_string(),
            source,
        })?;

    let aliases = model.take_aliases();
    if !aliases.is_empty() {
        let table = AliasTable::from_aliases(&aliases, registry)?;
        for device in model.target_media_mut() {
            table.expand(device)?;
        }
    }

    model.normalize();
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MINIMAL: &str = "\
keyboard: us
language: en_US.UTF-8
telemetry: false
target-media:
  - name: vda
    size: 8G
    children:
      - name: vda1
        fstype: vfat
        mountpoint: /boot
        size: 512M
      - name: vda2
        fstype: ext4
        mountpoint: /
        size: 7G
";

    #[test]
    fn test_parse_minimal() {
        let si = SystemInstall::from_yaml_str(MINIMAL, &AliasRegistry::new()).unwrap();
        assert_eq!(si.keyboard(), Some("us"));
        assert!(si.telemetry().is_some());
        assert!(!si.is_telemetry_enabled());
        assert_eq!(si.target_media()[0].size, 8 << 30);
        assert_eq!(si.target_media()[0].children[0].size, 512 << 20);
        assert!(si.auto_update());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = SystemInstall::from_yaml_str("keybaord: us\n", &AliasRegistry::new())
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Parse { .. }));
    }

    #[test]
    fn test_duplicates_in_file_are_collapsed() {
        let yaml = "bundles: [os-core, editors, os-core]\nkernel-arguments:\n  add: [quiet, quiet]\n";
        let si = SystemInstall::from_yaml_str(yaml, &AliasRegistry::new()).unwrap();
        assert_eq!(si.bundles(), ["os-core", "editors"]);
        assert_eq!(si.kernel_arguments().unwrap().add(), ["quiet"]);
    }

    #[test]
    fn test_aliases_expand_on_load() {
        let yaml = "\
block-devices:
  - name: bdevice
    file: /dev/sdz
target-media:
  - name: ${bdevice}
    children:
      - name: ${bdevice}1
";
        let mut registry = AliasRegistry::new();
        registry.register("/dev/sdz");

        let si = SystemInstall::from_yaml_str(yaml, &registry).unwrap();
        let disk = &si.target_media()[0];
        assert_eq!(disk.device_file(), PathBuf::from("/dev/sdz"));
        assert_eq!(disk.children[0].name, "sdz1");

        let written = si.to_yaml_string().unwrap();
        assert!(!written.contains("block-devices"));
        assert!(!written.contains("${"));
    }

    #[test]
    fn test_read_error_names_path() {
        let err = SystemInstall::load_file("/nonexistent/descriptor.yaml").unwrap_err();
        assert!(matches!(err, DescriptorError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/descriptor.yaml"));
    }
}
