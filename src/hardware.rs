//! Host environment detection
//!
//! Detects firmware mode (UEFI vs BIOS), network connectivity and whether the
//! installer runs with root privileges. The pre-check consults these facts
//! through the [`HostProbe`] trait so it can be exercised against a fixed
//! [`HardwareInfo`] instead of the live machine.
//!
//! # Design
//!
//! - **Fail Safe**: ambiguous detection logs a warning and reports the
//!   restrictive answer (BIOS, Offline)
//! - **No Shelling Out**: the network check is a `TcpStream::connect_timeout`
//!   to the update server, not ping

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Endpoint probed for network connectivity
pub const DEFAULT_PROBE_ENDPOINT: &str = "cdn.download.clearlinux.org:443";

/// How long the connectivity probe waits for a TCP handshake
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Detected firmware mode of the system.
///
/// The Linux kernel exposes `/sys/firmware/efi` only when booted in UEFI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    Uefi,
    Bios,
}

impl FirmwareMode {
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Online,
    Offline,
}

impl NetworkState {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Source of host facts for the pre-check.
pub trait HostProbe: Send + Sync {
    fn firmware_mode(&self) -> FirmwareMode;

    fn network_state(&self) -> NetworkState;

    /// True when running with an effective uid of 0.
    fn is_privileged(&self) -> bool;
}

/// Probes the live machine on every call.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    endpoint: String,
    timeout: Duration,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PROBE_ENDPOINT.to_string(),
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `endpoint` (`host:port`) instead of the update server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl HostProbe for SystemProbe {
    fn firmware_mode(&self) -> FirmwareMode {
        detect_firmware_mode()
    }

    fn network_state(&self) -> NetworkState {
        detect_internet(&self.endpoint, self.timeout)
    }

    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}

/// Fixed host facts.
#[derive(Debug, Clone)]
pub struct HardwareInfo {
    pub firmware: FirmwareMode,
    pub network: NetworkState,
    pub privileged: bool,
}

impl HardwareInfo {
    /// Detect the host environment once.
    pub fn detect() -> Self {
        let probe = SystemProbe::new();
        let info = Self {
            firmware: probe.firmware_mode(),
            network: probe.network_state(),
            privileged: probe.is_privileged(),
        };

        tracing::info!("Hardware detection: {}", info);
        info
    }
}

impl HostProbe for HardwareInfo {
    fn firmware_mode(&self) -> FirmwareMode {
        self.firmware
    }

    fn network_state(&self) -> NetworkState {
        self.network
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}

impl fmt::Display for HardwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Firmware: {}, Network: {}, Root: {}",
            self.firmware, self.network, self.privileged
        )
    }
}

// ============================================================================
// Detection Functions
// ============================================================================

/// Detect firmware mode by checking for the EFI sysfs directory.
pub fn detect_firmware_mode() -> FirmwareMode {
    if Path::new("/sys/firmware/efi").exists() {
        tracing::debug!("UEFI firmware detected (/sys/firmware/efi exists)");
        FirmwareMode::Uefi
    } else {
        tracing::debug!("BIOS firmware detected (/sys/firmware/efi not found)");
        FirmwareMode::Bios
    }
}

/// Detect network connectivity with a TCP handshake to `endpoint`.
///
/// Any resolution or connection failure reports `Offline`.
pub fn detect_internet(endpoint: &str, timeout: Duration) -> NetworkState {
    let addrs = match endpoint.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::warn!("Cannot resolve {}: {}", endpoint, e);
            return NetworkState::Offline;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => {
                tracing::debug!("Network connectivity confirmed (TCP to {})", addr);
                return NetworkState::Online;
            }
            Err(e) => tracing::debug!("Connection to {} failed: {}", addr, e),
        }
    }

    tracing::warn!("Network connectivity check against {} failed", endpoint);
    NetworkState::Offline
}

// ============================================================================
// Tests
// ============================================================================
