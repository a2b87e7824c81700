//! sysinstall Library
//!
//! Installer core driven by a declarative plan: the device and configuration
//! model, descriptor I/O, validation, the progress protocol, worker
//! coordination and the pre-check/install orchestrators.

pub mod cli;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod hardware;
pub mod model;
pub mod progress;
pub mod storage;
pub mod validation;
pub mod worker;

// Re-export main types for convenience
pub use controller::{Action, Controller, DryRunBackend, InstallBackend, InstallOptions, ScriptBackend};
pub use descriptor::DescriptorError;
pub use error::{InstallerError, Result};
pub use model::{KernelArguments, NetworkInterface, SystemInstall, Telemetry, User};
pub use progress::{
    DEFAULT_LOOP_WAIT, Orchestrator, ProgressClient, ProgressError, ProgressEvent, ProgressSession,
};
pub use storage::{AliasRegistry, BlockDevice, BlockDeviceType, FileSystem};
pub use validation::{ValidationErrors, Violation, validate};
pub use worker::{WorkerHandle, WorkerRun, WorkerState, WorkerTransitionError};

// Host detection
pub use hardware::{FirmwareMode, HardwareInfo, HostProbe, NetworkState, SystemProbe};
