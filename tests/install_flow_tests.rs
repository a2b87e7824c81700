//! End-to-end tests for pre-check and install
//!
//! These tests verify:
//! - Pre-check step order and host requirement failures
//! - Install action order through the dry-run backend
//! - Hook script execution through the script backend
//! - Refusal to touch media without confirmation

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinstall::progress::{Orchestrator, ProgressSession, RecordingClient, StepState};
use sysinstall::{
    Action, AliasRegistry, Controller, DryRunBackend, FirmwareMode, HardwareInfo, InstallBackend,
    InstallOptions, InstallerError, NetworkState, ScriptBackend, SystemInstall,
};
use tempfile::TempDir;

fn fixture(file: &str) -> SystemInstall {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(file);
    SystemInstall::load_file(path).unwrap()
}

fn uefi_online() -> Box<HardwareInfo> {
    Box::new(HardwareInfo {
        firmware: FirmwareMode::Uefi,
        network: NetworkState::Online,
        privileged: true,
    })
}

fn sda_present() -> AliasRegistry {
    let mut registry = AliasRegistry::new();
    registry.register("/dev/sda");
    registry
}

fn session(client: &RecordingClient) -> ProgressSession {
    Orchestrator::new()
        .begin_session(Box::new(client.clone()))
        .unwrap()
}

fn confirmed() -> InstallOptions {
    InstallOptions {
        confirm_destructive: true,
        ..InstallOptions::default()
    }
}

// =============================================================================
// Pre-check
// =============================================================================

#[test]
fn test_pre_check_on_worker() {
    let client = RecordingClient::with_loop_wait(Duration::from_millis(1));
    let controller = Controller::new(InstallOptions::default(), Box::new(DryRunBackend::new()))
        .with_probe(uefi_online())
        .with_aliases(sda_present());

    let mut handle = controller
        .spawn_pre_check(session(&client), fixture("basic-valid-descriptor.yaml"))
        .unwrap();

    assert!(handle.wait());
    handle.join().unwrap();

    let descriptions = client.descriptions();
    assert_eq!(
        descriptions,
        [
            "Validating installation plan",
            "Checking privileges",
            "Checking firmware",
            "Checking target media",
            "Checking network connectivity",
        ]
    );
}

#[test]
fn test_pre_check_rejects_legacy_boot() {
    let client = RecordingClient::new();
    let controller = Controller::new(InstallOptions::default(), Box::new(DryRunBackend::new()))
        .with_probe(Box::new(HardwareInfo {
            firmware: FirmwareMode::Bios,
            network: NetworkState::Online,
            privileged: true,
        }))
        .with_aliases(sda_present());

    let mut s = session(&client);
    let err = controller
        .pre_check(&mut s, &fixture("basic-valid-descriptor.yaml"))
        .unwrap_err();

    assert_eq!(err.summary(), "UEFI firmware required");
    let last = s.steps().last().unwrap();
    assert_eq!(last.description, "Checking firmware");
    assert_eq!(last.state, StepState::Failed);
}

#[test]
fn test_pre_check_requires_network_unless_offline() {
    let offline_host = || {
        Box::new(HardwareInfo {
            firmware: FirmwareMode::Uefi,
            network: NetworkState::Offline,
            privileged: true,
        })
    };
    let model = fixture("basic-valid-descriptor.yaml");

    let client = RecordingClient::with_loop_wait(Duration::from_millis(1));
    let controller = Controller::new(InstallOptions::default(), Box::new(DryRunBackend::new()))
        .with_probe(offline_host())
        .with_aliases(sda_present());
    let err = controller.pre_check(&mut session(&client), &model).unwrap_err();
    assert_eq!(err.summary(), "Network is unreachable");

    let options = InstallOptions {
        offline: true,
        ..InstallOptions::default()
    };
    let client = RecordingClient::new();
    let controller = Controller::new(options, Box::new(DryRunBackend::new()))
        .with_probe(offline_host())
        .with_aliases(sda_present());
    controller.pre_check(&mut session(&client), &model).unwrap();
    assert!(
        !client
            .descriptions()
            .iter()
            .any(|d| d == "Checking network connectivity")
    );
}

#[test]
fn test_pre_check_missing_media_fails_outside_dry_run() {
    let model = fixture("basic-valid-descriptor.yaml");
    let offline = InstallOptions {
        offline: true,
        ..InstallOptions::default()
    };

    let controller = Controller::new(offline.clone(), Box::new(DryRunBackend::new()))
        .with_probe(uefi_online())
        .with_aliases(AliasRegistry::new());
    let client = RecordingClient::new();
    let result = controller.pre_check(&mut session(&client), &model);
    if !Path::new("/dev/sda").exists() {
        assert_eq!(result.unwrap_err().summary(), "Target media /dev/sda not found");
    }

    let dry_run = InstallOptions {
        dry_run: true,
        ..offline
    };
    let controller = Controller::new(dry_run, Box::new(DryRunBackend::new()))
        .with_probe(Box::new(HardwareInfo {
            firmware: FirmwareMode::Uefi,
            network: NetworkState::Online,
            privileged: false,
        }));
    let client = RecordingClient::new();
    controller.pre_check(&mut session(&client), &model).unwrap();
    assert!(!client.descriptions().iter().any(|d| d == "Checking privileges"));
}

#[test]
fn test_pre_check_reports_invalid_plan() {
    let client = RecordingClient::new();
    let controller = Controller::new(InstallOptions::default(), Box::new(DryRunBackend::new()))
        .with_probe(uefi_online());

    let err = controller
        .pre_check(&mut session(&client), &fixture("basic-invalid-descriptor.yaml"))
        .unwrap_err();

    match err {
        InstallerError::Validation(errors) => assert!(errors.len() > 1),
        other => panic!("Expected validation error, got {:?}", other),
    }
    assert_eq!(client.descriptions(), ["Validating installation plan"]);
}

// =============================================================================
// Install (dry run)
// =============================================================================

#[test]
fn test_install_requires_confirmation() {
    let backend = DryRunBackend::new();
    let mut controller = Controller::new(InstallOptions::default(), Box::new(backend.clone()));
    let client = RecordingClient::new();

    let err = controller
        .install(
            &mut session(&client),
            Path::new("/mnt/target"),
            &fixture("basic-valid-descriptor.yaml"),
        )
        .unwrap_err();

    assert!(matches!(err, InstallerError::State(_)));
    assert!(backend.actions().is_empty());
    assert!(client.events().is_empty());
}

#[test]
fn test_install_action_order() {
    let backend = DryRunBackend::new();
    let controller = Controller::new(confirmed(), Box::new(backend.clone()));
    let client = RecordingClient::new();

    let mut handle = controller
        .spawn_install(
            session(&client),
            PathBuf::from("/mnt/target"),
            fixture("real-example.yaml"),
        )
        .unwrap();
    assert!(handle.wait());
    handle.join().unwrap();

    let actions = backend.actions();
    assert_eq!(
        actions.first(),
        Some(&Action::PrepareMedia {
            name: "sda".to_string(),
            device: PathBuf::from("/dev/sda"),
        })
    );
    assert_eq!(
        actions[1],
        Action::MountRoot {
            device: PathBuf::from("/dev/sda3"),
        }
    );
    assert_eq!(
        actions[2],
        Action::InstallBundle {
            bundle: "kernel-native".to_string(),
        }
    );
    assert_eq!(actions.last(), Some(&Action::Finalize));

    let destructive = actions.iter().filter(|a| a.is_destructive()).count();
    assert_eq!(destructive, 1);
    assert_eq!(
        actions
            .iter()
            .filter(|a| matches!(a, Action::CreateUser(_)))
            .count(),
        2
    );
    assert!(actions.contains(&Action::SetHostname("clr-workstation".to_string())));
    assert!(actions.contains(&Action::Telemetry { enabled: true }));
}

#[test]
fn test_install_reports_bundle_progress() {
    let backend = DryRunBackend::new();
    let mut controller = Controller::new(confirmed(), Box::new(backend));
    let client = RecordingClient::new();
    let mut s = session(&client);

    controller
        .install(
            &mut s,
            Path::new("/mnt/target"),
            &fixture("basic-valid-descriptor.yaml"),
        )
        .unwrap();

    let bundles = s
        .steps()
        .iter()
        .find(|step| step.description == "Installing bundles")
        .unwrap();
    assert_eq!(bundles.state, StepState::Succeeded);
    assert_eq!(bundles.progress, Some((3, 3)));
    assert!(s.steps().iter().all(|step| step.state == StepState::Succeeded));
}

// =============================================================================
// Install (hook scripts)
// =============================================================================

const HOOKS: [&str; 12] = [
    "prepare-media",
    "mount-root",
    "install-bundle",
    "set-hostname",
    "set-keyboard",
    "set-language",
    "set-timezone",
    "configure-network",
    "create-user",
    "kernel-arguments",
    "telemetry",
    "finalize",
];

/// Hook scripts that append their name and arguments to `$SYSINSTALL_ROOT/hooks.log`.
fn logging_hooks(dir: &Path) {
    for hook in HOOKS {
        fs::write(
            dir.join(format!("{}.sh", hook)),
            format!("echo \"{} $*\" >> \"$SYSINSTALL_ROOT/hooks.log\"\n", hook),
        )
        .unwrap();
    }
}

#[test]
fn test_script_backend_install() {
    let hooks = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    logging_hooks(hooks.path());

    let mut controller = Controller::new(confirmed(), Box::new(ScriptBackend::new(hooks.path())));
    let client = RecordingClient::new();
    controller
        .install(
            &mut session(&client),
            root.path(),
            &fixture("valid-minimal.yaml"),
        )
        .unwrap();

    let log = fs::read_to_string(root.path().join("hooks.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(
        lines,
        [
            "prepare-media --device /dev/vda --name vda",
            "mount-root --device /dev/vda2",
            "set-keyboard --value us",
            "set-language --value en_US.UTF-8",
            "telemetry --disable",
            "finalize ",
        ]
    );
}

#[test]
fn test_script_backend_failure_stops_install() {
    let hooks = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    logging_hooks(hooks.path());
    fs::write(
        hooks.path().join("mount-root.sh"),
        "echo 'mount: /dev/vda2: wrong fs type' >&2\nexit 32\n",
    )
    .unwrap();

    let mut controller = Controller::new(confirmed(), Box::new(ScriptBackend::new(hooks.path())));
    let client = RecordingClient::new();
    let mut s = session(&client);
    let err = controller
        .install(&mut s, root.path(), &fixture("valid-minimal.yaml"))
        .unwrap_err();

    assert_eq!(err.summary(), "mount-root failed (exit code 32)");
    assert!(err.to_string().contains("wrong fs type"));

    let last = s.steps().last().unwrap();
    assert_eq!(last.description, "Mounting root filesystem");
    assert_eq!(last.state, StepState::Failed);

    let log = fs::read_to_string(root.path().join("hooks.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
}

#[test]
fn test_script_backend_missing_hook() {
    let hooks = TempDir::new().unwrap();
    let mut backend = ScriptBackend::new(hooks.path());

    let err = backend
        .run(Path::new("/mnt/target"), &Action::Finalize)
        .unwrap_err();
    assert!(err.summary().contains("not found"));
}
