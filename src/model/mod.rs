//! Installation plan model
//!
//! [`SystemInstall`] is the aggregate plan: target media, network
//! interfaces, users, bundles, kernel argument deltas, telemetry decision and
//! the locale settings. Its collections are private. Every change goes
//! through the mutation API, which keeps each collection free of duplicates:
//! adding an element equal to one already present is a silent no-op.
//!
//! | Collection          | Identity                          |
//! |---------------------|-----------------------------------|
//! | target media        | structural [`BlockDevice`] equality |
//! | network interfaces  | [`NetworkInterface`] equality     |
//! | users               | login                             |
//! | bundles             | name                              |
//! | kernel arguments    | argument text, per set            |

pub mod network;
pub mod user;

use crate::storage::{BlockDevice, DeviceAlias};
use serde::{Deserialize, Serialize};

pub use network::{InterfaceAddr, NetworkInterface};
pub use user::User;

/// Kernel command line changes applied on top of the distribution defaults.
///
/// `add` and `remove` are independent sets; an argument listed in both is
/// reported by validation rather than resolved here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelArguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    remove: Vec<String>,
}

impl KernelArguments {
    pub fn add(&self) -> &[String] {
        &self.add
    }

    pub fn remove(&self) -> &[String] {
        &self.remove
    }

    /// Arguments present in both sets, in `add` order.
    pub fn conflicts(&self) -> Vec<&str> {
        self.add
            .iter()
            .filter(|arg| self.remove.contains(arg))
            .map(String::as_str)
            .collect()
    }
}

/// The user's telemetry decision.
///
/// In a descriptor this is either a plain flag (`telemetry: true`) or a map
/// with an optional collection server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "TelemetryRepr", into = "TelemetryRepr")]
pub struct Telemetry {
    pub enabled: bool,
    pub url: Option<String>,
    pub tid: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TelemetryRepr {
    Flag(bool),
    Full {
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tid: Option<String>,
    },
}

impl From<TelemetryRepr> for Telemetry {
    fn from(repr: TelemetryRepr) -> Self {
        match repr {
            TelemetryRepr::Flag(enabled) => Self {
                enabled,
                ..Self::default()
            },
            TelemetryRepr::Full { enabled, url, tid } => Self { enabled, url, tid },
        }
    }
}

impl From<Telemetry> for TelemetryRepr {
    fn from(telemetry: Telemetry) -> Self {
        match telemetry {
            Telemetry {
                enabled,
                url: None,
                tid: None,
            } => TelemetryRepr::Flag(enabled),
            Telemetry { enabled, url, tid } => TelemetryRepr::Full { enabled, url, tid },
        }
    }
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// The installation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SystemInstall {
    /// Descriptor format version
    #[serde(default, skip_serializing_if = "is_zero")]
    version: u32,

    /// Alias declarations; consumed when the descriptor is loaded
    #[serde(default, rename = "block-devices", skip_serializing)]
    aliases: Vec<DeviceAlias>,

    #[serde(default)]
    target_media: Vec<BlockDevice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    keyboard: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,

    /// Kernel bundle to install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kernel: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bundles: Vec<String>,

    /// Bundles picked by the user on top of the required set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    user_bundles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    network_interfaces: Vec<NetworkInterface>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    users: Vec<User>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    kernel_arguments: Option<KernelArguments>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    telemetry: Option<Telemetry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_proxy: Option<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    auto_update: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    post_reboot: bool,
}

impl Default for SystemInstall {
    fn default() -> Self {
        Self {
            version: 0,
            aliases: Vec::new(),
            target_media: Vec::new(),
            keyboard: None,
            language: None,
            timezone: None,
            hostname: None,
            kernel: None,
            bundles: Vec::new(),
            user_bundles: Vec::new(),
            network_interfaces: Vec::new(),
            users: Vec::new(),
            kernel_arguments: None,
            telemetry: None,
            http_proxy: None,
            auto_update: true,
            post_reboot: false,
        }
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl SystemInstall {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything and start from an empty plan.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // ------------------------------------------------------------------
    // Mutation API
    // ------------------------------------------------------------------

    /// Add a target medium unless an equal device is already present.
    pub fn add_target_media(&mut self, device: BlockDevice) {
        push_unique(&mut self.target_media, device);
    }

    /// Add a network interface unless an equal one is already present.
    pub fn add_network_interface(&mut self, iface: NetworkInterface) {
        push_unique(&mut self.network_interfaces, iface);
    }

    /// Add a user unless one with the same login is already present.
    pub fn add_user(&mut self, user: User) {
        if !self.users.iter().any(|u| u.login == user.login) {
            self.users.push(user);
        }
    }

    pub fn remove_all_users(&mut self) {
        self.users.clear();
    }

    pub fn add_bundle(&mut self, name: impl Into<String>) {
        push_unique(&mut self.bundles, name.into());
    }

    pub fn remove_bundle(&mut self, name: &str) {
        self.bundles.retain(|b| b != name);
    }

    pub fn add_user_bundle(&mut self, name: impl Into<String>) {
        push_unique(&mut self.user_bundles, name.into());
    }

    pub fn remove_user_bundle(&mut self, name: &str) {
        self.user_bundles.retain(|b| b != name);
    }

    /// Add arguments to the kernel command line, skipping ones already listed.
    pub fn add_extra_kernel_arguments<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let holder = self.kernel_arguments.get_or_insert_with(KernelArguments::default);
        for arg in args {
            push_unique(&mut holder.add, arg.into());
        }
    }

    /// Remove arguments from the kernel command line, skipping ones already listed.
    pub fn remove_kernel_arguments<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let holder = self.kernel_arguments.get_or_insert_with(KernelArguments::default);
        for arg in args {
            push_unique(&mut holder.remove, arg.into());
        }
    }

    /// Record the telemetry decision.
    pub fn enable_telemetry(&mut self, enabled: bool) {
        self.telemetry
            .get_or_insert_with(Telemetry::default)
            .enabled = enabled;
    }

    pub fn set_keyboard(&mut self, keyboard: impl Into<String>) {
        self.keyboard = Some(keyboard.into());
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    pub fn set_timezone(&mut self, timezone: impl Into<String>) {
        self.timezone = Some(timezone.into());
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = Some(hostname.into());
    }

    pub fn set_kernel(&mut self, kernel: impl Into<String>) {
        self.kernel = Some(kernel.into());
    }

    pub fn set_http_proxy(&mut self, proxy: Option<String>) {
        self.http_proxy = proxy;
    }

    pub fn set_auto_update(&mut self, enabled: bool) {
        self.auto_update = enabled;
    }

    pub fn set_post_reboot(&mut self, enabled: bool) {
        self.post_reboot = enabled;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// False until a decision is recorded, then the recorded flag.
    pub fn is_telemetry_enabled(&self) -> bool {
        self.telemetry.as_ref().is_some_and(|t| t.enabled)
    }

    pub fn contains_bundle(&self, name: &str) -> bool {
        self.bundles.iter().any(|b| b == name)
    }

    pub fn contains_user_bundle(&self, name: &str) -> bool {
        self.user_bundles.iter().any(|b| b == name)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn target_media(&self) -> &[BlockDevice] {
        &self.target_media
    }

    pub fn network_interfaces(&self) -> &[NetworkInterface] {
        &self.network_interfaces
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn bundles(&self) -> &[String] {
        &self.bundles
    }

    pub fn user_bundles(&self) -> &[String] {
        &self.user_bundles
    }

    /// Required bundles followed by user bundles, without repeats.
    pub fn all_bundles(&self) -> Vec<&str> {
        let mut all: Vec<&str> = Vec::with_capacity(self.bundles.len() + self.user_bundles.len());
        for name in self.bundles.iter().chain(&self.user_bundles) {
            if !all.contains(&name.as_str()) {
                all.push(name);
            }
        }
        all
    }

    pub fn kernel_arguments(&self) -> Option<&KernelArguments> {
        self.kernel_arguments.as_ref()
    }

    pub fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_ref()
    }

    /// Keyboard layout, if set to something non-blank.
    pub fn keyboard(&self) -> Option<&str> {
        non_empty(&self.keyboard)
    }

    /// System language, if set to something non-blank.
    pub fn language(&self) -> Option<&str> {
        non_empty(&self.language)
    }

    pub fn timezone(&self) -> Option<&str> {
        non_empty(&self.timezone)
    }

    pub fn hostname(&self) -> Option<&str> {
        non_empty(&self.hostname)
    }

    pub fn kernel(&self) -> Option<&str> {
        non_empty(&self.kernel)
    }

    pub fn http_proxy(&self) -> Option<&str> {
        non_empty(&self.http_proxy)
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn post_reboot(&self) -> bool {
        self.post_reboot
    }

    // ------------------------------------------------------------------
    // Descriptor support
    // ------------------------------------------------------------------

    /// Take the alias declarations out of a freshly parsed plan.
    pub(crate) fn take_aliases(&mut self) -> Vec<DeviceAlias> {
        std::mem::take(&mut self.aliases)
    }

    pub(crate) fn target_media_mut(&mut self) -> &mut [BlockDevice] {
        &mut self.target_media
    }

    /// Re-apply the de-duplication rules to collections read from a file.
    pub(crate) fn normalize(&mut self) {
        let parsed = std::mem::take(self);
        let aliases = parsed.aliases;

        let mut plan = SystemInstall {
            version: parsed.version,
            keyboard: parsed.keyboard,
            language: parsed.language,
            timezone: parsed.timezone,
            hostname: parsed.hostname,
            kernel: parsed.kernel,
            telemetry: parsed.telemetry,
            http_proxy: parsed.http_proxy,
            auto_update: parsed.auto_update,
            post_reboot: parsed.post_reboot,
            aliases,
            ..SystemInstall::default()
        };

        parsed.target_media.into_iter().for_each(|d| plan.add_target_media(d));
        parsed
            .network_interfaces
            .into_iter()
            .for_each(|i| plan.add_network_interface(i));
        parsed.users.into_iter().for_each(|u| plan.add_user(u));
        parsed.bundles.into_iter().for_each(|b| plan.add_bundle(b));
        parsed.user_bundles.into_iter().for_each(|b| plan.add_user_bundle(b));
        if let Some(args) = parsed.kernel_arguments {
            plan.add_extra_kernel_arguments(args.add);
            plan.remove_kernel_arguments(args.remove);
        }

        *self = plan;
    }
}
