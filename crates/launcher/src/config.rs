// SPDX-License-Identifier: MIT

//! Daemon configuration, loaded from the environment (ambient stack; CLI
//! argument parsing itself is out of scope, spec §1). Mirrors the
//! teacher daemon's `env.rs`: one function per setting, each with a
//! sensible default, composed here into a single [`Config`] the rest of
//! the crate is built around.

use std::path::PathBuf;
use std::time::Duration;

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_usize(var: &str, default: usize) -> usize {
    std::env::var(var).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_bool(var: &str, default: bool) -> bool {
    std::env::var(var).ok().map(|s| matches!(s.as_str(), "1" | "true" | "yes")).unwrap_or(default)
}

/// Runtime configuration, entirely environment-driven (spec §1's
/// "option/config file loading" is named out of scope; reading
/// `IOT_LAUNCHERD_*` is the ambient substitute every other already-ported
/// crate in this workspace gets via its own `Config`/env module).
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the launcher-helper transport listens (spec §4.7, §6).
    pub helper_address: String,
    /// Where application clients connect (spec §4.7, §6).
    pub app_address: String,

    pub manifest_common_dir: PathBuf,
    pub manifest_user_root: PathBuf,
    pub manifest_caching: bool,

    pub cgroup_mount_point: PathBuf,
    pub cgroup_name: String,
    pub cgroup_release_agent: PathBuf,

    /// Default SIGTERM-to-SIGKILL escalation delay for `stop` (spec §4.7,
    /// §9 "treat 3 s as the default and make it configurable").
    pub stop_timeout: Duration,

    /// Bound on the interned event-name table (spec §4.8).
    pub max_events: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            helper_address: env_string("IOT_LAUNCHERD_HELPER_ADDRESS", "unix:/run/iot-launcher/socket"),
            app_address: env_string("IOT_LAUNCHERD_APP_ADDRESS", "unix:/run/iot-launcher/app-socket"),
            manifest_common_dir: env_path("IOT_LAUNCHERD_MANIFEST_DIR", "/etc/iot-launcher/manifests"),
            manifest_user_root: env_path("IOT_LAUNCHERD_MANIFEST_USER_ROOT", "/etc/iot-launcher/manifests/users"),
            manifest_caching: env_bool("IOT_LAUNCHERD_MANIFEST_CACHE", true),
            cgroup_mount_point: env_path("IOT_LAUNCHERD_CGROUP_MOUNT", "/sys/fs/cgroup"),
            cgroup_name: env_string("IOT_LAUNCHERD_CGROUP_NAME", "iot-launcher"),
            cgroup_release_agent: env_path("IOT_LAUNCHERD_RELEASE_AGENT", "/usr/libexec/iot-launcher/release-agent"),
            stop_timeout: Duration::from_millis(env_u64("IOT_LAUNCHERD_STOP_TIMEOUT_MS", 3000)),
            max_events: env_usize("IOT_LAUNCHERD_MAX_EVENTS", crate::events::DEFAULT_MAX_EVENTS),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
