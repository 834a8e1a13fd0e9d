// SPDX-License-Identifier: MIT

//! iot-launcherd: the application launcher daemon (spec §1, §4.7).

use std::process::ExitCode;

use iotfw_launcher::{AllowAllGate, CgroupController, Config, Launcher, Store};
use iotfw_wire::ClientKind;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    match run(config) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            tracing::error!(error = %err, "iot-launcherd exiting");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> iotfw_launcher::Result<i32> {
    let store = Store::new(config.manifest_common_dir.clone(), config.manifest_user_root.clone(), config.manifest_caching);

    let cgroup = match CgroupController::mount(&config.cgroup_mount_point, &config.cgroup_name, &config.cgroup_release_agent) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(error = %err, "cgroup mount failed, falling back to an unmounted directory (requires root in production)");
            std::fs::create_dir_all(config.cgroup_mount_point.join(&config.cgroup_name)).ok();
            CgroupController::attached(config.cgroup_mount_point.join(&config.cgroup_name))
        }
    };

    let gate = Box::new(AllowAllGate);
    let stop_timeout_usec = config.stop_timeout.as_micros() as i64;

    let mut launcher = Launcher::new(store, cgroup, config.cgroup_name.clone(), gate, stop_timeout_usec)?;
    launcher.init_hooks()?;
    launcher.listen(&config.helper_address, ClientKind::LauncherHelper)?;
    launcher.listen(&config.app_address, ClientKind::Application)?;

    tracing::info!(helper = %config.helper_address, app = %config.app_address, "iot-launcherd listening");
    launcher.run()
}
