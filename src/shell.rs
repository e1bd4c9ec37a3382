//SPDX-License-Identifier: MPL-2.0

/*!
Process-level composition: starting the shell and closing it in order.

A [`Shell`] lives on the host thread.  The embedding program creates a [`HostLoop`],
calls [`Shell::start`], exposes [`Shell::platform`] and [`Shell::window`] to script, and
calls [`Shell::close`] when the window closes.  Fatal startup errors become the process
exit code through [`Error::exit_code`].
*/

use std::path::PathBuf;
use std::sync::Arc;

use crate::call_manager::{CallManager, CallManagerConfig};
use crate::error::Error;
use crate::host_thread::HostLoop;
use crate::platform::PlatformHost;
use crate::settings::PresentationSettings;
use crate::storage::{DataPaths, load_local_storage, save_local_storage};
use crate::thread_pool::{ThreadPool, ThreadPoolConfig};
use crate::vendor::Vendor;
use crate::window::{WindowControl, WindowHost};

#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    /// Names the data directory.
    pub app_name: String,
    /// Overrides `<local data dir>/<app_name>`.
    pub data_root: Option<PathBuf>,
    pub call_manager: CallManagerConfig,
    pub thread_pool: ThreadPoolConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            app_name: "SIC-1".to_string(),
            data_root: None,
            call_manager: CallManagerConfig::default(),
            thread_pool: ThreadPoolConfig::default(),
        }
    }
}

pub struct Shell {
    vendor: Arc<dyn Vendor>,
    manager: Arc<CallManager>,
    pool: Arc<ThreadPool>,
    paths: DataPaths,
    platform: PlatformHost,
    window: WindowHost,
}

impl Shell {
    pub fn start(config: ShellConfig, vendor: Arc<dyn Vendor>, window_control: Box<dyn WindowControl>) -> Result<Shell, Error> {
        let paths = match config.data_root {
            Some(root) => DataPaths::new(root),
            None => DataPaths::for_app(&config.app_name)?,
        };
        let local_storage = load_local_storage(&paths.local_storage_file())?;
        let settings = Arc::new(PresentationSettings::load(&paths.settings_file())?);

        let manager = Arc::new(CallManager::new(vendor.clone(), config.call_manager)?);
        let pool = Arc::new(ThreadPool::new(config.thread_pool)?);
        let platform = PlatformHost::new(manager.clone(), pool.clone());
        let window = WindowHost::new(window_control, settings, local_storage, paths.clone(), pool.clone());
        logwise::info_sync!("Shell started");
        Ok(Shell {
            vendor,
            manager,
            pool,
            paths,
            platform,
            window,
        })
    }

    pub fn platform(&self) -> &PlatformHost {
        &self.platform
    }

    pub fn window(&self) -> &WindowHost {
        &self.window
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /**
    Closes the shell.

    Runs the window's closing flow, then drains the thread pool while `host` keeps delivering
    promise settlements.  Only then are local storage and (if script changed them) settings
    written, so no earlier persist request can overwrite them.  Finally stops the call manager
    and releases the vendor.  Every step runs; the first
    failure is returned.
    */
    pub fn close(self, host: &HostLoop) -> Result<(), Error> {
        let mut first_error: Option<Error> = None;
        let mut record = |result: Result<(), Error>, step: &str| {
            if let Err(e) = result {
                logwise::error_sync!(
                    "Shell close step {step} failed: {err}",
                    step = logwise::privacy::LogIt(step),
                    err = logwise::privacy::LogIt(&e)
                );
                first_error.get_or_insert(e);
            }
        };

        let state = self.window.on_closing();

        //queued persist jobs captured older data; they must land before the final writes
        let sender = host.sender();
        let drained = self.pool.cleanup(move || sender.quit());
        let pool_started = drained.is_ok();
        record(drained, "thread pool");
        if pool_started {
            host.run();
        }

        if let Some(data) = &state.local_storage {
            record(save_local_storage(&self.paths.local_storage_file(), data), "local storage");
        }
        if state.settings_modified {
            record(self.window.settings().save(&self.paths.settings_file()), "settings");
        }

        record(self.manager.shutdown(), "call manager");
        self.vendor.shutdown();
        logwise::info_sync!("Shell closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
