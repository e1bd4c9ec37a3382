//SPDX-License-Identifier: MPL-2.0

/*!
The window host object: fullscreen, presentation settings, local storage and closing.

The platform window itself is out of reach of this crate; it is driven through the
[`WindowControl`] trait.  [`WindowHost`] lives on the host thread.
*/

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::error::Error;
use crate::host_thread::HostLoop;
use crate::promise::execute_promise_on_thread_pool;
use crate::settings::PresentationSettings;
use crate::storage::{DataPaths, save_local_storage};
use crate::thread_pool::ThreadPool;
use crate::value::{HostFunction, ScriptArg, Value};

/**
The platform window.
*/
pub trait WindowControl {
    /// Enters or leaves fullscreen.  Returns whether the change took effect.
    fn set_fullscreen(&mut self, fullscreen: bool) -> bool;
}

/// What the shell needs to persist once the window has started closing.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosingState {
    /// Whether script changed presentation settings during the session.
    pub settings_modified: bool,
    pub local_storage: Option<String>,
}

pub struct WindowHost {
    control: RefCell<Box<dyn WindowControl>>,
    fullscreen: Cell<bool>,
    settings: Arc<PresentationSettings>,
    local_storage: RefCell<Option<String>>,
    on_closing: RefCell<Option<HostFunction>>,
    closing: Cell<bool>,
    paths: DataPaths,
    pool: Arc<ThreadPool>,
}

impl WindowHost {
    /// Creates the host object, entering fullscreen right away if the settings ask for it.
    pub fn new(
        control: Box<dyn WindowControl>,
        settings: Arc<PresentationSettings>,
        local_storage: Option<String>,
        paths: DataPaths,
        pool: Arc<ThreadPool>,
    ) -> WindowHost {
        let host = WindowHost {
            control: RefCell::new(control),
            fullscreen: Cell::new(false),
            settings,
            local_storage: RefCell::new(local_storage),
            on_closing: RefCell::new(None),
            closing: Cell::new(false),
            paths,
            pool,
        };
        if host.settings.fullscreen() {
            host.set_fullscreen(true);
        }
        host
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen.get()
    }

    /// Best effort; the state only changes if the platform window reports success.
    pub fn set_fullscreen(&self, fullscreen: bool) {
        if self.fullscreen.get() == fullscreen {
            return;
        }
        if self.control.borrow_mut().set_fullscreen(fullscreen) {
            self.fullscreen.set(fullscreen);
        } else {
            logwise::warn_sync!("Platform window refused fullscreen change to {fullscreen}", fullscreen = fullscreen);
        }
    }

    pub fn presentation_setting(&self, name: &str) -> Result<Value, Error> {
        self.settings.get(name)
    }

    pub fn set_presentation_setting(&self, name: &str, value: &Value) -> Result<(), Error> {
        self.settings.set(name, value)
    }

    pub fn settings(&self) -> &Arc<PresentationSettings> {
        &self.settings
    }

    pub fn local_storage_data(&self) -> Option<String> {
        self.local_storage.borrow().clone()
    }

    pub fn set_local_storage_data(&self, data: String) {
        *self.local_storage.borrow_mut() = Some(data);
    }

    /// Script callback run when the window starts closing.
    pub fn set_on_closing(&self, callback: Option<HostFunction>) {
        *self.on_closing.borrow_mut() = callback;
    }

    pub fn is_closing(&self) -> bool {
        self.closing.get()
    }

    /// Resolves immediately without work; used once closing has begun.
    fn resolve_ignored(resolve: &ScriptArg, reject: &ScriptArg) -> Result<(), Error> {
        let resolve = resolve.as_function()?;
        reject.as_function()?;
        if let Err(e) = resolve.invoke(&[]) {
            logwise::error_sync!("Resolve callback failed: {err}", err = logwise::privacy::LogIt(&e));
        }
        Ok(())
    }

    /// Writes `data` to the local-storage file on the pool.  Ignored once closing has begun.
    pub fn resolve_persist_local_storage(
        &self,
        host: &HostLoop,
        resolve: &ScriptArg,
        reject: &ScriptArg,
        data: String,
    ) -> Result<(), Error> {
        if self.closing.get() {
            return Self::resolve_ignored(resolve, reject);
        }
        let path = self.paths.local_storage_file();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            save_local_storage(&path, &data).map(|()| Value::Empty)
        })
    }

    /// Writes the presentation settings on the pool.  Ignored once closing has begun.
    pub fn resolve_persist_presentation_settings(
        &self,
        host: &HostLoop,
        resolve: &ScriptArg,
        reject: &ScriptArg,
    ) -> Result<(), Error> {
        if self.closing.get() {
            return Self::resolve_ignored(resolve, reject);
        }
        let path = self.paths.settings_file();
        let settings = self.settings.clone();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            settings.save(&path).map(|()| Value::Empty)
        })
    }

    /**
    Starts closing: later persist requests are ignored, and script's closing callback runs,
    giving it a last chance to update the local-storage data.

    The modified flag is captured before the callback runs.
    */
    pub fn on_closing(&self) -> ClosingState {
        let settings_modified = self.settings.is_modified();
        self.closing.set(true);
        let callback = self.on_closing.borrow().clone();
        if let Some(callback) = callback {
            if let Err(e) = callback.invoke(&[]) {
                logwise::error_sync!("Closing callback failed: {err}", err = logwise::privacy::LogIt(&e));
            }
        }
        ClosingState {
            settings_modified,
            local_storage: self.local_storage_data(),
        }
    }
}
