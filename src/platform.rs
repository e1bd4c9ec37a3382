//SPDX-License-Identifier: MPL-2.0

/*!
The platform host object: identity, leaderboards and achievements as script sees them.

Promise-returning functions validate their callables on the host thread, then do the
blocking vendor work on the thread pool.  Argument problems found on the pool reject the
promise with the invalid-argument code.
*/

use std::sync::Arc;

use crate::call_manager::CallManager;
use crate::error::Error;
use crate::host_thread::HostLoop;
use crate::leaderboards::{LeaderboardHandle, LeaderboardTable, MAX_DETAIL_BYTES, pack_detail_bytes};
use crate::promise::execute_promise_on_thread_pool;
use crate::thread_pool::ThreadPool;
use crate::value::{ScriptArg, Value};

/// Converts script detail bytes into packed words.  `Empty` means no detail.
fn detail_words(detail: &Value) -> Result<Vec<i32>, Error> {
    let elements = match detail {
        Value::Empty => return Ok(Vec::new()),
        Value::Array(elements) => elements,
        other => return Err(Error::invalid_argument(format!("detail must be an array, got {other:?}"))),
    };
    if elements.len() > MAX_DETAIL_BYTES {
        return Err(Error::invalid_argument(format!(
            "detail has {} bytes; at most {MAX_DETAIL_BYTES} are allowed",
            elements.len()
        )));
    }
    let bytes = elements
        .iter()
        .map(|element| match element {
            Value::Int(i) => u8::try_from(*i).map_err(|_| Error::invalid_argument(format!("detail byte {i} out of range"))),
            other => Err(Error::invalid_argument(format!("detail byte must be an integer, got {other:?}"))),
        })
        .collect::<Result<Vec<u8>, Error>>()?;
    Ok(pack_detail_bytes(&bytes))
}

fn small_handle(handle: i32) -> Result<LeaderboardHandle, Error> {
    u32::try_from(handle)
        .map(LeaderboardHandle::from_raw)
        .map_err(|_| Error::invalid_argument(format!("leaderboard handle {handle} is negative")))
}

/**
Script-facing access to the vendor services.

Cheap to clone; clones share the manager, the handle table and the pool.
*/
#[derive(Clone)]
pub struct PlatformHost {
    manager: Arc<CallManager>,
    leaderboards: Arc<LeaderboardTable>,
    pool: Arc<ThreadPool>,
}

impl PlatformHost {
    pub fn new(manager: Arc<CallManager>, pool: Arc<ThreadPool>) -> Self {
        PlatformHost {
            manager,
            leaderboards: Arc::new(LeaderboardTable::new()),
            pool,
        }
    }

    pub fn user_name(&self) -> String {
        self.manager.user_name()
    }

    pub fn get_achievement(&self, id: &str) -> Result<bool, Error> {
        self.manager.get_achievement(id)
    }

    /// The synchronous setter; script schedules [`PlatformHost::resolve_store_achievements`] itself.
    pub fn set_achievement(&self, id: &str) -> Result<bool, Error> {
        self.manager.set_achievement(id)
    }

    /// Resolves with the small handle (an integer) for the named leaderboard.
    pub fn resolve_get_leaderboard(
        &self,
        host: &HostLoop,
        resolve: &ScriptArg,
        reject: &ScriptArg,
        name: &str,
    ) -> Result<(), Error> {
        let manager = self.manager.clone();
        let leaderboards = self.leaderboards.clone();
        let name = name.to_string();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            let handle = leaderboards.resolve(&name, |name| manager.get_leaderboard(name))?;
            i32::try_from(handle.raw())
                .map(Value::Int)
                .map_err(|_| Error::failed("leaderboard handle table overflowed"))
        })
    }

    /**
    Uploads `score` to the leaderboard behind `handle`.

    `detail` is `Empty` or an array of at most 256 integers in `0..=255`, packed four bytes to a
    word.  Resolves with whether the stored entry changed.
    */
    pub fn resolve_set_leaderboard_entry(
        &self,
        host: &HostLoop,
        resolve: &ScriptArg,
        reject: &ScriptArg,
        handle: i32,
        score: i32,
        detail: Value,
    ) -> Result<(), Error> {
        let manager = self.manager.clone();
        let leaderboards = self.leaderboards.clone();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            let words = detail_words(&detail)?;
            let native = leaderboards.native(small_handle(handle)?)?;
            manager.set_leaderboard_entry(native, score, &words).map(Value::Bool)
        })
    }

    /// Resolves with `[name, score, name, score, ...]` in the order the vendor reported.
    pub fn resolve_get_friend_leaderboard_entries(
        &self,
        host: &HostLoop,
        resolve: &ScriptArg,
        reject: &ScriptArg,
        handle: i32,
    ) -> Result<(), Error> {
        let manager = self.manager.clone();
        let leaderboards = self.leaderboards.clone();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            let native = leaderboards.native(small_handle(handle)?)?;
            let entries = manager.get_friend_leaderboard_entries(native)?;
            let flattened = entries
                .into_iter()
                .flat_map(|entry| [Value::String(entry.name), Value::Int(entry.score)])
                .collect();
            Ok(Value::Array(flattened))
        })
    }

    pub fn resolve_set_achievement(
        &self,
        host: &HostLoop,
        resolve: &ScriptArg,
        reject: &ScriptArg,
        id: &str,
    ) -> Result<(), Error> {
        let manager = self.manager.clone();
        let id = id.to_string();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            manager.set_achievement(&id).map(Value::Bool)
        })
    }

    /// Resolves with no value once the store request has been sent.
    pub fn resolve_store_achievements(&self, host: &HostLoop, resolve: &ScriptArg, reject: &ScriptArg) -> Result<(), Error> {
        let manager = self.manager.clone();
        execute_promise_on_thread_pool(host, &self.pool, resolve, reject, move || {
            manager.store_achievements().map(|()| Value::Empty)
        })
    }
}
