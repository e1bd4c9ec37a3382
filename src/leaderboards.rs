//SPDX-License-Identifier: MPL-2.0

/*!
Small leaderboard handles and score detail packing.

Script numbers can't hold the vendor's 64-bit leaderboard handles precisely, so script
sees densely numbered small handles instead.  Handles start at 1, are stable for the life
of the process, and are never reused.
*/

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Error;
use crate::vendor::NativeLeaderboard;

/// Most detail bytes a single leaderboard entry can carry.
pub const MAX_DETAIL_BYTES: usize = 256;

/// A process-local substitute for a [`NativeLeaderboard`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaderboardHandle(u32);

impl LeaderboardHandle {
    pub fn from_raw(raw: u32) -> Self {
        LeaderboardHandle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Table {
    natives: Vec<NativeLeaderboard>,
    by_name: HashMap<String, LeaderboardHandle>,
}

/**
Append-only mapping between leaderboard names, small handles and native handles.

One lock covers both the sequence and the name map, held only for lookup-or-insert.
Resolving an unknown name happens outside the lock, so two first lookups of the same
name may both reach the vendor; the first to record wins and the other's native handle
is discarded.  A name therefore maps to exactly one small handle.
*/
#[derive(Debug, Default)]
pub struct LeaderboardTable {
    table: Mutex<Table>,
}

impl LeaderboardTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, name: &str) -> Option<LeaderboardHandle> {
        self.lock().by_name.get(name).copied()
    }

    /// Records `native` for `name` unless the name is already known, returning the name's handle.
    pub fn record(&self, name: &str, native: NativeLeaderboard) -> LeaderboardHandle {
        let mut table = self.lock();
        if let Some(existing) = table.by_name.get(name) {
            logwise::debuginternal_sync!(
                "Leaderboard {name} was resolved concurrently; keeping handle {handle}",
                name = logwise::privacy::LogIt(name),
                handle = existing.0
            );
            return *existing;
        }
        table.natives.push(native);
        let handle = LeaderboardHandle(table.natives.len() as u32);
        table.by_name.insert(name.to_string(), handle);
        handle
    }

    /**
    Returns the small handle for `name`, calling `resolve` (outside the lock) the first time
    the name is seen.
    */
    pub fn resolve<F>(&self, name: &str, resolve: F) -> Result<LeaderboardHandle, Error>
    where
        F: FnOnce(&str) -> Result<NativeLeaderboard, Error>,
    {
        if let Some(handle) = self.lookup(name) {
            return Ok(handle);
        }
        let native = resolve(name)?;
        Ok(self.record(name, native))
    }

    pub fn native(&self, handle: LeaderboardHandle) -> Result<NativeLeaderboard, Error> {
        let table = self.lock();
        handle
            .0
            .checked_sub(1)
            .and_then(|index| table.natives.get(index as usize).copied())
            .ok_or_else(|| Error::invalid_argument(format!("unknown leaderboard handle {}", handle.0)))
    }

    pub fn len(&self) -> usize {
        self.lock().natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/**
Packs detail bytes four to a 32-bit word, little-end first.  A trailing partial word is
zero-padded in its unused high bytes.
*/
pub fn pack_detail_bytes(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            i32::from_le_bytes(word)
        })
        .collect()
}
