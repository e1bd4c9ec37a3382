//SPDX-License-Identifier: MPL-2.0

/*!
In-memory stand-ins for the vendor SDK and the platform window.

These are public so integration tests can drive the whole stack.  They behave like the
real collaborators where it matters: call results and stats notifications are only
delivered from inside [`Vendor::run_callbacks`], on whatever thread calls it.
*/

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::vendor::{
    CallHandle, CallResult, CallResultCallback, LeaderboardEntry, LeaderboardFindResult, NativeLeaderboard,
    ScoreUploadedResult, ScoresDownloadedResult, StatsListener, StatsResult, UploadScoreMethod, Vendor,
};
use crate::window::WindowControl;

/// The callback-driven operations a [`ScriptedVendor`] tracks separately.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ScriptedCall {
    Find,
    Upload,
    Download,
}

struct PendingCall {
    handle: CallHandle,
    kind: ScriptedCall,
    result: CallResult,
    io_failed: bool,
    ready_at_pump: usize,
    callback: Option<CallResultCallback>,
}

enum StatsEvent {
    Received(u32, StatsResult),
    Stored(u32, StatsResult),
    AchievementStored(u32, String),
}

#[derive(Default)]
struct Script {
    next_handle: u64,
    leaderboards: HashMap<String, NativeLeaderboard>,
    best: HashMap<NativeLeaderboard, (i32, Vec<i32>)>,
    friends: HashMap<NativeLeaderboard, Vec<LeaderboardEntry>>,
    achieved: HashSet<String>,
    unstored: Vec<String>,
    persona_name: String,

    fail_io: usize,
    refuse_starts: usize,
    drop_callbacks: usize,
    hold: bool,
    pumps_per_completion: usize,
    stats_ok: bool,
    refuse_stats: bool,
    panic_next_pump: bool,

    pending: Vec<PendingCall>,
    stats_events: Vec<StatsEvent>,
    listener: Option<Weak<dyn StatsListener>>,

    active: HashMap<ScriptedCall, usize>,
    max_active: HashMap<ScriptedCall, usize>,
    started_calls: usize,
    pump_count: usize,
    set_achievement_calls: usize,
    stores: usize,
    shut_down: bool,
}

/**
A programmable [`Vendor`].

Leaderboard scores keep the lowest value under [`UploadScoreMethod::KeepBest`].
*/
pub struct ScriptedVendor {
    app_id: u32,
    script: Mutex<Script>,
}

impl ScriptedVendor {
    pub fn new(app_id: u32) -> Self {
        ScriptedVendor {
            app_id,
            script: Mutex::new(Script {
                next_handle: 1,
                persona_name: "Player".to_string(),
                stats_ok: true,
                ..Script::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_leaderboard(&self, name: &str) -> NativeLeaderboard {
        let mut script = self.lock();
        let native = NativeLeaderboard(0x1000_0000_0000 + script.leaderboards.len() as u64 + 1);
        *script.leaderboards.entry(name.to_string()).or_insert(native)
    }

    pub fn add_friend_entry(&self, leaderboard: NativeLeaderboard, name: &str, score: i32) {
        self.lock().friends.entry(leaderboard).or_default().push(LeaderboardEntry {
            name: name.to_string(),
            score,
        });
    }

    pub fn set_persona_name(&self, name: &str) {
        self.lock().persona_name = name.to_string();
    }

    pub fn grant_achievement(&self, id: &str) {
        self.lock().achieved.insert(id.to_string());
    }

    /// The next `count` calls report a transport failure.
    pub fn fail_next_calls_with_io(&self, count: usize) {
        self.lock().fail_io = count;
    }

    /// The next `count` start functions return the invalid handle.
    pub fn refuse_next_starts(&self, count: usize) {
        self.lock().refuse_starts = count;
    }

    /// The next `count` registered callbacks are dropped without being invoked.
    pub fn drop_next_callbacks(&self, count: usize) {
        self.lock().drop_callbacks = count;
    }

    /// While held, no call result is delivered.
    pub fn hold_completions(&self, hold: bool) {
        self.lock().hold = hold;
    }

    /// Results become deliverable only after this many further pump passes.
    pub fn set_pumps_per_completion(&self, pumps: usize) {
        self.lock().pumps_per_completion = pumps;
    }

    /// Whether stats requests succeed.
    pub fn set_stats_ok(&self, ok: bool) {
        self.lock().stats_ok = ok;
    }

    pub fn refuse_stats_requests(&self, refuse: bool) {
        self.lock().refuse_stats = refuse;
    }

    /// The next [`Vendor::run_callbacks`] panics after counting the pass, as a crashing SDK would.
    pub fn panic_next_pump(&self) {
        self.lock().panic_next_pump = true;
    }

    /// Queues a stats-received notification as if it came from `app_id`.
    pub fn queue_stats_received(&self, app_id: u32, result: StatsResult) {
        self.lock().stats_events.push(StatsEvent::Received(app_id, result));
    }

    pub fn started_calls(&self) -> usize {
        self.lock().started_calls
    }

    pub fn pump_count(&self) -> usize {
        self.lock().pump_count
    }

    /// Most calls of `kind` ever in flight at once.
    pub fn max_concurrent(&self, kind: ScriptedCall) -> usize {
        self.lock().max_active.get(&kind).copied().unwrap_or(0)
    }

    pub fn set_achievement_calls(&self) -> usize {
        self.lock().set_achievement_calls
    }

    pub fn stores(&self) -> usize {
        self.lock().stores
    }

    /// Details stored with the current best entry.
    pub fn uploaded_details(&self, leaderboard: NativeLeaderboard) -> Option<Vec<i32>> {
        self.lock().best.get(&leaderboard).map(|(_, details)| details.clone())
    }

    pub fn best_score(&self, leaderboard: NativeLeaderboard) -> Option<i32> {
        self.lock().best.get(&leaderboard).map(|(score, _)| *score)
    }

    pub fn was_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    fn start(&self, kind: ScriptedCall, result: impl FnOnce(&mut Script) -> CallResult) -> CallHandle {
        let mut script = self.lock();
        if script.refuse_starts > 0 {
            script.refuse_starts -= 1;
            return CallHandle::INVALID;
        }
        let io_failed = script.fail_io > 0;
        if io_failed {
            script.fail_io -= 1;
        }
        let result = result(&mut *script);
        let handle = CallHandle(script.next_handle);
        script.next_handle += 1;
        script.started_calls += 1;
        let active = script.active.entry(kind).or_default();
        *active += 1;
        let active = *active;
        let max = script.max_active.entry(kind).or_default();
        *max = (*max).max(active);
        let ready_at_pump = script.pump_count + script.pumps_per_completion;
        script.pending.push(PendingCall {
            handle,
            kind,
            result,
            io_failed,
            ready_at_pump,
            callback: None,
        });
        handle
    }

    fn finish(script: &mut Script, kind: ScriptedCall) {
        if let Some(active) = script.active.get_mut(&kind) {
            *active = active.saturating_sub(1);
        }
    }
}

impl Vendor for ScriptedVendor {
    fn app_id(&self) -> u32 {
        self.app_id
    }

    fn persona_name(&self) -> String {
        self.lock().persona_name.clone()
    }

    fn find_leaderboard(&self, name: &str) -> CallHandle {
        self.start(ScriptedCall::Find, |script| {
            let found = script.leaderboards.get(name).copied();
            CallResult::LeaderboardFound(LeaderboardFindResult {
                leaderboard: found.unwrap_or(NativeLeaderboard(0)),
                found: found.is_some(),
            })
        })
    }

    fn upload_leaderboard_score(
        &self,
        leaderboard: NativeLeaderboard,
        method: UploadScoreMethod,
        score: i32,
        details: &[i32],
    ) -> CallHandle {
        self.start(ScriptedCall::Upload, |script| {
            if !script.leaderboards.values().any(|l| *l == leaderboard) {
                return CallResult::ScoreUploaded(ScoreUploadedResult {
                    success: false,
                    score_changed: false,
                });
            }
            let changed = match (method, script.best.get(&leaderboard)) {
                (UploadScoreMethod::KeepBest, Some((best, _))) => score < *best,
                _ => true,
            };
            if changed {
                script.best.insert(leaderboard, (score, details.to_vec()));
            }
            CallResult::ScoreUploaded(ScoreUploadedResult {
                success: true,
                score_changed: changed,
            })
        })
    }

    fn download_friend_scores(&self, leaderboard: NativeLeaderboard) -> CallHandle {
        self.start(ScriptedCall::Download, |script| {
            CallResult::ScoresDownloaded(ScoresDownloadedResult {
                leaderboard,
                entries: script.friends.get(&leaderboard).cloned().unwrap_or_default(),
            })
        })
    }

    fn set_call_result(&self, call: CallHandle, callback: CallResultCallback) {
        let dropped = {
            let mut script = self.lock();
            let Some(index) = script.pending.iter().position(|p| p.handle == call) else {
                return;
            };
            if script.drop_callbacks > 0 {
                script.drop_callbacks -= 1;
                let pending = script.pending.remove(index);
                Self::finish(&mut *script, pending.kind);
                Some(callback)
            } else {
                script.pending[index].callback = Some(callback);
                None
            }
        };
        //dropping a completion runs its cleanup; keep that outside the lock
        drop(dropped);
    }

    fn request_current_stats(&self) -> bool {
        let mut script = self.lock();
        if script.refuse_stats {
            return false;
        }
        let result = if script.stats_ok { StatsResult::Ok } else { StatsResult::Failed };
        script.stats_events.push(StatsEvent::Received(self.app_id, result));
        true
    }

    fn store_stats(&self) -> bool {
        let mut script = self.lock();
        script.stores += 1;
        let stored = std::mem::take(&mut script.unstored);
        for id in stored {
            script.stats_events.push(StatsEvent::AchievementStored(self.app_id, id));
        }
        script.stats_events.push(StatsEvent::Stored(self.app_id, StatsResult::Ok));
        true
    }

    fn achievement(&self, id: &str) -> Option<bool> {
        Some(self.lock().achieved.contains(id))
    }

    fn set_achievement(&self, id: &str) -> bool {
        let mut script = self.lock();
        script.set_achievement_calls += 1;
        if script.achieved.insert(id.to_string()) {
            script.unstored.push(id.to_string());
        }
        true
    }

    fn set_stats_listener(&self, listener: Weak<dyn StatsListener>) {
        self.lock().listener = Some(listener);
    }

    fn run_callbacks(&self) {
        let (ready, events, listener) = {
            let mut script = self.lock();
            script.pump_count += 1;
            if script.panic_next_pump {
                script.panic_next_pump = false;
                drop(script);
                panic!("scripted vendor crashed while pumping");
            }
            let mut ready = Vec::new();
            if !script.hold {
                let pump = script.pump_count;
                let mut index = 0;
                while index < script.pending.len() {
                    let deliverable = script.pending[index].callback.is_some() && script.pending[index].ready_at_pump < pump;
                    if deliverable {
                        let pending = script.pending.remove(index);
                        Self::finish(&mut *script, pending.kind);
                        ready.push(pending);
                    } else {
                        index += 1;
                    }
                }
            }
            let events = std::mem::take(&mut script.stats_events);
            (ready, events, script.listener.clone())
        };
        //notifications first, so a caller released below has seen every earlier notification
        if let Some(listener) = listener.and_then(|l| l.upgrade()) {
            for event in events {
                match event {
                    StatsEvent::Received(app_id, result) => listener.user_stats_received(app_id, result),
                    StatsEvent::Stored(app_id, result) => listener.user_stats_stored(app_id, result),
                    StatsEvent::AchievementStored(app_id, id) => listener.achievement_stored(app_id, &id),
                }
            }
        }
        for pending in ready {
            if let Some(callback) = pending.callback {
                callback.invoke(pending.result, pending.io_failed);
            }
        }
    }

    fn shutdown(&self) {
        self.lock().shut_down = true;
    }
}

#[derive(Default)]
struct WindowRecord {
    requests: Vec<bool>,
    refuse: bool,
}

/// A [`WindowControl`] that records fullscreen requests.  Clones share their record.
#[derive(Clone, Default)]
pub struct RecordingWindow {
    record: Arc<Mutex<WindowRecord>>,
}

impl RecordingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later requests fail.
    pub fn refuse(&self, refuse: bool) {
        self.record.lock().unwrap_or_else(PoisonError::into_inner).refuse = refuse;
    }

    pub fn requests(&self) -> Vec<bool> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner).requests.clone()
    }
}

impl WindowControl for RecordingWindow {
    fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        record.requests.push(fullscreen);
        !record.refuse
    }
}
