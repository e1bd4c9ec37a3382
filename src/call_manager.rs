//SPDX-License-Identifier: MPL-2.0

/*!
High-level blocking access to the vendor's leaderboard and achievement services.

[`CallManager`] owns one [`SerializedCall`] per callback-driven vendor operation, the
pump worker that services them, and the achievement state machine.  Every method blocks
its calling thread; call them from thread pool workers, never from the host thread.
*/

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::achievements::Achievement;
use crate::error::Error;
use crate::pump::{CallContext, DEFAULT_POLL_INTERVAL, PumpScheduler};
use crate::serialized_call::{CallKind, SerializedCall};
use crate::vendor::{
    CallHandle, CallResult, LeaderboardEntry, LeaderboardFindResult, NativeLeaderboard, ScoreUploadedResult,
    ScoresDownloadedResult, StatsListener, StatsResult, UploadScoreMethod, Vendor,
};

/// Tuning for a [`CallManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallManagerConfig {
    /// How often the pump worker services the vendor while calls are outstanding.
    pub poll_interval: Duration,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        CallManagerConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

fn unexpected(kind: &str, result: &CallResult) -> Error {
    Error::failed(format!("{kind} received an unexpected payload: {result:?}"))
}

/// Resolves a leaderboard name to its native handle.
pub struct FindLeaderboard;

impl CallKind for FindLeaderboard {
    type Args = String;
    type Output = NativeLeaderboard;
    const NAME: &'static str = "find_leaderboard";

    fn start(vendor: &dyn Vendor, name: String) -> CallHandle {
        vendor.find_leaderboard(&name)
    }

    fn translate(result: CallResult) -> Result<NativeLeaderboard, Error> {
        match result {
            CallResult::LeaderboardFound(LeaderboardFindResult { found: false, .. }) => Err(Error::NotFound),
            CallResult::LeaderboardFound(LeaderboardFindResult { leaderboard, .. }) => Ok(leaderboard),
            other => Err(unexpected(Self::NAME, &other)),
        }
    }
}

/// Uploads a score, keeping the better of the old and new entries.  Yields whether the entry changed.
pub struct UploadScore;

impl CallKind for UploadScore {
    type Args = (NativeLeaderboard, i32, Vec<i32>);
    type Output = bool;
    const NAME: &'static str = "upload_score";

    fn start(vendor: &dyn Vendor, (leaderboard, score, details): Self::Args) -> CallHandle {
        vendor.upload_leaderboard_score(leaderboard, UploadScoreMethod::KeepBest, score, &details)
    }

    fn translate(result: CallResult) -> Result<bool, Error> {
        match result {
            CallResult::ScoreUploaded(ScoreUploadedResult { success: false, .. }) => {
                Err(Error::failed("vendor rejected the score upload"))
            }
            CallResult::ScoreUploaded(ScoreUploadedResult { score_changed, .. }) => Ok(score_changed),
            other => Err(unexpected(Self::NAME, &other)),
        }
    }
}

/// Downloads the current user's friends' entries, in vendor order.
pub struct DownloadFriendScores;

impl CallKind for DownloadFriendScores {
    type Args = NativeLeaderboard;
    type Output = Vec<LeaderboardEntry>;
    const NAME: &'static str = "download_friend_scores";

    fn start(vendor: &dyn Vendor, leaderboard: NativeLeaderboard) -> CallHandle {
        vendor.download_friend_scores(leaderboard)
    }

    fn translate(result: CallResult) -> Result<Vec<LeaderboardEntry>, Error> {
        match result {
            CallResult::ScoresDownloaded(ScoresDownloadedResult { entries, .. }) => Ok(entries),
            other => Err(unexpected(Self::NAME, &other)),
        }
    }
}

/// Where the achievement subsystem is in its one-way startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AchievementPhase {
    Uninitialized,
    /// The stats request is outstanding, or it failed and will not be retried.
    Initializing,
    Ready,
}

#[derive(Debug)]
struct TrackerState {
    phase: AchievementPhase,
    awaiting_stats: bool,
    stores_outstanding: u32,
}

/**
Receives stats notifications and keeps the outstanding count honest for requests that
complete through notifications rather than call results.
*/
struct AchievementTracker {
    app_id: u32,
    context: Arc<CallContext>,
    state: Mutex<TrackerState>,
}

impl AchievementTracker {
    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_initialization(&self) {
        {
            let mut state = self.lock();
            state.phase = AchievementPhase::Initializing;
            state.awaiting_stats = true;
        }
        self.context.outstanding().increment();
        if self.context.vendor().request_current_stats() {
            logwise::info_sync!("Requested current stats");
            return;
        }
        logwise::warn_sync!("Vendor refused the stats request; achievements are unavailable");
        let mut state = self.lock();
        if state.awaiting_stats {
            state.awaiting_stats = false;
            state.phase = AchievementPhase::Uninitialized;
            self.context.outstanding().decrement();
        }
    }

    fn phase(&self) -> AchievementPhase {
        self.lock().phase
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.phase() {
            AchievementPhase::Ready => Ok(()),
            _ => Err(Error::NotReady),
        }
    }

    fn begin_store(&self) -> Result<(), Error> {
        self.ensure_ready()?;
        self.lock().stores_outstanding += 1;
        self.context.outstanding().increment();
        if self.context.vendor().store_stats() {
            return Ok(());
        }
        let mut state = self.lock();
        if state.stores_outstanding > 0 {
            state.stores_outstanding -= 1;
            self.context.outstanding().decrement();
        }
        Err(Error::failed("vendor refused to store stats"))
    }
}

impl StatsListener for AchievementTracker {
    fn user_stats_received(&self, app_id: u32, result: StatsResult) {
        if app_id != self.app_id {
            return;
        }
        let mut state = self.lock();
        if state.awaiting_stats {
            state.awaiting_stats = false;
            self.context.outstanding().decrement();
        }
        match (state.phase, result) {
            (AchievementPhase::Initializing, StatsResult::Ok) => {
                state.phase = AchievementPhase::Ready;
                logwise::info_sync!("Achievements ready");
            }
            (AchievementPhase::Initializing, StatsResult::Failed) => {
                logwise::warn_sync!("Stats request failed; achievements stay unavailable");
            }
            _ => {}
        }
    }

    fn user_stats_stored(&self, app_id: u32, result: StatsResult) {
        if app_id != self.app_id {
            return;
        }
        let mut state = self.lock();
        if state.stores_outstanding > 0 {
            state.stores_outstanding -= 1;
            self.context.outstanding().decrement();
        }
        if result == StatsResult::Failed {
            logwise::warn_sync!("Vendor failed to store stats");
        }
    }

    fn achievement_stored(&self, app_id: u32, achievement_id: &str) {
        if app_id == self.app_id {
            logwise::debuginternal_sync!(
                "Achievement {id} stored",
                id = logwise::privacy::LogIt(achievement_id)
            );
        }
    }
}

/**
The single owner of vendor coordination state.

Constructing a manager starts the pump worker and requests the user's stats.  Dropping it
(or calling [`CallManager::shutdown`]) abandons blocked callers and joins the worker.
*/
pub struct CallManager {
    context: Arc<CallContext>,
    tracker: Arc<AchievementTracker>,
    find_leaderboard: SerializedCall<FindLeaderboard>,
    upload_score: SerializedCall<UploadScore>,
    download_friend_scores: SerializedCall<DownloadFriendScores>,
    pump: Mutex<Option<PumpScheduler>>,
}

impl CallManager {
    pub fn new(vendor: Arc<dyn Vendor>, config: CallManagerConfig) -> Result<CallManager, Error> {
        let app_id = vendor.app_id();
        let (context, signals) = CallContext::new(vendor);
        let pump = PumpScheduler::spawn(context.clone(), signals, config.poll_interval)?;

        let tracker = Arc::new(AchievementTracker {
            app_id,
            context: context.clone(),
            state: Mutex::new(TrackerState {
                phase: AchievementPhase::Uninitialized,
                awaiting_stats: false,
                stores_outstanding: 0,
            }),
        });
        let listener: Arc<dyn StatsListener> = tracker.clone();
        context.vendor().set_stats_listener(Arc::downgrade(&listener));
        tracker.begin_initialization();

        Ok(CallManager {
            find_leaderboard: SerializedCall::new(context.clone()),
            upload_score: SerializedCall::new(context.clone()),
            download_friend_scores: SerializedCall::new(context.clone()),
            context,
            tracker,
            pump: Mutex::new(Some(pump)),
        })
    }

    pub fn user_name(&self) -> String {
        self.context.vendor().persona_name()
    }

    pub fn get_leaderboard(&self, name: &str) -> Result<NativeLeaderboard, Error> {
        self.find_leaderboard.call(name.to_string())
    }

    /// Uploads `score` with packed `details`.  Returns whether the stored entry changed.
    pub fn set_leaderboard_entry(&self, leaderboard: NativeLeaderboard, score: i32, details: &[i32]) -> Result<bool, Error> {
        self.upload_score.call((leaderboard, score, details.to_vec()))
    }

    pub fn get_friend_leaderboard_entries(&self, leaderboard: NativeLeaderboard) -> Result<Vec<LeaderboardEntry>, Error> {
        self.download_friend_scores.call(leaderboard)
    }

    pub fn get_achievement(&self, id: &str) -> Result<bool, Error> {
        let achievement: Achievement = id.parse()?;
        self.tracker.ensure_ready()?;
        self.context
            .vendor()
            .achievement(achievement.id())
            .ok_or_else(|| Error::failed(format!("vendor could not report {achievement}")))
    }

    /**
    Marks `id` achieved locally.  Returns true if it was newly achieved, false if it already was,
    in which case the vendor setter is not called.  Use [`CallManager::store_achievements`]
    to upload the change.
    */
    pub fn set_achievement(&self, id: &str) -> Result<bool, Error> {
        let achievement: Achievement = id.parse()?;
        self.tracker.ensure_ready()?;
        let vendor = self.context.vendor();
        match vendor.achievement(achievement.id()) {
            Some(true) => return Ok(false),
            Some(false) => {}
            None => return Err(Error::failed(format!("vendor could not report {achievement}"))),
        }
        if !vendor.set_achievement(achievement.id()) {
            return Err(Error::failed(format!("vendor could not set {achievement}")));
        }
        logwise::info_sync!("Achievement {id} newly achieved", id = logwise::privacy::LogIt(achievement.id()));
        Ok(true)
    }

    /**
    Asks the vendor to upload changed stats and achievements.

    Returns once the request is sent; completion is observed through the stored notification.
    */
    pub fn store_achievements(&self) -> Result<(), Error> {
        self.tracker.begin_store()
    }

    pub fn achievement_phase(&self) -> AchievementPhase {
        self.tracker.phase()
    }

    /// Vendor operations whose completion has not been delivered yet.
    pub fn outstanding_calls(&self) -> u32 {
        self.context.outstanding().get()
    }

    /**
    Abandons blocked callers, stops the pump worker and waits for it to exit.

    Later calls fail with [`Error::Aborted`].  Calling this more than once is harmless.
    */
    pub fn shutdown(&self) -> Result<(), Error> {
        self.find_leaderboard.abandon();
        self.upload_score.abandon();
        self.download_friend_scores.abandon();
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        match pump {
            Some(pump) => {
                logwise::info_sync!("Shutting down call manager");
                pump.shutdown()
            }
            None => Ok(()),
        }
    }
}

impl Drop for CallManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            logwise::error_sync!("Call manager shutdown failed: {err}", err = logwise::privacy::LogIt(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedVendor;
    use std::time::Instant;

    fn fast() -> CallManagerConfig {
        CallManagerConfig {
            poll_interval: Duration::from_millis(1),
        }
    }

    fn wait_for_ready(manager: &CallManager) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.achievement_phase() != AchievementPhase::Ready {
            assert!(Instant::now() < deadline, "achievements never became ready");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn stats_request_brings_achievements_ready() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        wait_for_ready(&manager);
        assert_eq!(manager.outstanding_calls(), 0);
        manager.shutdown().unwrap();
    }

    #[test]
    fn failed_stats_request_stays_initializing() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        vendor.set_stats_ok(false);
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.outstanding_calls() != 0 {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(manager.achievement_phase(), AchievementPhase::Initializing);
        assert!(matches!(manager.set_achievement("ERASE"), Err(Error::NotReady)));
        assert!(matches!(manager.store_achievements(), Err(Error::NotReady)));
    }

    #[test]
    fn refused_stats_request_leaves_nothing_outstanding() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        vendor.refuse_stats_requests(true);
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        assert_eq!(manager.achievement_phase(), AchievementPhase::Uninitialized);
        assert_eq!(manager.outstanding_calls(), 0);
    }

    #[test]
    fn set_achievement_only_sets_once() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        wait_for_ready(&manager);
        assert!(!manager.get_achievement("NEW_END").unwrap());
        assert!(manager.set_achievement("NEW_END").unwrap());
        assert!(!manager.set_achievement("NEW_END").unwrap());
        assert!(manager.get_achievement("NEW_END").unwrap());
        assert_eq!(vendor.set_achievement_calls(), 1);
    }

    #[test]
    fn unknown_achievement_never_reaches_vendor() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        wait_for_ready(&manager);
        assert!(matches!(manager.set_achievement("NOT_A_THING"), Err(Error::InvalidArgument(_))));
        assert_eq!(vendor.set_achievement_calls(), 0);
    }

    #[test]
    fn store_completes_through_notification() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        wait_for_ready(&manager);
        manager.set_achievement("AVOISION").unwrap();
        manager.store_achievements().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.outstanding_calls() != 0 {
            assert!(Instant::now() < deadline, "store never completed");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(vendor.stores(), 1);
    }

    #[test]
    fn leaderboard_round_trip() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        let native = vendor.add_leaderboard("Sandbox");
        vendor.add_friend_entry(native, "Alice", 10);
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        assert_eq!(manager.get_leaderboard("Sandbox").unwrap(), native);
        assert!(matches!(manager.get_leaderboard("Nope"), Err(Error::NotFound)));
        assert!(manager.set_leaderboard_entry(native, 40, &[1]).unwrap());
        //lower is better; a worse score does not change the entry
        assert!(!manager.set_leaderboard_entry(native, 50, &[]).unwrap());
        assert_eq!(vendor.uploaded_details(native), Some(vec![1]));
        let entries = manager.get_friend_leaderboard_entries(native).unwrap();
        assert_eq!(entries[0].name, "Alice");
    }

    #[test]
    fn shutdown_fails_later_calls() {
        let vendor = Arc::new(ScriptedVendor::new(7));
        vendor.add_leaderboard("Sandbox");
        let manager = CallManager::new(vendor.clone(), fast()).unwrap();
        manager.shutdown().unwrap();
        manager.shutdown().unwrap();
        assert!(matches!(manager.get_leaderboard("Sandbox"), Err(Error::Aborted)));
    }
}
