//SPDX-License-Identifier: MPL-2.0

/*!
The boundary to the third-party game-distribution SDK.

The SDK is callback-driven and single-threaded at heart: asynchronous operations
return an opaque [`CallHandle`], a completion callback is registered against the
handle, and nothing completes until somebody calls [`Vendor::run_callbacks`].
Stats notifications arrive the same way, through a registered [`StatsListener`].

Implementations wrap the real SDK; [`crate::test_support::ScriptedVendor`] is an
in-memory implementation for tests.
*/

use std::fmt::{Debug, Formatter};
use std::sync::Weak;

/// An opaque handle to one in-flight vendor call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CallHandle(pub u64);

impl CallHandle {
    /// Returned by the vendor when an operation could not be started.
    pub const INVALID: CallHandle = CallHandle(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// The vendor's native leaderboard handle.
///
/// Script cannot represent this 64-bit value precisely; see
/// [`crate::leaderboards::LeaderboardHandle`] for the small handle handed out instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeLeaderboard(pub u64);

/// How an uploaded score interacts with an existing entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UploadScoreMethod {
    /// Keep whichever of the old and new score is better.
    KeepBest,
    /// Always replace the old score.
    ForceUpdate,
}

/// One row of a downloaded leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardFindResult {
    pub leaderboard: NativeLeaderboard,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreUploadedResult {
    pub success: bool,
    pub score_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoresDownloadedResult {
    pub leaderboard: NativeLeaderboard,
    pub entries: Vec<LeaderboardEntry>,
}

/// The payload delivered to a call result callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    LeaderboardFound(LeaderboardFindResult),
    ScoreUploaded(ScoreUploadedResult),
    ScoresDownloaded(ScoresDownloadedResult),
}

/**
A completion callback registered against a [`CallHandle`].

The vendor invokes it exactly once, from inside [`Vendor::run_callbacks`], with the
result payload and whether the transport failed.  When `io_failed` is true the
payload contents are unspecified.
*/
pub struct CallResultCallback(Box<dyn FnOnce(CallResult, bool) + Send>);

impl CallResultCallback {
    pub fn new<F: FnOnce(CallResult, bool) + Send + 'static>(f: F) -> Self {
        CallResultCallback(Box::new(f))
    }

    pub fn invoke(self, result: CallResult, io_failed: bool) {
        (self.0)(result, io_failed)
    }
}

impl Debug for CallResultCallback {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallResultCallback").finish()
    }
}

/// Outcome reported by a stats notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatsResult {
    Ok,
    Failed,
}

/**
Receives the vendor's stats notifications.

Notifications are delivered from inside [`Vendor::run_callbacks`].
*/
pub trait StatsListener: Send + Sync {
    fn user_stats_received(&self, app_id: u32, result: StatsResult);
    fn user_stats_stored(&self, app_id: u32, result: StatsResult);
    fn achievement_stored(&self, app_id: u32, achievement_id: &str);
}

/**
The subset of the vendor SDK the shell uses.

All methods may be called from any thread.  Callbacks registered through
[`Vendor::set_call_result`] and notifications sent to the [`StatsListener`] only fire
inside [`Vendor::run_callbacks`].
*/
pub trait Vendor: Send + Sync {
    /// The application identifier stats notifications are matched against.
    fn app_id(&self) -> u32;

    /// Display name of the signed-in user.
    fn persona_name(&self) -> String;

    fn find_leaderboard(&self, name: &str) -> CallHandle;

    fn upload_leaderboard_score(
        &self,
        leaderboard: NativeLeaderboard,
        method: UploadScoreMethod,
        score: i32,
        details: &[i32],
    ) -> CallHandle;

    /// Starts downloading the entries of the current user's friends.
    fn download_friend_scores(&self, leaderboard: NativeLeaderboard) -> CallHandle;

    /// Registers the one-shot completion callback for `call`.
    fn set_call_result(&self, call: CallHandle, callback: CallResultCallback);

    /// Asks for the current user's stats; completion arrives as
    /// [`StatsListener::user_stats_received`].  Returns false if the request could not be sent.
    fn request_current_stats(&self) -> bool;

    /// Uploads changed stats and achievements; completion arrives as
    /// [`StatsListener::user_stats_stored`].  Returns false if the request could not be sent.
    fn store_stats(&self) -> bool;

    /// Whether `id` is achieved, or `None` if the vendor could not answer.
    fn achievement(&self, id: &str) -> Option<bool>;

    /// Marks `id` achieved locally.  Returns false on failure.
    fn set_achievement(&self, id: &str) -> bool;

    fn set_stats_listener(&self, listener: Weak<dyn StatsListener>);

    /// Dispatches every ready callback and notification on the calling thread.
    fn run_callbacks(&self);

    /// Releases the SDK at process shutdown.
    fn shutdown(&self) {}
}
