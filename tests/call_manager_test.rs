// SPDX-License-Identifier: MPL-2.0

//! Concurrency tests for the call manager against a scripted vendor.
//!
//! These exercise the properties that only show up with real threads: calls of one kind
//! never overlap at the vendor, calls of different kinds do, the pump goes quiet when
//! nothing is outstanding, and shutdown releases blocked callers.
//!
//! Run with: `cargo test --test call_manager_test`

use std::sync::Arc;
use std::time::{Duration, Instant};

use native_shell::call_manager::{AchievementPhase, CallManager, CallManagerConfig};
use native_shell::error::{E_UNEXPECTED, Error};
use native_shell::test_support::{ScriptedCall, ScriptedVendor};
use native_shell::vendor::StatsResult;

const APP_ID: u32 = 2124440;

fn manager(vendor: &Arc<ScriptedVendor>) -> Arc<CallManager> {
    Arc::new(
        CallManager::new(
            vendor.clone(),
            CallManagerConfig {
                poll_interval: Duration::from_millis(1),
            },
        )
        .unwrap(),
    )
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn same_kind_calls_never_overlap() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    vendor.add_leaderboard("Tutorial");
    vendor.set_pumps_per_completion(3);
    let manager = manager(&vendor);

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.get_leaderboard("Tutorial"))
        })
        .collect();
    let results: Vec<_> = callers.into_iter().map(|c| c.join().unwrap()).collect();

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(vendor.started_calls(), 8);
    assert_eq!(vendor.max_concurrent(ScriptedCall::Find), 1);
    assert_eq!(manager.outstanding_calls(), 0);
}

#[test]
fn different_kinds_proceed_together() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    let native = vendor.add_leaderboard("Tutorial");
    vendor.add_friend_entry(native, "Alice", 10);
    vendor.hold_completions(true);
    let manager = manager(&vendor);

    let finder = {
        let manager = manager.clone();
        std::thread::spawn(move || manager.get_leaderboard("Tutorial"))
    };
    let downloader = {
        let manager = manager.clone();
        std::thread::spawn(move || manager.get_friend_leaderboard_entries(native))
    };
    //both are started while neither has completed
    wait_until("both calls to start", || vendor.started_calls() == 2);
    vendor.hold_completions(false);

    assert_eq!(finder.join().unwrap().unwrap(), native);
    assert_eq!(downloader.join().unwrap().unwrap().len(), 1);
}

#[test]
fn pump_goes_quiet_when_idle() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    vendor.add_leaderboard("Tutorial");
    let manager = manager(&vendor);
    manager.get_leaderboard("Tutorial").unwrap();
    wait_until("stats to settle", || manager.outstanding_calls() == 0);

    //one pass may still be finishing after the count reached zero
    std::thread::sleep(Duration::from_millis(20));
    let quiet = vendor.pump_count();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(vendor.pump_count(), quiet);
}

#[test]
fn stats_for_other_apps_are_ignored() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    vendor.add_leaderboard("Tutorial");
    vendor.set_stats_ok(false);
    let manager = manager(&vendor);
    wait_until("stats request to fail", || manager.outstanding_calls() == 0);
    assert_eq!(manager.achievement_phase(), AchievementPhase::Initializing);

    //pumping only happens while a call is outstanding, so drive one through
    vendor.queue_stats_received(APP_ID + 1, StatsResult::Ok);
    manager.get_leaderboard("Tutorial").unwrap();
    assert_eq!(manager.achievement_phase(), AchievementPhase::Initializing);

    vendor.queue_stats_received(APP_ID, StatsResult::Ok);
    manager.get_leaderboard("Tutorial").unwrap();
    assert_eq!(manager.achievement_phase(), AchievementPhase::Ready);
    assert_eq!(manager.outstanding_calls(), 0);
}

#[test]
fn shutdown_releases_blocked_callers() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    vendor.add_leaderboard("Tutorial");
    vendor.hold_completions(true);
    let manager = manager(&vendor);

    let caller = {
        let manager = manager.clone();
        std::thread::spawn(move || manager.get_leaderboard("Tutorial"))
    };
    wait_until("the call to start", || vendor.started_calls() == 1);
    manager.shutdown().unwrap();

    assert!(matches!(caller.join().unwrap(), Err(Error::Aborted)));
    assert!(matches!(manager.get_leaderboard("Tutorial"), Err(Error::Aborted)));
}

#[test]
fn dropped_vendor_callback_aborts_only_that_call() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    vendor.add_leaderboard("Tutorial");
    let manager = manager(&vendor);
    vendor.drop_next_callbacks(1);
    assert!(matches!(manager.get_leaderboard("Tutorial"), Err(Error::Aborted)));
    assert!(manager.get_leaderboard("Tutorial").is_ok());
}

#[test]
fn crashed_pump_worker_is_reported_at_shutdown() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    //the stats request made at construction starts the first pump pass
    vendor.panic_next_pump();
    let manager = manager(&vendor);
    wait_until("the pump pass", || vendor.pump_count() == 1);

    let err = manager.shutdown().unwrap_err();
    assert!(matches!(err, Error::WorkerExited(_)));
    assert_eq!(err.code(), E_UNEXPECTED);
    //already reported; a second shutdown has nothing left to join
    assert!(manager.shutdown().is_ok());
}

#[test]
fn previously_granted_achievement_is_not_set_again() {
    let vendor = Arc::new(ScriptedVendor::new(APP_ID));
    vendor.grant_achievement("TIME_EARLY");
    let manager = manager(&vendor);
    wait_until("achievements to be ready", || manager.achievement_phase() == AchievementPhase::Ready);

    assert!(manager.get_achievement("TIME_EARLY").unwrap());
    assert!(!manager.set_achievement("TIME_EARLY").unwrap());
    assert_eq!(vendor.set_achievement_calls(), 0);
}
