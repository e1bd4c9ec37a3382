// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests for the platform host object.
//!
//! Every test drives a promise from the host thread, through the thread pool and the
//! call manager into a scripted vendor, and back to the host thread, then checks that
//! exactly one of resolve or reject ran with the expected arguments.
//!
//! Run with: `cargo test --test promise_bridge_test`

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use native_shell::call_manager::{AchievementPhase, CallManager, CallManagerConfig};
use native_shell::error::{E_INVALIDARG, E_NETWORK_NOT_AVAILABLE, E_NOT_FOUND, E_NOT_VALID_STATE};
use native_shell::host_thread::HostLoop;
use native_shell::platform::PlatformHost;
use native_shell::test_support::ScriptedVendor;
use native_shell::thread_pool::{ThreadPool, ThreadPoolConfig};
use native_shell::value::{HostFunction, ScriptArg, Value};

#[derive(Debug, Clone, PartialEq)]
enum Settled {
    Resolved(Vec<Value>),
    Rejected(Vec<Value>),
}

/// A resolve/reject pair that records how it was settled.
struct Promise {
    resolve: ScriptArg,
    reject: ScriptArg,
    settled: Rc<RefCell<Vec<Settled>>>,
}

impl Promise {
    fn new() -> Promise {
        let settled = Rc::new(RefCell::new(Vec::new()));
        let on_resolve = settled.clone();
        let on_reject = settled.clone();
        Promise {
            resolve: ScriptArg::Function(HostFunction::new(move |args| {
                on_resolve.borrow_mut().push(Settled::Resolved(args.to_vec()));
                Ok(())
            })),
            reject: ScriptArg::Function(HostFunction::new(move |args| {
                on_reject.borrow_mut().push(Settled::Rejected(args.to_vec()));
                Ok(())
            })),
            settled,
        }
    }

    /// Runs the host loop until settled, and returns the single settlement.
    fn wait(&self, host: &HostLoop) -> Settled {
        let settled = self.settled.clone();
        assert!(
            host.run_until(move |_| !settled.borrow().is_empty(), Duration::from_secs(10)),
            "promise never settled"
        );
        //anything else queued would be a second settlement
        host.run_until_idle();
        let settled = self.settled.borrow();
        assert_eq!(settled.len(), 1, "promise settled more than once: {settled:?}");
        settled[0].clone()
    }
}

struct Fixture {
    vendor: Arc<ScriptedVendor>,
    manager: Arc<CallManager>,
    platform: PlatformHost,
    host: HostLoop,
}

impl Fixture {
    fn new() -> Fixture {
        let vendor = Arc::new(ScriptedVendor::new(2124440));
        let manager = Arc::new(
            CallManager::new(
                vendor.clone(),
                CallManagerConfig {
                    poll_interval: Duration::from_millis(2),
                },
            )
            .unwrap(),
        );
        let pool = Arc::new(
            ThreadPool::new(ThreadPoolConfig {
                name: "bridge test".to_string(),
                min_threads: 2,
                max_threads: 4,
            })
            .unwrap(),
        );
        let platform = PlatformHost::new(manager.clone(), pool);
        Fixture {
            vendor,
            manager,
            platform,
            host: HostLoop::new(),
        }
    }

    fn wait_for_achievements(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.manager.achievement_phase() != AchievementPhase::Ready {
            assert!(Instant::now() < deadline, "achievements never became ready");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn get_leaderboard(&self, name: &str) -> Settled {
        let p = Promise::new();
        self.platform
            .resolve_get_leaderboard(&self.host, &p.resolve, &p.reject, name)
            .unwrap();
        p.wait(&self.host)
    }

    fn handle(&self, name: &str) -> i32 {
        match self.get_leaderboard(name) {
            Settled::Resolved(args) => match args.as_slice() {
                [Value::Int(handle)] => *handle,
                other => panic!("unexpected handle {other:?}"),
            },
            other => panic!("lookup of {name} failed: {other:?}"),
        }
    }

    fn set_entry(&self, handle: i32, score: i32, detail: Value) -> Settled {
        let p = Promise::new();
        self.platform
            .resolve_set_leaderboard_entry(&self.host, &p.resolve, &p.reject, handle, score, detail)
            .unwrap();
        p.wait(&self.host)
    }
}

fn bytes(values: impl IntoIterator<Item = i32>) -> Value {
    Value::Array(values.into_iter().map(Value::Int).collect())
}

#[test]
fn leaderboard_handles_are_distinct_and_stable() {
    let f = Fixture::new();
    f.vendor.add_leaderboard("Tutorial");
    f.vendor.add_leaderboard("Addition");
    let tutorial = f.handle("Tutorial");
    let addition = f.handle("Addition");
    assert_ne!(tutorial, addition);
    assert_eq!(f.handle("Tutorial"), tutorial);
    assert_eq!(f.handle("Addition"), addition);
    assert!(tutorial >= 1 && addition >= 1);
}

#[test]
fn unknown_leaderboard_rejects_not_found() {
    let f = Fixture::new();
    assert_eq!(f.get_leaderboard("Nope"), Settled::Rejected(vec![Value::Int(E_NOT_FOUND)]));
}

#[test]
fn transport_failure_rejects_network_unavailable() {
    let f = Fixture::new();
    f.vendor.add_leaderboard("Tutorial");
    f.vendor.fail_next_calls_with_io(1);
    assert_eq!(
        f.get_leaderboard("Tutorial"),
        Settled::Rejected(vec![Value::Int(E_NETWORK_NOT_AVAILABLE)])
    );
    //nothing was recorded for the failed lookup
    assert_eq!(f.handle("Tutorial"), 1);
}

#[test]
fn oversized_detail_rejects_invalid_argument() {
    let f = Fixture::new();
    let native = f.vendor.add_leaderboard("Tutorial");
    let handle = f.handle("Tutorial");
    assert_eq!(
        f.set_entry(handle, 10, bytes(std::iter::repeat_n(1, 300))),
        Settled::Rejected(vec![Value::Int(E_INVALIDARG)])
    );
    assert_eq!(
        f.set_entry(handle, 10, bytes([1, 2, 300])),
        Settled::Rejected(vec![Value::Int(E_INVALIDARG)])
    );
    assert_eq!(f.vendor.best_score(native), None);
}

#[test]
fn valid_detail_resolves_with_change_flag() {
    let f = Fixture::new();
    f.vendor.add_leaderboard("Tutorial");
    let handle = f.handle("Tutorial");
    assert_eq!(
        f.set_entry(handle, 120, bytes(0..10)),
        Settled::Resolved(vec![Value::Bool(true)])
    );
    assert_eq!(
        f.set_entry(handle, 150, bytes(0..10)),
        Settled::Resolved(vec![Value::Bool(false)])
    );
    assert_eq!(
        f.set_entry(handle, 90, Value::Empty),
        Settled::Resolved(vec![Value::Bool(true)])
    );
}

#[test]
fn five_detail_bytes_upload_as_two_words() {
    let f = Fixture::new();
    let native = f.vendor.add_leaderboard("Tutorial");
    let handle = f.handle("Tutorial");
    f.set_entry(handle, 5, bytes([1, 2, 3, 4, 5]));
    assert_eq!(f.vendor.uploaded_details(native), Some(vec![0x0403_0201, 0x0000_0005]));
}

#[test]
fn bad_small_handles_reject_invalid_argument() {
    let f = Fixture::new();
    for handle in [0, 7, -3] {
        assert_eq!(
            f.set_entry(handle, 1, Value::Empty),
            Settled::Rejected(vec![Value::Int(E_INVALIDARG)])
        );
    }
}

#[test]
fn friend_entries_are_flattened_in_vendor_order() {
    let f = Fixture::new();
    let native = f.vendor.add_leaderboard("Tutorial");
    f.vendor.add_friend_entry(native, "Alice", 10);
    f.vendor.add_friend_entry(native, "Bob", 7);
    f.vendor.add_friend_entry(native, "Carol", 7);
    let handle = f.handle("Tutorial");
    let p = Promise::new();
    f.platform
        .resolve_get_friend_leaderboard_entries(&f.host, &p.resolve, &p.reject, handle)
        .unwrap();
    assert_eq!(
        p.wait(&f.host),
        Settled::Resolved(vec![Value::Array(vec![
            Value::from("Alice"),
            Value::Int(10),
            Value::from("Bob"),
            Value::Int(7),
            Value::from("Carol"),
            Value::Int(7),
        ])])
    );
}

#[test]
fn achievements_set_once_then_store() {
    let f = Fixture::new();
    f.wait_for_achievements();

    let first = Promise::new();
    f.platform
        .resolve_set_achievement(&f.host, &first.resolve, &first.reject, "JOB_TITLE_1")
        .unwrap();
    assert_eq!(first.wait(&f.host), Settled::Resolved(vec![Value::Bool(true)]));

    let second = Promise::new();
    f.platform
        .resolve_set_achievement(&f.host, &second.resolve, &second.reject, "JOB_TITLE_1")
        .unwrap();
    assert_eq!(second.wait(&f.host), Settled::Resolved(vec![Value::Bool(false)]));
    assert_eq!(f.vendor.set_achievement_calls(), 1);
    assert!(f.platform.get_achievement("JOB_TITLE_1").unwrap());

    let store = Promise::new();
    f.platform
        .resolve_store_achievements(&f.host, &store.resolve, &store.reject)
        .unwrap();
    assert_eq!(store.wait(&f.host), Settled::Resolved(vec![]));
}

#[test]
fn unknown_achievement_rejects_without_vendor_call() {
    let f = Fixture::new();
    f.wait_for_achievements();
    let p = Promise::new();
    f.platform
        .resolve_set_achievement(&f.host, &p.resolve, &p.reject, "JOB_TITLE_99")
        .unwrap();
    assert_eq!(p.wait(&f.host), Settled::Rejected(vec![Value::Int(E_INVALIDARG)]));
    assert_eq!(f.vendor.set_achievement_calls(), 0);
}

#[test]
fn achievements_before_stats_reject_not_ready() {
    let vendor = Arc::new(ScriptedVendor::new(2124440));
    vendor.refuse_stats_requests(true);
    let manager = Arc::new(CallManager::new(vendor.clone(), CallManagerConfig::default()).unwrap());
    let pool = Arc::new(ThreadPool::new(ThreadPoolConfig::default()).unwrap());
    let platform = PlatformHost::new(manager, pool);
    let host = HostLoop::new();
    let p = Promise::new();
    platform.resolve_set_achievement(&host, &p.resolve, &p.reject, "ERASE").unwrap();
    assert_eq!(p.wait(&host), Settled::Rejected(vec![Value::Int(E_NOT_VALID_STATE)]));
}

#[test]
fn non_function_callbacks_fail_synchronously() {
    let f = Fixture::new();
    let p = Promise::new();
    let result = f
        .platform
        .resolve_get_leaderboard(&f.host, &ScriptArg::Value(Value::Empty), &p.reject, "Tutorial");
    assert!(result.is_err());
    assert_eq!(f.host.pending_promises(), 0);
    assert!(p.settled.borrow().is_empty());
}

#[test]
fn user_name_comes_from_vendor() {
    let f = Fixture::new();
    f.vendor.set_persona_name("Ada");
    assert_eq!(f.platform.user_name(), "Ada");
}
