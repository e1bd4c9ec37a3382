//SPDX-License-Identifier: MPL-2.0

/*!
The native side of a desktop shell for a web game.

Hosted script calls into native host objects for the user's identity, leaderboards,
achievements, fullscreen and local persistence.  Identity, leaderboards and achievements
come from a third-party game-distribution SDK which is callback-driven, single-threaded at
heart, and only makes progress while somebody pumps it.  This crate turns that SDK into
promises script can await without ever blocking the host thread.

# Architecture

From the host thread outward:

* [`platform::PlatformHost`] and [`window::WindowHost`] are the host objects script sees.
* [`promise::execute_promise_on_thread_pool`] marshals a script resolve/reject pair, runs a
  blocking handler on the [`thread_pool::ThreadPool`], and settles the promise back on the
  host thread through the [`host_thread::HostLoop`].
* [`call_manager::CallManager`] offers blocking vendor operations.  Each callback-driven
  operation goes through a [`serialized_call::SerializedCall`], so at most one call of each
  kind is in flight.
* [`pump::PumpScheduler`] pumps the SDK on a dedicated worker, but only while calls are
  outstanding.

# Threading Model

| Thread | Blocks? | Runs |
|--------|---------|------|
| host thread | never | script, host objects, promise settlement |
| pool workers | yes | promise handlers and the vendor calls they make |
| pump worker | between passes | [`vendor::Vendor::run_callbacks`] and therefore every vendor callback |

Script callables ([`value::HostFunction`]) are `!Send`; the compiler keeps them on the host
thread.

# Example

```
use std::sync::Arc;
use std::time::Duration;
use native_shell::call_manager::{CallManager, CallManagerConfig};
use native_shell::host_thread::HostLoop;
use native_shell::platform::PlatformHost;
use native_shell::test_support::ScriptedVendor;
use native_shell::thread_pool::{ThreadPool, ThreadPoolConfig};
use native_shell::value::{HostFunction, ScriptArg};

let vendor = Arc::new(ScriptedVendor::new(480));
vendor.add_leaderboard("Tutorial");
let manager = Arc::new(CallManager::new(vendor, CallManagerConfig::default()).unwrap());
let pool = Arc::new(ThreadPool::new(ThreadPoolConfig::default()).unwrap());
let platform = PlatformHost::new(manager, pool);

let host = HostLoop::new();
let resolve = ScriptArg::Function(HostFunction::new(|args| {
    println!("handle {:?}", args);
    Ok(())
}));
let reject = ScriptArg::Function(HostFunction::new(|args| {
    println!("failed with {:?}", args);
    Ok(())
}));
platform.resolve_get_leaderboard(&host, &resolve, &reject, "Tutorial").unwrap();
assert!(host.run_until(|h| h.pending_promises() == 0, Duration::from_secs(10)));
```
*/

/// Failure codes and the crate's error type.
pub mod error;

/// The vendor SDK boundary.
pub mod vendor;

pub mod pump;

pub mod serialized_call;

pub mod achievements;

pub mod leaderboards;

/// Blocking vendor operations and the achievement state machine.
pub mod call_manager;

pub mod value;

/// The host thread's message loop and marshaled promises.
pub mod host_thread;

pub mod thread_pool;

/// Bridging pool work back to script promises.
pub mod promise;

pub mod platform;

pub mod settings;

pub mod storage;

pub mod window;

pub mod shell;

/// In-memory collaborators for tests.
pub mod test_support;

logwise::declare_logging_domain!();
