//SPDX-License-Identifier: MPL-2.0

/*!
Presents one callback-driven vendor operation as an ordinary blocking call.

A [`CallKind`] describes the operation: how to start it and how to translate the
vendor's result payload.  A [`SerializedCall`] owns the per-kind lock, so at most one
call of each kind is in flight; concurrent callers queue on the lock.  Different kinds
proceed independently.

Blocking is the point: callers are thread pool workers, never the scripting host thread.
*/

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::error::Error;
use crate::pump::CallContext;
use crate::vendor::{CallHandle, CallResult, CallResultCallback, Vendor};

/**
Compile-time descriptor of one vendor operation.
*/
pub trait CallKind: 'static {
    /// Arguments of the start function.
    type Args;
    /// The typed payload handed back to the caller.
    type Output: Send + 'static;

    /// Used in logs.
    const NAME: &'static str;

    fn start(vendor: &dyn Vendor, args: Self::Args) -> CallHandle;

    /// Produces the typed payload or a precise failure from the vendor's result.
    fn translate(result: CallResult) -> Result<Self::Output, Error>;
}

struct Slot<T> {
    completed: bool,
    outcome: Option<Result<T, Error>>,
}

/// Per-invocation state; owned by the one call in progress on a kind.
struct InFlight<T> {
    slot: Mutex<Slot<T>>,
    completed: Condvar,
}

impl<T> InFlight<T> {
    fn new() -> Self {
        InFlight {
            slot: Mutex::new(Slot {
                completed: false,
                outcome: None,
            }),
            completed: Condvar::new(),
        }
    }

    /// Records the outcome unless one was already recorded.  Returns whether this call won.
    fn complete(&self, outcome: Result<T, Error>) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.completed {
            return false;
        }
        slot.completed = true;
        slot.outcome = Some(outcome);
        self.completed.notify_all();
        true
    }

    fn wait(&self) -> Result<T, Error> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if slot.completed {
                return slot
                    .outcome
                    .take()
                    .unwrap_or_else(|| Err(Error::failed("call outcome consumed twice")));
            }
            slot = self
                .completed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/**
Owned by the registered vendor callback.

Firing it translates the result; dropping it unfired (the vendor discarded the callback)
completes the call as aborted.  Either way the outstanding count is decremented exactly once.
*/
struct PendingCompletion<K: CallKind> {
    in_flight: Arc<InFlight<K::Output>>,
    context: Arc<CallContext>,
    handle: CallHandle,
    fired: bool,
    _kind: PhantomData<fn() -> K>,
}

impl<K: CallKind> PendingCompletion<K> {
    fn fire(mut self, result: CallResult, io_failed: bool) {
        self.fired = true;
        let outcome = if io_failed {
            Err(Error::NetworkUnavailable)
        } else {
            std::panic::catch_unwind(AssertUnwindSafe(|| K::translate(result)))
                .unwrap_or_else(|payload| Err(Error::from_panic(K::NAME, payload)))
        };
        logwise::debuginternal_sync!(
            "{kind} call {handle} completed, success {success}",
            kind = logwise::privacy::LogIt(K::NAME),
            handle = logwise::privacy::LogIt(self.handle),
            success = outcome.is_ok()
        );
        self.in_flight.complete(outcome);
        self.context.outstanding().decrement();
    }
}

impl<K: CallKind> Drop for PendingCompletion<K> {
    fn drop(&mut self) {
        if !self.fired {
            logwise::warn_sync!(
                "Vendor dropped the {kind} completion without invoking it",
                kind = logwise::privacy::LogIt(K::NAME)
            );
            self.in_flight.complete(Err(Error::Aborted));
            self.context.outstanding().decrement();
        }
    }
}

/**
A thread-safe, serialized, blocking adapter over one [`CallKind`].
*/
pub struct SerializedCall<K: CallKind> {
    context: Arc<CallContext>,
    lock: Mutex<()>,
    current: Mutex<Option<Arc<InFlight<K::Output>>>>,
    abandoned: AtomicBool,
    _kind: PhantomData<fn() -> K>,
}

impl<K: CallKind> SerializedCall<K> {
    pub fn new(context: Arc<CallContext>) -> Self {
        SerializedCall {
            context,
            lock: Mutex::new(()),
            current: Mutex::new(None),
            abandoned: AtomicBool::new(false),
            _kind: PhantomData,
        }
    }

    /**
    Starts the operation and blocks until its completion callback has fired.

    Calls on the same adapter run one at a time.  There is no timeout: a vendor that never
    completes blocks the caller until [`SerializedCall::abandon`].
    */
    pub fn call(&self, args: K::Args) -> Result<K::Output, Error> {
        let _serialized = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.abandoned.load(Ordering::Acquire) {
            return Err(Error::Aborted);
        }

        let handle = K::start(self.context.vendor(), args);
        if !handle.is_valid() {
            return Err(Error::failed(format!("vendor could not start {}", K::NAME)));
        }
        logwise::debuginternal_sync!(
            "Started {kind} call {handle}",
            kind = logwise::privacy::LogIt(K::NAME),
            handle = logwise::privacy::LogIt(handle)
        );

        let in_flight = Arc::new(InFlight::new());
        *self.current_slot() = Some(in_flight.clone());
        //an abandon that raced with the start must still release this caller
        if self.abandoned.load(Ordering::Acquire) {
            in_flight.complete(Err(Error::Aborted));
        }

        //count before registering, so a pump pass already in progress can't decrement first
        self.context.outstanding().increment();
        let completion = PendingCompletion::<K> {
            in_flight: in_flight.clone(),
            context: self.context.clone(),
            handle,
            fired: false,
            _kind: PhantomData,
        };
        self.context.vendor().set_call_result(
            handle,
            CallResultCallback::new(move |result, io_failed| completion.fire(result, io_failed)),
        );

        let outcome = in_flight.wait();
        *self.current_slot() = None;
        outcome
    }

    /**
    Releases any caller blocked in [`SerializedCall::call`] with [`Error::Aborted`], and makes
    every later call fail the same way.

    Best effort: the vendor operation itself is not cancelled, and its callback may still fire.
    */
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
        if let Some(in_flight) = self.current_slot().as_ref() {
            if in_flight.complete(Err(Error::Aborted)) {
                logwise::info_sync!("Abandoned in-flight {kind} call", kind = logwise::privacy::LogIt(K::NAME));
            }
        }
    }

    fn current_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<InFlight<K::Output>>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: CallKind> Drop for SerializedCall<K> {
    fn drop(&mut self) {
        self.abandon();
    }
}
