//SPDX-License-Identifier: MPL-2.0

/*!
The scripting host's thread and the channel back to it.

Script callables are bound to the host thread.  Workers never touch them: they hold a
[`MarshaledPromise`], an opaque transferable id, and settle it by sending a message to the
host thread, whose [`HostLoop`] looks the callables up and invokes them.

Whoever owns the host thread creates one [`HostLoop`] and pumps it with
[`HostLoop::run`] (or the bounded variants); workers reach it through a [`HostSender`].
*/

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::value::{HostFunction, Value};

type HostTask = Box<dyn FnOnce(&HostLoop) + Send>;

enum HostMessage {
    Run(HostTask),
    Quit,
}

/// A handle for submitting work to the host thread from any thread.
#[derive(Clone)]
pub struct HostSender {
    sender: Sender<HostMessage>,
}

impl HostSender {
    /// Queues `task` to run on the host thread.  Fails if the host loop is gone.
    pub fn submit<F: FnOnce(&HostLoop) + Send + 'static>(&self, task: F) -> Result<(), Error> {
        self.sender
            .send(HostMessage::Run(Box::new(task)))
            .map_err(|_| Error::Aborted)
    }

    /// Asks [`HostLoop::run`] to return once it reaches this message.
    pub fn quit(&self) {
        if self.sender.send(HostMessage::Quit).is_err() {
            logwise::debuginternal_sync!("Host loop already gone at quit");
        }
    }

    /**
    Runs `f` on the host thread and waits for its result.

    The task is queued before this returns.  Resolves to [`Error::Aborted`] if the host loop
    is gone before `f` runs, whether it was already gone at submission or was dropped with
    the task still queued.
    */
    pub fn run<R, F>(&self, f: F) -> impl Future<Output = Result<R, Error>> + use<R, F>
    where
        R: Send + 'static,
        F: FnOnce(&HostLoop) -> R + Send + 'static,
    {
        let (sender, fut) = r#continue::continuation();
        let mut reply = Reply { sender: Some(sender) };
        //a refused submit drops the task, and the reply with it
        _ = self.submit(move |host| {
            let r = f(host);
            reply.send(Ok(r));
        });
        fut
    }
}

/// Answers a [`HostSender::run`] exactly once; dropped unanswered, it answers `Aborted`.
struct Reply<R: Send + 'static> {
    sender: Option<r#continue::Sender<Result<R, Error>>>,
}

impl<R: Send + 'static> Reply<R> {
    fn send(&mut self, outcome: Result<R, Error>) {
        if let Some(sender) = self.sender.take() {
            sender.send(outcome);
        }
    }
}

impl<R: Send + 'static> Drop for Reply<R> {
    fn drop(&mut self) {
        self.send(Err(Error::Aborted));
    }
}

struct PromisePair {
    resolve: HostFunction,
    reject: HostFunction,
}

/**
The host thread's side: the message receiver and the table of marshaled promises.

`!Send`; it lives and dies on the host thread.
*/
pub struct HostLoop {
    sender: Sender<HostMessage>,
    receiver: Receiver<HostMessage>,
    promises: RefCell<HashMap<u64, PromisePair>>,
    next_promise: Cell<u64>,
}

impl HostLoop {
    pub fn new() -> HostLoop {
        let (sender, receiver) = channel();
        HostLoop {
            sender,
            receiver,
            promises: RefCell::new(HashMap::new()),
            next_promise: Cell::new(1),
        }
    }

    pub fn sender(&self) -> HostSender {
        HostSender {
            sender: self.sender.clone(),
        }
    }

    /**
    Moves a resolve/reject pair into the host-side table and returns the transferable half.

    Must run on the host thread, before the call that received the pair returns.
    */
    pub fn marshal_promise(&self, resolve: &HostFunction, reject: &HostFunction) -> MarshaledPromise {
        let id = self.next_promise.get();
        self.next_promise.set(id + 1);
        self.promises.borrow_mut().insert(
            id,
            PromisePair {
                resolve: resolve.clone(),
                reject: reject.clone(),
            },
        );
        MarshaledPromise {
            id,
            host: self.sender(),
            settled: false,
        }
    }

    /// Drops a marshaled pair without invoking either callable.  Host thread only.
    pub fn release_promise(&self, mut promise: MarshaledPromise) {
        promise.settled = true;
        self.promises.borrow_mut().remove(&promise.id);
    }

    /// Promises marshaled but not yet settled.
    pub fn pending_promises(&self) -> usize {
        self.promises.borrow().len()
    }

    /**
    Invokes exactly one of the pair's callables and releases both.

    An empty success resolves with no arguments; a failure rejects with its numeric code.
    Errors raised by the callable itself are logged, as nothing remains to observe them.
    */
    fn complete_promise(&self, id: u64, outcome: Result<Value, Error>) {
        let Some(pair) = self.promises.borrow_mut().remove(&id) else {
            logwise::warn_sync!("Promise {id} settled twice or never marshaled", id = id);
            return;
        };
        let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| match outcome {
            Ok(Value::Empty) => pair.resolve.invoke(&[]),
            Ok(value) => pair.resolve.invoke(&[value]),
            Err(e) => pair.reject.invoke(&[Value::Int(e.code())]),
        }))
        .unwrap_or_else(|payload| Err(Error::from_panic("promise callback", payload)));
        if let Err(e) = invoked {
            logwise::error_sync!(
                "Promise {id} callback failed: {err}",
                id = id,
                err = logwise::privacy::LogIt(&e)
            );
        }
    }

    fn dispatch(&self, message: HostMessage) -> bool {
        match message {
            HostMessage::Run(task) => {
                task(self);
                true
            }
            HostMessage::Quit => false,
        }
    }

    /// Runs messages until a quit request arrives.
    pub fn run(&self) {
        //self holds a sender, so recv only fails if that invariant breaks
        while let Ok(message) = self.receiver.recv() {
            if !self.dispatch(message) {
                return;
            }
        }
    }

    /// Runs every message already queued, returning how many ran.  Stops early at a quit request.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if !self.dispatch(message) {
                        return ran;
                    }
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /**
    Runs messages until `done` holds, a quit request arrives, or `timeout` elapses.

    Returns whether `done` held.
    */
    pub fn run_until<F: Fn(&HostLoop) -> bool>(&self, done: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(self) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(message) => {
                    if !self.dispatch(message) {
                        return done(self);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return done(self),
            }
        }
    }
}

impl Default for HostLoop {
    fn default() -> Self {
        Self::new()
    }
}

/**
The transferable half of a marshaled resolve/reject pair.

`Send`; settle it from any thread.  Dropping it unsettled rejects the promise with
[`Error::Aborted`], so script always hears back exactly once.
*/
#[derive(Debug)]
pub struct MarshaledPromise {
    id: u64,
    host: HostSender,
    settled: bool,
}

impl MarshaledPromise {
    pub fn settle(mut self, outcome: Result<Value, Error>) {
        self.settled = true;
        self.send(outcome);
    }

    fn send(&self, outcome: Result<Value, Error>) {
        let id = self.id;
        if self.host.submit(move |host| host.complete_promise(id, outcome)).is_err() {
            logwise::error_sync!("Host loop is gone; promise {id} will never settle", id = id);
        }
    }
}

impl Drop for MarshaledPromise {
    fn drop(&mut self) {
        if !self.settled {
            self.send(Err(Error::Aborted));
        }
    }
}

impl std::fmt::Debug for HostSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSender").finish_non_exhaustive()
    }
}
