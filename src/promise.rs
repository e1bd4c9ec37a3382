//SPDX-License-Identifier: MPL-2.0

/*!
Bridges blocking work on the thread pool back to script promises.

[`execute_promise_on_thread_pool`] is the seam every promise-returning host function goes
through: it marshals the script's resolve/reject pair on the host thread, runs a blocking
handler on a pool worker, and settles the promise on the host thread afterwards.  Exactly
one of resolve or reject runs, exactly once, and only after the handler has returned.

There is no cancellation.  A submitted handler always runs to completion.
*/

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Error;
use crate::host_thread::HostLoop;
use crate::thread_pool::ThreadPool;
use crate::value::{ScriptArg, Value};

fn run_handler<H>(handler: H) -> Result<Value, Error>
where
    H: FnOnce() -> Result<Value, Error>,
{
    std::panic::catch_unwind(AssertUnwindSafe(handler))
        .unwrap_or_else(|payload| Err(Error::from_panic("promise handler", payload)))
}

/**
Runs `handler` on `pool` and settles the script promise with its outcome.

Must be called on the host thread.  Fails synchronously with [`Error::InvalidArgument`] if
either `resolve` or `reject` is not a function, and with [`Error::ResourceExhausted`] if the
pool refuses the work; in both cases neither callable is invoked.

A handler success with [`Value::Empty`] resolves with no arguments; any other value is passed
as the single argument.  A handler failure, or panic, rejects with the numeric failure code.
*/
pub fn execute_promise_on_thread_pool<H>(
    host: &HostLoop,
    pool: &ThreadPool,
    resolve: &ScriptArg,
    reject: &ScriptArg,
    handler: H,
) -> Result<(), Error>
where
    H: FnOnce() -> Result<Value, Error> + Send + 'static,
{
    let resolve = resolve.as_function()?;
    let reject = reject.as_function()?;
    let marshaled = Arc::new(Mutex::new(Some(host.marshal_promise(resolve, reject))));
    let move_marshaled = marshaled.clone();
    let submitted = pool.run_closure(move || {
        let outcome = run_handler(handler);
        if let Some(marshaled) = move_marshaled.lock().unwrap_or_else(PoisonError::into_inner).take() {
            marshaled.settle(outcome);
        }
    });
    match submitted {
        Ok(()) => Ok(()),
        Err(refused) => {
            if let Some(marshaled) = marshaled.lock().unwrap_or_else(PoisonError::into_inner).take() {
                host.release_promise(marshaled);
            }
            logwise::warn_sync!(
                "Thread pool refused promise work: {err}",
                err = logwise::privacy::LogIt(refused.error())
            );
            Err(refused.into_error())
        }
    }
}

/**
Runs `handler` on `pool` and resolves to its outcome, for callers that are not script.

A pool refusal resolves to the refusal error without running `handler`.
*/
pub fn execute_on_thread_pool_async<H>(pool: &ThreadPool, handler: H) -> impl Future<Output = Result<Value, Error>> + use<H>
where
    H: FnOnce() -> Result<Value, Error> + Send + 'static,
{
    let (sender, fut) = r#continue::continuation();
    let sender = Arc::new(Mutex::new(Some(sender)));
    let move_sender = sender.clone();
    let submitted = pool.run_closure(move || {
        let outcome = run_handler(handler);
        if let Some(sender) = move_sender.lock().unwrap_or_else(PoisonError::into_inner).take() {
            sender.send(outcome);
        }
    });
    if let Err(refused) = submitted {
        if let Some(sender) = sender.lock().unwrap_or_else(PoisonError::into_inner).take() {
            sender.send(Err(refused.into_error()));
        }
    }
    fut
}
