//SPDX-License-Identifier: MPL-2.0

/*!
Outstanding-call accounting and the worker that pumps the vendor SDK.

The vendor only makes progress while somebody calls [`Vendor::run_callbacks`].  Rather
than poll forever, a dedicated worker sleeps until the outstanding-call count moves
from zero to one, then pumps on a fixed interval until the count returns to zero.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Error;
use crate::vendor::Vendor;

/// Default pump interval.  Shorter intervals lower completion latency at the cost of wake-ups.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PumpSignal {
    StartProcessing,
    Shutdown,
}

/**
Counts vendor operations whose completion has not been delivered yet.

The transition from zero to one wakes the pump worker.  The count never goes below zero.
*/
#[derive(Debug)]
pub struct OutstandingCalls {
    count: AtomicU32,
    signals: Sender<PumpSignal>,
}

impl OutstandingCalls {
    fn new(signals: Sender<PumpSignal>) -> Self {
        OutstandingCalls {
            count: AtomicU32::new(0),
            signals,
        }
    }

    /// Records a new pending operation and returns the new count.
    pub fn increment(&self) -> u32 {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if count == 1 {
            //first outstanding call; kick off processing now
            if self.signals.send(PumpSignal::StartProcessing).is_err() {
                logwise::warn_sync!("Pump worker is gone; outstanding call will not be serviced");
            }
        }
        count
    }

    /// Records a completed operation and returns the new count.
    pub fn decrement(&self) -> u32 {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                logwise::warn_sync!("Outstanding call count decremented below zero; ignoring");
                0
            }
        }
    }

    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/**
The single coordination point shared by every adapter: the vendor and the outstanding
call count.
*/
pub struct CallContext {
    vendor: Arc<dyn Vendor>,
    outstanding: OutstandingCalls,
}

impl CallContext {
    /// Creates a context and the receiving end of its pump signals.
    pub(crate) fn new(vendor: Arc<dyn Vendor>) -> (Arc<CallContext>, Receiver<PumpSignal>) {
        let (sender, receiver) = channel();
        let context = CallContext {
            vendor,
            outstanding: OutstandingCalls::new(sender),
        };
        (Arc::new(context), receiver)
    }

    pub fn vendor(&self) -> &dyn Vendor {
        self.vendor.as_ref()
    }

    pub fn outstanding(&self) -> &OutstandingCalls {
        &self.outstanding
    }

    fn request_shutdown(&self) {
        //the receiver may already be gone if the worker died; join reports that
        _ = self.outstanding.signals.send(PumpSignal::Shutdown);
    }
}

/**
Owns the pump worker thread.
*/
pub struct PumpScheduler {
    context: Arc<CallContext>,
    thread: Option<JoinHandle<()>>,
}

impl PumpScheduler {
    pub(crate) fn spawn(
        context: Arc<CallContext>,
        signals: Receiver<PumpSignal>,
        interval: Duration,
    ) -> Result<PumpScheduler, Error> {
        let move_context = context.clone();
        let thread = std::thread::Builder::new()
            .name("native_shell pump".to_string())
            .spawn(move || run_pump(&move_context, &signals, interval))
            .map_err(|e| Error::ResourceExhausted(format!("can't spawn pump worker: {e}")))?;
        Ok(PumpScheduler {
            context,
            thread: Some(thread),
        })
    }

    /**
    Signals the worker to stop and waits for it to exit.

    A worker that terminated by panicking is reported as [`Error::WorkerExited`].
    */
    pub fn shutdown(mut self) -> Result<(), Error> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), Error> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.context.request_shutdown();
        thread
            .join()
            .map_err(|payload| Error::WorkerExited(Error::from_panic("pump worker", payload).to_string()))
    }
}

impl Drop for PumpScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            logwise::error_sync!("Pump worker failed: {err}", err = logwise::privacy::LogIt(&e));
        }
    }
}

fn run_pump(context: &CallContext, signals: &Receiver<PumpSignal>, interval: Duration) {
    logwise::info_sync!("Pump worker started");
    loop {
        match signals.recv() {
            Ok(PumpSignal::StartProcessing) => {
                if !process(context, signals, interval) {
                    break;
                }
            }
            Ok(PumpSignal::Shutdown) | Err(_) => break,
        }
    }
    logwise::info_sync!("Pump worker stopped");
}

/// Pumps until nothing is outstanding.  Returns false when the worker should exit.
fn process(context: &CallContext, signals: &Receiver<PumpSignal>, interval: Duration) -> bool {
    loop {
        let outstanding = context.outstanding.get();
        if outstanding == 0 {
            return true;
        }
        logwise::debuginternal_sync!("Pumping vendor callbacks, {outstanding} outstanding", outstanding = outstanding);
        context.vendor.run_callbacks();
        if context.outstanding.get() == 0 {
            return true;
        }
        match signals.recv_timeout(interval) {
            Ok(PumpSignal::StartProcessing) | Err(RecvTimeoutError::Timeout) => {}
            Ok(PumpSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}
