//! Deferred measurement scheduling.
//!
//! When the host skips a measurement because of rate limiting, the latest
//! requested destination is stored here and a single timer is armed. The host
//! event loop fires the timer on its next tick; the ruler then measures the
//! stored request and completes the shared wait handle. Newer requests
//! overwrite older ones, so a fired timer never sees a stale destination.

use kurbo::Point;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// How a wait on a deferred measurement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The deferred measurement ran (or none was pending).
    Completed,
    /// The measurement was cancelled before it ran.
    Abandoned,
}

impl WaitOutcome {
    pub fn is_completed(self) -> bool {
        self == WaitOutcome::Completed
    }
}

#[derive(Debug, Default)]
struct WaitShared {
    outcome: Option<WaitOutcome>,
    wakers: Vec<Waker>,
}

/// Resolving side of a wait handle. Dropping it unsettled abandons the wait.
#[derive(Debug)]
struct WaitSignal {
    shared: Rc<RefCell<WaitShared>>,
}

impl WaitSignal {
    fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(WaitShared::default())),
        }
    }

    fn waiter(&self) -> MeasurementWait {
        MeasurementWait {
            shared: Some(Rc::clone(&self.shared)),
        }
    }

    fn settle(&self, outcome: WaitOutcome) {
        let wakers = {
            let mut shared = self.shared.borrow_mut();
            if shared.outcome.is_some() {
                return;
            }
            shared.outcome = Some(outcome);
            std::mem::take(&mut shared.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl Drop for WaitSignal {
    fn drop(&mut self) {
        self.settle(WaitOutcome::Abandoned);
    }
}

/// Future resolving when the deferred measurement it was taken for settles.
///
/// Cloneable; every clone observes the same outcome. A wait taken while
/// nothing is scheduled resolves immediately with [`WaitOutcome::Completed`].
#[derive(Debug, Clone, Default)]
pub struct MeasurementWait {
    shared: Option<Rc<RefCell<WaitShared>>>,
}

impl MeasurementWait {
    /// A wait that is already complete.
    pub fn ready() -> Self {
        Self::default()
    }

    /// The outcome if the wait has settled.
    pub fn outcome(&self) -> Option<WaitOutcome> {
        match &self.shared {
            Some(shared) => shared.borrow().outcome,
            None => Some(WaitOutcome::Completed),
        }
    }
}

impl Future for MeasurementWait {
    type Output = WaitOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(shared) = &self.shared else {
            return Poll::Ready(WaitOutcome::Completed);
        };
        let mut shared = shared.borrow_mut();
        if let Some(outcome) = shared.outcome {
            return Poll::Ready(outcome);
        }
        if !shared.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            shared.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// The most recent measurement request that has not run yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredRequest<E> {
    pub destination: Point,
    pub event: E,
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer armed. Requests measured on the immediate path leave it here.
    Idle,
    /// A timer is armed and will measure the stored request.
    ScheduledDeferred,
}

/// A fired timer: the request to measure and the wait it settles.
#[derive(Debug)]
pub struct DeferredFire<E> {
    pub request: DeferredRequest<E>,
    signal: Option<WaitSignal>,
}

impl<E> DeferredFire<E> {
    /// Mark the measurement done, releasing every waiter with `Completed`.
    pub fn complete(mut self) {
        if let Some(signal) = self.signal.take() {
            signal.settle(WaitOutcome::Completed);
        }
    }
}

/// Rate-limit safety net: at most one armed timer, last write wins.
#[derive(Debug)]
pub struct DeferredMeasurementScheduler<E> {
    pending: Option<DeferredRequest<E>>,
    armed: bool,
    signal: Option<WaitSignal>,
}

impl<E> Default for DeferredMeasurementScheduler<E> {
    fn default() -> Self {
        Self {
            pending: None,
            armed: false,
            signal: None,
        }
    }
}

impl<E> DeferredMeasurementScheduler<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        if self.armed {
            SchedulerState::ScheduledDeferred
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn pending(&self) -> Option<&DeferredRequest<E>> {
        self.pending.as_ref()
    }

    /// Store `destination`/`event` as the request to measure, overwriting any
    /// earlier one, and arm the timer if it is not armed already.
    ///
    /// Returns true if this call armed the timer.
    pub fn defer(&mut self, destination: Point, event: E) -> bool {
        self.pending = Some(DeferredRequest { destination, event });
        if self.armed {
            return false;
        }
        self.armed = true;
        self.signal = Some(WaitSignal::new());
        log::trace!("Deferred measurement armed for {:?}", destination);
        true
    }

    /// Disarm the timer and drop the pending request. Waiters are released
    /// with [`WaitOutcome::Abandoned`].
    pub fn cancel(&mut self) {
        if self.armed {
            log::trace!("Deferred measurement cancelled");
        }
        self.armed = false;
        self.pending = None;
        if let Some(signal) = self.signal.take() {
            signal.settle(WaitOutcome::Abandoned);
        }
    }

    /// Timer callback. Returns the latest request if the timer was armed.
    pub fn fire(&mut self) -> Option<DeferredFire<E>> {
        if !self.armed {
            return None;
        }
        self.armed = false;
        let signal = self.signal.take();
        match self.pending.take() {
            Some(request) => Some(DeferredFire { request, signal }),
            None => {
                if let Some(signal) = signal {
                    signal.settle(WaitOutcome::Completed);
                }
                None
            }
        }
    }

    /// A handle resolving when the currently scheduled measurement settles.
    pub fn wait(&self) -> MeasurementWait {
        match &self.signal {
            Some(signal) => signal.waiter(),
            None => MeasurementWait::ready(),
        }
    }
}
