//! Purpose: Native futures driven by host polls instead of a native executor.
//! Exports: `RustFuture`, `RustFutureFfi`, `rust_future_new` and the handle operations.
//! Role: Backs every `uniwire_rust_future_*` entry point in `abi`.
//! Invariants: The wrapped future is polled only from `ffi_poll`, never on its own.
//! Invariants: Each stored continuation is invoked exactly once.
//! Invariants: A handle is freed exactly once; after `free` the future is dropped.
use crate::core::status::{CallStatus, ContinuationCallback, POLL_NOT_READY, POLL_READY};
use crate::native::scaffolding::{FfiDefault, LoweredError, panic_message};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

const CANCELLED_MESSAGE: &str = "async call cancelled";

#[derive(Clone, Copy, Debug)]
enum SchedulerState {
    /// No continuation stored and no wake pending.
    Empty,
    /// Woken before the host stored a continuation.
    Waked,
    Cancelled,
    Set(ContinuationCallback, u64),
}

#[derive(Debug)]
struct Scheduler {
    state: SchedulerState,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            state: SchedulerState::Empty,
        }
    }

    fn store(&mut self, callback: ContinuationCallback, data: u64) {
        match self.state {
            SchedulerState::Empty => self.state = SchedulerState::Set(callback, data),
            SchedulerState::Set(old_callback, old_data) => {
                // Release the stale continuation so its waiter re-polls.
                old_callback(old_data, POLL_NOT_READY);
                self.state = SchedulerState::Set(callback, data);
            }
            SchedulerState::Waked => {
                self.state = SchedulerState::Empty;
                callback(data, POLL_NOT_READY);
            }
            SchedulerState::Cancelled => callback(data, POLL_READY),
        }
    }

    fn wake(&mut self) {
        match self.state {
            SchedulerState::Set(callback, data) => {
                self.state = SchedulerState::Empty;
                callback(data, POLL_NOT_READY);
            }
            SchedulerState::Empty => self.state = SchedulerState::Waked,
            SchedulerState::Waked | SchedulerState::Cancelled => {}
        }
    }

    fn cancel(&mut self) {
        if let SchedulerState::Set(callback, data) = self.state {
            callback(data, POLL_READY);
        }
        self.state = SchedulerState::Cancelled;
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.state, SchedulerState::Cancelled)
    }
}

type BoxedFuture<T> = Pin<Box<dyn Future<Output = Result<T, LoweredError>> + Send>>;

struct WrappedFuture<T> {
    future: Option<BoxedFuture<T>>,
    result: Option<Result<T, LoweredError>>,
}

impl<T> WrappedFuture<T> {
    /// Returns true once a result is stored.
    fn poll(&mut self, cx: &mut Context<'_>) -> bool {
        if self.result.is_some() {
            return true;
        }
        let Some(future) = self.future.as_mut() else {
            return true;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx)));
        let result = match outcome {
            Ok(Poll::Pending) => return false,
            Ok(Poll::Ready(result)) => result,
            Err(panic) => Err(LoweredError::Unexpected(panic_message(panic.as_ref()))),
        };
        self.future = None;
        self.result = Some(result);
        true
    }

    fn free(&mut self) {
        self.future = None;
        self.result = None;
    }
}

/// A Rust future exported to the host.
pub struct RustFuture<T> {
    future: Mutex<WrappedFuture<T>>,
    scheduler: Mutex<Scheduler>,
}

impl<T: Send + 'static> RustFuture<T> {
    pub fn new<F>(future: F) -> Arc<Self>
    where
        F: Future<Output = Result<T, LoweredError>> + Send + 'static,
    {
        Arc::new(Self {
            future: Mutex::new(WrappedFuture {
                future: Some(Box::pin(future)),
                result: None,
            }),
            scheduler: Mutex::new(Scheduler::new()),
        })
    }

    fn wrapped(&self) -> MutexGuard<'_, WrappedFuture<T>> {
        self.future.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poll(self: Arc<Self>, callback: ContinuationCallback, data: u64) {
        let cancelled = self.scheduler().is_cancelled();
        let ready = cancelled || {
            let waker = Waker::from(Arc::clone(&self));
            let mut cx = Context::from_waker(&waker);
            self.wrapped().poll(&mut cx)
        };
        tracing::trace!(data, ready, "native future polled");
        if ready {
            callback(data, POLL_READY);
        } else {
            self.scheduler().store(callback, data);
        }
    }

    fn complete(&self, status: &mut CallStatus) -> T
    where
        T: FfiDefault,
    {
        let mut wrapped = self.wrapped();
        let result = wrapped.result.take();
        wrapped.free();
        drop(wrapped);
        match result {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                err.write_to(status);
                T::ffi_default()
            }
            None => {
                let message = if self.scheduler().is_cancelled() {
                    CANCELLED_MESSAGE
                } else {
                    "complete called before the future was ready"
                };
                LoweredError::unexpected(message).write_to(status);
                T::ffi_default()
            }
        }
    }

    fn cancel(&self) {
        self.scheduler().cancel();
    }

    fn free(&self) {
        self.scheduler().cancel();
        self.wrapped().free();
    }
}

impl<T: Send + 'static> Wake for RustFuture<T> {
    fn wake(self: Arc<Self>) {
        self.scheduler().wake();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.scheduler().wake();
    }
}

/// Type-erased operations behind a future handle, keyed by FFI return type.
pub trait RustFutureFfi<R>: Send + Sync {
    fn ffi_poll(self: Arc<Self>, callback: ContinuationCallback, data: u64);
    fn ffi_cancel(&self);
    fn ffi_complete(&self, status: &mut CallStatus) -> R;
    fn ffi_free(self: Arc<Self>);
}

impl<T> RustFutureFfi<T> for RustFuture<T>
where
    T: FfiDefault + Send + 'static,
{
    fn ffi_poll(self: Arc<Self>, callback: ContinuationCallback, data: u64) {
        self.poll(callback, data);
    }

    fn ffi_cancel(&self) {
        self.cancel();
    }

    fn ffi_complete(&self, status: &mut CallStatus) -> T {
        self.complete(status)
    }

    fn ffi_free(self: Arc<Self>) {
        self.free();
    }
}

/// Boxes the future and returns the handle the host polls.
pub fn rust_future_new<F, T>(future: F) -> u64
where
    F: Future<Output = Result<T, LoweredError>> + Send + 'static,
    T: FfiDefault + Send + 'static,
{
    let erased: Arc<dyn RustFutureFfi<T>> = RustFuture::new(future);
    Box::into_raw(Box::new(erased)) as usize as u64
}

unsafe fn borrow_handle<R>(handle: u64) -> Arc<dyn RustFutureFfi<R>> {
    let ptr = handle as usize as *const Arc<dyn RustFutureFfi<R>>;
    Arc::clone(unsafe { &*ptr })
}

/// # Safety
///
/// `handle` must come from `rust_future_new` with the same `R` and not be freed.
pub unsafe fn rust_future_poll<R>(handle: u64, callback: ContinuationCallback, data: u64) {
    unsafe { borrow_handle::<R>(handle) }.ffi_poll(callback, data);
}

/// # Safety
///
/// Same as `rust_future_poll`.
pub unsafe fn rust_future_cancel<R>(handle: u64) {
    unsafe { borrow_handle::<R>(handle) }.ffi_cancel();
}

/// # Safety
///
/// Same as `rust_future_poll`.
pub unsafe fn rust_future_complete<R>(handle: u64, status: &mut CallStatus) -> R {
    unsafe { borrow_handle::<R>(handle) }.ffi_complete(status)
}

/// # Safety
///
/// Same as `rust_future_poll`; the handle is invalid afterwards.
pub unsafe fn rust_future_free<R>(handle: u64) {
    let boxed = unsafe { Box::from_raw(handle as usize as *mut Arc<dyn RustFutureFfi<R>>) };
    boxed.ffi_free();
}
