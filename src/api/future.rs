//! Purpose: Await native futures from host async code.
//! Exports: `rust_call_async`, `rust_call_async_infallible`, `AsyncEntryPoints`, `continuation_callback`.
//! Role: Bridges the native poll/wakeup protocol to a tokio-compatible `Future`.
//! Invariants: Each poll cycle registers a fresh continuation key; keys are never reused.
//! Invariants: A continuation key is removed exactly once, by the wakeup or by cancellation.
//! Invariants: The native future is freed exactly once, after `complete` or after `cancel`.
use crate::api::call::{rust_call, rust_call_with_error};
use crate::api::component::Component;
use crate::core::buffer::{BufferAllocator, RustBuffer};
use crate::core::convert::FfiConverter;
use crate::core::error::{CallError, Error, ErrorKind, protocol};
use crate::core::handle_map::HandleMap;
use crate::core::status::{CallStatus, ContinuationCallback, POLL_NOT_READY, POLL_READY};
use tokio::sync::oneshot;

static CONTINUATIONS: HandleMap<oneshot::Sender<i8>> = HandleMap::new();

/// The wakeup entry point handed to every native poll.
pub extern "C" fn continuation_callback(data: u64, poll_result: i8) {
    match CONTINUATIONS.remove(data) {
        Some(sender) => {
            // The waiter may have been cancelled after the key was taken.
            let _ = sender.send(poll_result);
        }
        None => tracing::debug!(key = data, poll_result, "wakeup for unknown continuation"),
    }
}

/// Number of poll cycles currently waiting for a wakeup.
pub fn pending_continuations() -> usize {
    CONTINUATIONS.len()
}

pub type FuturePollFn = unsafe extern "C" fn(handle: u64, callback: ContinuationCallback, data: u64);
pub type FutureCancelFn = unsafe extern "C" fn(handle: u64);
pub type FutureCompleteFn<R> = unsafe extern "C" fn(handle: u64, status: &mut CallStatus) -> R;
pub type FutureFreeFn = unsafe extern "C" fn(handle: u64);

/// The per-return-type future entry points of a component.
pub struct AsyncEntryPoints<R> {
    pub poll: FuturePollFn,
    pub cancel: FutureCancelFn,
    pub complete: FutureCompleteFn<R>,
    pub free: FutureFreeFn,
}

impl<R> AsyncEntryPoints<R> {
    /// Resolves `uniwire_rust_future_{poll,cancel,complete,free}_<suffix>`.
    ///
    /// `suffix` names the return type (`u32`, `rust_buffer`, `void`, ...) and
    /// must match `R`.
    pub fn resolve(component: &Component, suffix: &str) -> Result<Self, Error> {
        let name = |op: &str| format!("uniwire_rust_future_{op}_{suffix}");
        unsafe {
            Ok(Self {
                poll: component.symbol::<FuturePollFn>(&name("poll"))?,
                cancel: component.symbol::<FutureCancelFn>(&name("cancel"))?,
                complete: component.symbol::<FutureCompleteFn<R>>(&name("complete"))?,
                free: component.symbol::<FutureFreeFn>(&name("free"))?,
            })
        }
    }
}

impl<R> Clone for AsyncEntryPoints<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for AsyncEntryPoints<R> {}

impl<R> std::fmt::Debug for AsyncEntryPoints<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncEntryPoints")
            .field("poll", &self.poll)
            .field("complete", &(self.complete as *const ()))
            .finish_non_exhaustive()
    }
}

/// Owns a started native future until it is completed or abandoned.
struct InFlight<R> {
    handle: u64,
    entry: AsyncEntryPoints<R>,
    pending_key: Option<u64>,
    completed: bool,
}

impl<R> InFlight<R> {
    async fn wait_ready(&mut self) -> Result<(), Error> {
        loop {
            let (sender, receiver) = oneshot::channel();
            let key = CONTINUATIONS.insert(sender);
            self.pending_key = Some(key);
            tracing::trace!(handle = self.handle, key, "poll native future");
            unsafe { (self.entry.poll)(self.handle, continuation_callback, key) };
            let result = receiver.await;
            self.pending_key = None;
            match result {
                Ok(POLL_READY) => return Ok(()),
                Ok(POLL_NOT_READY) => continue,
                Ok(other) => {
                    return Err(protocol(format!("unknown poll result {other}")));
                }
                Err(_) => {
                    return Err(Error::new(ErrorKind::Internal)
                        .with_message("continuation dropped without a wakeup"));
                }
            }
        }
    }
}

impl<R> Drop for InFlight<R> {
    fn drop(&mut self) {
        if !self.completed {
            if let Some(key) = self.pending_key.take() {
                // Whichever of this and the wakeup removes the key first wins.
                CONTINUATIONS.remove(key);
            }
            tracing::trace!(handle = self.handle, "cancel native future");
            unsafe { (self.entry.cancel)(self.handle) };
        }
        unsafe { (self.entry.free)(self.handle) };
    }
}

/// Starts a native async call and awaits it.
///
/// `start` invokes the async entry point and returns the native future handle.
/// `lift` converts the raw completion value once the status checked out.
/// Dropping the returned future cancels and frees the native future.
pub async fn rust_call_async<A, R, T, E, S, L>(
    buffers: &A,
    start: S,
    entry: AsyncEntryPoints<R>,
    lift: L,
) -> Result<T, CallError<E>>
where
    A: BufferAllocator + Sync,
    E: FfiConverter<FfiType = RustBuffer>,
    S: FnOnce(&mut CallStatus) -> u64,
    L: FnOnce(R) -> Result<T, Error>,
{
    let handle = rust_call(buffers, start)?;
    let mut in_flight = InFlight {
        handle,
        entry,
        pending_key: None,
        completed: false,
    };
    in_flight.wait_ready().await?;
    let complete = entry.complete;
    let value = rust_call_with_error::<E, _, _>(buffers, |status| unsafe { complete(handle, status) });
    in_flight.completed = true;
    drop(in_flight);
    Ok(lift(value?)?)
}

/// `rust_call_async` for calls that declare no error type.
pub async fn rust_call_async_infallible<A, R, T, S, L>(
    buffers: &A,
    start: S,
    entry: AsyncEntryPoints<R>,
    lift: L,
) -> Result<T, Error>
where
    A: BufferAllocator + Sync,
    S: FnOnce(&mut CallStatus) -> u64,
    L: FnOnce(R) -> Result<T, Error>,
{
    let handle = rust_call(buffers, start)?;
    let mut in_flight = InFlight {
        handle,
        entry,
        pending_key: None,
        completed: false,
    };
    in_flight.wait_ready().await?;
    let complete = entry.complete;
    let value = rust_call(buffers, |status| unsafe { complete(handle, status) });
    in_flight.completed = true;
    drop(in_flight);
    lift(value?)
}
