//! Purpose: Native-side calls into host-implemented callback interfaces.
//! Exports: `VTableSlot`, `invoke_callback`, `invoke_infallible_callback`, `ForeignFutureReceiver`.
//! Role: Mirror of the host dispatcher for the reverse direction.
//! Invariants: A vtable is registered at most once per interface and never freed.
//! Invariants: Every foreign future handed to a receiver is freed exactly once, on drop.
use crate::core::buffer::{BufferAllocator, LocalAllocator, RustBuffer};
use crate::core::convert::FfiConverter;
use crate::core::error::{CallError, Error, ErrorKind};
use crate::core::status::{
    CallStatus, ForeignFuture, ForeignFutureComplete, ForeignFutureResult, check_call_status,
    check_infallible_status,
};
use std::sync::OnceLock;
use tokio::sync::oneshot;

/// Process-wide home of one callback interface's vtable.
pub struct VTableSlot<V: 'static> {
    interface: &'static str,
    slot: OnceLock<&'static V>,
}

impl<V: 'static> VTableSlot<V> {
    pub const fn new(interface: &'static str) -> Self {
        Self {
            interface,
            slot: OnceLock::new(),
        }
    }

    pub fn register(&self, vtable: &'static V) {
        if self.slot.set(vtable).is_err() {
            tracing::warn!(
                interface = self.interface,
                "callback vtable already registered; ignoring"
            );
        }
    }

    pub fn get(&self) -> Result<&'static V, Error> {
        self.slot.get().copied().ok_or_else(|| {
            Error::new(ErrorKind::Callback)
                .with_message(format!(
                    "callback interface {} used before its vtable was registered",
                    self.interface
                ))
                .with_hint("Register the host implementation before handing it to native code.")
        })
    }

    pub fn is_registered(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Calls a vtable method that declares an error type.
pub fn invoke_callback<R, E, F>(call: F) -> Result<R, CallError<E>>
where
    E: FfiConverter<FfiType = RustBuffer>,
    F: FnOnce(&mut CallStatus) -> R,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    check_call_status::<E>(&LocalAllocator, status)?;
    Ok(value)
}

pub fn invoke_infallible_callback<R, F>(call: F) -> Result<R, Error>
where
    F: FnOnce(&mut CallStatus) -> R,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    check_infallible_status(&LocalAllocator, status)?;
    Ok(value)
}

type ResultSender<R> = oneshot::Sender<ForeignFutureResult<R>>;

extern "C" fn complete_foreign_future<R: Send + 'static>(
    callback_data: u64,
    result: ForeignFutureResult<R>,
) {
    let sender = unsafe { Box::from_raw(callback_data as usize as *mut ResultSender<R>) };
    if let Err(result) = sender.send(result) {
        tracing::trace!(callback_data, "foreign future completed after its receiver was dropped");
        if let Err(err) = LocalAllocator.free(result.call_status.error_buf) {
            tracing::warn!(callback_data, error = %err, "failed to free late foreign future error");
        }
    }
}

/// Awaits the result of one async callback call.
pub struct ForeignFutureReceiver<R> {
    sender: Option<ResultSender<R>>,
    receiver: Option<oneshot::Receiver<ForeignFutureResult<R>>>,
    future: Option<ForeignFuture>,
}

impl<R: Send + 'static> ForeignFutureReceiver<R> {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
            future: None,
        }
    }

    pub fn complete_fn(&self) -> ForeignFutureComplete<R> {
        complete_foreign_future::<R>
    }

    /// Hands the sending half to the host; call at most once.
    ///
    /// The returned value owns a boxed sender that only `complete_fn`
    /// reclaims. The host must invoke that completion exactly once for every
    /// call it accepted, including calls freed before they finish; the host
    /// runtime's `spawn_foreign_future` reports a cancellation in that case.
    /// A completion that arrives after this receiver is gone still frees the
    /// sender and any error buffer it carries.
    pub fn callback_data(&mut self) -> Result<u64, Error> {
        let sender = self.sender.take().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("foreign future callback data already taken")
        })?;
        Ok(Box::into_raw(Box::new(sender)) as usize as u64)
    }

    /// Records the future the host returned so it is freed on drop.
    pub fn attach(&mut self, future: ForeignFuture) {
        self.future = Some(future);
    }

    pub async fn receive(mut self) -> Result<ForeignFutureResult<R>, Error> {
        let receiver = self.receiver.take().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("foreign future already received")
        })?;
        receiver.await.map_err(|_| {
            Error::new(ErrorKind::Callback)
                .with_message("async callback dropped without reporting a result")
        })
    }
}

impl<R: Send + 'static> Default for ForeignFutureReceiver<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for ForeignFutureReceiver<R> {
    fn drop(&mut self) {
        if let Some(future) = self.future.take() {
            (future.free)(future.handle);
        }
    }
}

/// Splits an async callback result the way `invoke_callback` does.
pub fn check_foreign_result<R, E>(result: ForeignFutureResult<R>) -> Result<R, CallError<E>>
where
    E: FfiConverter<FfiType = RustBuffer>,
{
    check_call_status::<E>(&LocalAllocator, result.call_status)?;
    Ok(result.return_value)
}
