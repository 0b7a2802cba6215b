//! Purpose: Host implementations of callback interfaces invoked by native code.
//! Exports: `CallbackRegistry`, `handle_callback`, `spawn_foreign_future`, `register_vtable`.
//! Role: The host half of the reverse call direction.
//! Invariants: A registered implementation stays reachable until the native side frees its handle.
//! Invariants: Every spawned async callback reports exactly one result, even when aborted.
use crate::api::component::{BufferOps, Component};
use crate::core::buffer::BufferAllocator;
use crate::core::checksum::{EntryPointKind, owner_symbol};
use crate::core::error::{Error, ErrorKind};
use crate::core::handle_map::HandleMap;
use crate::core::status::{CallStatus, ForeignFuture, ForeignFutureComplete, ForeignFutureResult};
use crate::native::scaffolding::{FfiDefault, LoweredError, catch_lowered};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Host objects handed to native code as u64 handles.
pub struct CallbackRegistry<T: ?Sized> {
    entries: HandleMap<Arc<T>>,
}

impl<T: ?Sized> CallbackRegistry<T> {
    pub const fn new() -> Self {
        Self {
            entries: HandleMap::new(),
        }
    }

    pub fn insert(&self, value: Arc<T>) -> u64 {
        self.entries.insert(value)
    }

    pub fn get(&self, handle: u64) -> Result<Arc<T>, Error> {
        self.entries.get(handle).ok_or_else(|| {
            Error::new(ErrorKind::Callback)
                .with_message(format!("unknown callback handle {handle}"))
        })
    }

    /// Called from the vtable's `free` entry.
    pub fn remove(&self, handle: u64) -> Option<Arc<T>> {
        let removed = self.entries.remove(handle);
        if removed.is_none() {
            tracing::warn!(handle, "free for unknown callback handle");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a host implementation for a vtable method and reports through `status`.
///
/// Error buffers are allocated with `buffers` so the native side can free them.
pub fn handle_callback<R, F>(status: &mut CallStatus, buffers: &dyn BufferAllocator, call: F) -> R
where
    R: FfiDefault,
    F: FnOnce() -> Result<R, LoweredError>,
{
    catch_lowered(buffers, status, call)
}

/// Hands a host vtable to the component's `init_callback_vtable` entry.
///
/// # Safety
///
/// `V` must match the `#[repr(C)]` layout the component expects for `interface`.
pub unsafe fn register_vtable<V>(
    component: &Component,
    interface: &str,
    vtable: &'static V,
) -> Result<(), Error> {
    let symbol = owner_symbol(
        component.namespace(),
        EntryPointKind::InitCallbackVtable,
        interface,
    );
    let init = unsafe { component.symbol::<unsafe extern "C" fn(*const V)>(&symbol) }?;
    unsafe { init(vtable as *const V) };
    Ok(())
}

static FOREIGN_FUTURES: HandleMap<JoinHandle<()>> = HandleMap::new();
static CALLBACK_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The ambient tokio runtime, or a lazily started background one.
pub fn callback_runtime() -> Result<Handle, Error> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    if let Some(runtime) = CALLBACK_RUNTIME.get() {
        return Ok(runtime.handle().clone());
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("uniwire-callbacks")
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to start callback runtime")
                .with_source(err)
        })?;
    Ok(CALLBACK_RUNTIME.get_or_init(|| runtime).handle().clone())
}

/// Number of async callbacks not yet freed by the native side.
pub fn pending_foreign_futures() -> usize {
    FOREIGN_FUTURES.len()
}

struct CompletionReporter<R: FfiDefault> {
    complete: ForeignFutureComplete<R>,
    callback_data: u64,
    buffers: BufferOps,
    reported: bool,
}

impl<R: FfiDefault> CompletionReporter<R> {
    fn report(mut self, outcome: Result<R, LoweredError>) {
        let mut call_status = CallStatus::new();
        let return_value = match outcome {
            Ok(value) => value,
            Err(err) => {
                err.write_with(&mut call_status, &self.buffers);
                R::ffi_default()
            }
        };
        self.reported = true;
        (self.complete)(
            self.callback_data,
            ForeignFutureResult {
                return_value,
                call_status,
            },
        );
    }
}

impl<R: FfiDefault> Drop for CompletionReporter<R> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        let message = if std::thread::panicking() {
            "async callback panicked"
        } else {
            "async callback cancelled"
        };
        let mut call_status = CallStatus::new();
        LoweredError::unexpected(message).write_with(&mut call_status, &self.buffers);
        (self.complete)(
            self.callback_data,
            ForeignFutureResult {
                return_value: R::ffi_default(),
                call_status,
            },
        );
    }
}

/// Runs an async host implementation and reports through `complete`.
///
/// Once this returns `Ok`, `complete` runs exactly once, even if the task is
/// aborted or panics. On `Err` nothing was reported and the caller must
/// report the failure itself.
pub fn spawn_foreign_future<R, F>(
    buffers: BufferOps,
    complete: ForeignFutureComplete<R>,
    callback_data: u64,
    future: F,
) -> Result<ForeignFuture, Error>
where
    R: FfiDefault + Send + 'static,
    F: Future<Output = Result<R, LoweredError>> + Send + 'static,
{
    let runtime = callback_runtime()?;
    let reporter = CompletionReporter {
        complete,
        callback_data,
        buffers,
        reported: false,
    };
    let task = runtime.spawn(async move {
        let outcome = future.await;
        reporter.report(outcome);
    });
    let handle = FOREIGN_FUTURES.insert(task);
    Ok(ForeignFuture {
        handle,
        free: foreign_future_free,
    })
}

/// Native code calls this once per `ForeignFuture`, finished or not.
pub extern "C" fn foreign_future_free(handle: u64) {
    match FOREIGN_FUTURES.remove(handle) {
        Some(task) => {
            if !task.is_finished() {
                tracing::trace!(handle, "abort unfinished async callback");
                task.abort();
            }
        }
        None => tracing::warn!(handle, "free for unknown foreign future"),
    }
}
