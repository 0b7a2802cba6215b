//! Purpose: Deferred release of native objects whose wrappers were dropped.
//! Exports: `Cleaner`, `InlineCleaner`, `ThreadCleaner`, `Cleanable`, `cleaner_for`.
//! Role: Backs `ForeignObject`'s drop path; explicit destroy bypasses it.
//! Invariants: A `Cleanable` never references its wrapper, only the raw handle.
//! Invariants: The shared `cleaned` flag lets exactly one path run the native free.
use crate::api::call::rust_call;
use crate::api::component::BufferOps;
use crate::api::object::ObjectFreeFn;
use crate::core::config::CleanerKind;
use crate::core::error::{Error, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};

/// Everything needed to free one native object.
#[derive(Clone, Debug)]
pub struct Cleanable {
    handle: u64,
    free: ObjectFreeFn,
    buffers: BufferOps,
    cleaned: Arc<AtomicBool>,
}

impl Cleanable {
    pub fn new(handle: u64, free: ObjectFreeFn, buffers: BufferOps, cleaned: Arc<AtomicBool>) -> Self {
        Self {
            handle,
            free,
            buffers,
            cleaned,
        }
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::Acquire)
    }

    /// Runs the native free unless another path already did; returns whether it ran.
    pub fn clean(&self) -> bool {
        if self
            .cleaned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        tracing::trace!(handle = self.handle, "free native object");
        let free = self.free;
        let handle = self.handle;
        if let Err(err) = rust_call(&self.buffers, |status| unsafe { free(handle, status) }) {
            tracing::warn!(handle, error = %err, "native object free failed");
        }
        true
    }
}

pub trait Cleaner: Send + Sync {
    fn schedule(&self, cleanable: Cleanable);
}

/// Frees on the thread that dropped the wrapper.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineCleaner;

impl Cleaner for InlineCleaner {
    fn schedule(&self, cleanable: Cleanable) {
        cleanable.clean();
    }
}

/// Frees on a dedicated background thread.
#[derive(Debug)]
pub struct ThreadCleaner {
    sender: mpsc::Sender<Cleanable>,
}

impl ThreadCleaner {
    pub fn spawn() -> Result<Self, Error> {
        let (sender, receiver) = mpsc::channel::<Cleanable>();
        std::thread::Builder::new()
            .name("uniwire-cleaner".to_string())
            .spawn(move || {
                for cleanable in receiver {
                    cleanable.clean();
                }
            })
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to spawn cleaner thread")
                    .with_source(err)
            })?;
        Ok(Self { sender })
    }
}

impl Cleaner for ThreadCleaner {
    fn schedule(&self, cleanable: Cleanable) {
        if let Err(mpsc::SendError(cleanable)) = self.sender.send(cleanable) {
            // Cleaner thread is gone; free here rather than leak.
            cleanable.clean();
        }
    }
}

pub fn cleaner_for(kind: CleanerKind) -> Result<Arc<dyn Cleaner>, Error> {
    Ok(match kind {
        CleanerKind::Inline => Arc::new(InlineCleaner),
        CleanerKind::Thread => Arc::new(ThreadCleaner::spawn()?),
    })
}
