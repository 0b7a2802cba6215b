//! Purpose: Host-side wrappers around native object handles.
//! Exports: `ObjectVTable`, `ForeignObject`, `wire_object!`.
//! Role: Every generated object type is a thin newtype over `ForeignObject`.
//! Invariants: The call counter starts at 1; methods hold +1 for their duration;
//! `destroy` gives up the initial 1 once; the native free runs when it reaches 0.
//! Invariants: No method call starts after the counter has reached 0.
//! Invariants: A cloned reference is freed here unless it was handed to native code.
use crate::api::call::rust_call;
use crate::api::cleaner::{Cleanable, Cleaner};
use crate::api::component::{BufferOps, Component};
use crate::core::checksum::{EntryPointKind, owner_symbol};
use crate::core::error::{Error, ErrorKind};
use crate::core::status::CallStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub type ObjectCloneFn = unsafe extern "C" fn(handle: u64, status: &mut CallStatus) -> u64;
pub type ObjectFreeFn = unsafe extern "C" fn(handle: u64, status: &mut CallStatus);

/// Per-type entry points and runtime services for one object type.
#[derive(Clone)]
pub struct ObjectVTable {
    pub clone: ObjectCloneFn,
    pub free: ObjectFreeFn,
    pub buffers: BufferOps,
    pub cleaner: Arc<dyn Cleaner>,
}

impl std::fmt::Debug for ObjectVTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectVTable")
            .field("clone", &self.clone)
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

impl ObjectVTable {
    /// Resolves `uniwire_<ns>_fn_clone_<object>` and `..._free_<object>`.
    pub fn resolve(component: &Component, object: &str) -> Result<Arc<Self>, Error> {
        let ns = component.namespace();
        let clone = unsafe {
            component.symbol::<ObjectCloneFn>(&owner_symbol(ns, EntryPointKind::CloneObject, object))
        }?;
        let free = unsafe {
            component.symbol::<ObjectFreeFn>(&owner_symbol(ns, EntryPointKind::FreeObject, object))
        }?;
        Ok(Arc::new(Self {
            clone,
            free,
            buffers: *component.buffers(),
            cleaner: component.cleaner(),
        }))
    }

    /// Gives back one native reference that never reached native code.
    pub fn free_reference(&self, handle: u64) {
        let free = self.free;
        if let Err(err) = rust_call(&self.buffers, |status| unsafe { free(handle, status) }) {
            tracing::warn!(handle, error = %err, "freeing unused object reference failed");
        }
    }
}

/// A native reference minted for one call.
///
/// Dropping it frees the reference; `into_raw` hands it to native code instead.
#[must_use = "dropping a cloned handle frees it"]
#[derive(Debug)]
pub struct ClonedHandle<'a> {
    handle: u64,
    vtable: &'a ObjectVTable,
    armed: bool,
}

impl ClonedHandle<'_> {
    /// Transfers the reference; the callee now owns it.
    pub fn into_raw(mut self) -> u64 {
        self.armed = false;
        self.handle
    }
}

impl Drop for ClonedHandle<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(handle = self.handle, "releasing unused object reference");
            self.vtable.free_reference(self.handle);
        }
    }
}

/// Owns one native handle and its lifetime bookkeeping.
#[derive(Debug)]
pub struct ForeignObject {
    handle: u64,
    vtable: Arc<ObjectVTable>,
    calls: AtomicU64,
    destroyed: AtomicBool,
    cleanable: Cleanable,
}

impl ForeignObject {
    /// Takes ownership of a handle returned by a constructor or method.
    pub fn from_raw(handle: u64, vtable: Arc<ObjectVTable>) -> Self {
        let cleanable = Cleanable::new(
            handle,
            vtable.free,
            vtable.buffers,
            Arc::new(AtomicBool::new(false)),
        );
        Self {
            handle,
            vtable,
            calls: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
            cleanable,
        }
    }

    pub fn vtable(&self) -> &Arc<ObjectVTable> {
        &self.vtable
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Runs `call` with a fresh native reference to the object.
    ///
    /// The native method consumes that reference once `call` takes it with
    /// `ClonedHandle::into_raw`; if `call` bails out first, it is freed here.
    /// The counter keeps the original alive even if `destroy` runs concurrently.
    pub fn call_with_handle<R, E, F>(&self, call: F) -> Result<R, E>
    where
        E: From<Error>,
        F: FnOnce(ClonedHandle<'_>) -> Result<R, E>,
    {
        self.acquire()?;
        let _release = CallGuard { object: self };
        let handle = self.native_clone()?;
        call(ClonedHandle {
            handle,
            vtable: &self.vtable,
            armed: true,
        })
    }

    /// Returns a new native reference (for passing the object as an argument).
    pub fn clone_handle(&self) -> Result<u64, Error> {
        self.call_with_handle(|handle| Ok(handle.into_raw()))
    }

    fn native_clone(&self) -> Result<u64, Error> {
        let clone = self.vtable.clone;
        let handle = self.handle;
        rust_call(&self.vtable.buffers, |status| unsafe { clone(handle, status) })
    }

    /// Releases the native object; later calls are no-ops.
    pub fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.release();
        }
    }

    fn acquire(&self) -> Result<(), Error> {
        let mut current = self.calls.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("object has already been destroyed"));
            }
            if current == u64::MAX {
                return Err(Error::new(ErrorKind::Internal).with_message("call counter overflow"));
            }
            match self.calls.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        if self.calls.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.cleanable.clean();
        }
    }
}

struct CallGuard<'a> {
    object: &'a ForeignObject,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.object.release();
    }
}

impl Drop for ForeignObject {
    fn drop(&mut self) {
        if !self.cleanable.is_cleaned() {
            self.vtable.cleaner.schedule(self.cleanable.clone());
        }
    }
}

/// Declares a host wrapper type for a native object and its converter.
///
/// `$vtable` is an expression evaluating to `Result<Arc<ObjectVTable>, Error>`,
/// used when a handle arrives from native code.
#[macro_export]
macro_rules! wire_object {
    ($(#[$meta:meta])* $vis:vis struct $name:ident, vtable = $vtable:expr $(,)?) => {
        $(#[$meta])*
        #[derive(Debug)]
        $vis struct $name {
            inner: $crate::api::ForeignObject,
        }

        impl $name {
            pub fn from_object(inner: $crate::api::ForeignObject) -> Self {
                Self { inner }
            }

            pub fn object(&self) -> &$crate::api::ForeignObject {
                &self.inner
            }

            pub fn destroy(&self) {
                self.inner.destroy();
            }
        }

        impl $crate::core::convert::FfiConverter for $name {
            type FfiType = u64;
            const MIN_WIRE_LEN: usize = 8;

            fn lower(
                value: Self,
                _alloc: &dyn $crate::core::buffer::BufferAllocator,
            ) -> Result<u64, $crate::core::error::Error> {
                value.inner.clone_handle()
            }

            fn try_lift(
                value: u64,
                _alloc: &dyn $crate::core::buffer::BufferAllocator,
            ) -> Result<Self, $crate::core::error::Error> {
                let vtable: Result<
                    ::std::sync::Arc<$crate::api::ObjectVTable>,
                    $crate::core::error::Error,
                > = $vtable;
                Ok(Self::from_object($crate::api::ForeignObject::from_raw(value, vtable?)))
            }

            fn write(
                value: &Self,
                writer: &mut $crate::core::wire::WireWriter,
            ) -> Result<(), $crate::core::error::Error> {
                let handle = value.inner.clone_handle()?;
                let vtable = ::std::sync::Arc::clone(value.inner.vtable());
                writer.write_u64(handle);
                writer.on_abandon(move || vtable.free_reference(handle));
                Ok(())
            }

            fn read(
                reader: &mut $crate::core::wire::WireReader<'_>,
            ) -> Result<Self, $crate::core::error::Error> {
                let handle = reader.read_u64()?;
                <Self as $crate::core::convert::FfiConverter>::try_lift(
                    handle,
                    &$crate::core::buffer::LocalAllocator,
                )
            }
        }
    };
}
