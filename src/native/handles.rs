// Arc-backed object handles handed to the host as opaque u64 values.
use crate::core::error::{Error, protocol};
use std::sync::Arc;

/// Leaks one strong reference and returns its address as the handle.
pub fn export_arc<T: Send + Sync>(value: Arc<T>) -> u64 {
    Arc::into_raw(value) as usize as u64
}

fn handle_ptr<T>(handle: u64) -> Result<*const T, Error> {
    if handle == 0 {
        return Err(protocol("null object handle"));
    }
    Ok(handle as usize as *const T)
}

/// Adds a strong reference and returns a second handle for it.
///
/// # Safety
///
/// `handle` must come from `export_arc::<T>` and not have been freed.
pub unsafe fn clone_arc<T: Send + Sync>(handle: u64) -> Result<u64, Error> {
    let ptr = handle_ptr::<T>(handle)?;
    unsafe { Arc::increment_strong_count(ptr) };
    Ok(handle)
}

/// Drops the reference the handle stands for.
///
/// # Safety
///
/// `handle` must come from `export_arc::<T>` or `clone_arc::<T>`, and each
/// such handle must be freed at most once.
pub unsafe fn free_arc<T: Send + Sync>(handle: u64) -> Result<(), Error> {
    let ptr = handle_ptr::<T>(handle)?;
    tracing::trace!(handle, "free object handle");
    drop(unsafe { Arc::from_raw(ptr) });
    Ok(())
}

/// Turns a handle back into the `Arc` it stands for, consuming the handle.
///
/// Method entry points receive a handle the host cloned for the call, so
/// taking it here releases that reference when the call returns.
///
/// # Safety
///
/// Same as `free_arc`.
pub unsafe fn take_arc<T: Send + Sync>(handle: u64) -> Result<Arc<T>, Error> {
    let ptr = handle_ptr::<T>(handle)?;
    Ok(unsafe { Arc::from_raw(ptr) })
}
