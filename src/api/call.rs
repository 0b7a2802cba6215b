// Synchronous dispatch: zeroed status in, checked status out.
use crate::core::buffer::{BufferAllocator, RustBuffer};
use crate::core::convert::FfiConverter;
use crate::core::error::{CallError, Error};
use crate::core::status::{CallStatus, check_call_status, check_infallible_status};

/// Runs a native call that declares no error type.
///
/// The raw return value is only handed back when the status is success;
/// otherwise it is the FFI zero value and is discarded.
pub fn rust_call<R, F>(buffers: &dyn BufferAllocator, call: F) -> Result<R, Error>
where
    F: FnOnce(&mut CallStatus) -> R,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    check_infallible_status(buffers, status)?;
    Ok(value)
}

/// Runs a native call whose code-1 failures decode as `E`.
pub fn rust_call_with_error<E, R, F>(buffers: &dyn BufferAllocator, call: F) -> Result<R, CallError<E>>
where
    E: FfiConverter<FfiType = RustBuffer>,
    F: FnOnce(&mut CallStatus) -> R,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    check_call_status::<E>(buffers, status)?;
    Ok(value)
}
