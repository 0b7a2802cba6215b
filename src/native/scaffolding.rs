//! Purpose: Native-side helpers that run exported code and fill in the Call Status.
//! Exports: `rust_call`, `catch_lowered`, `LoweredError`, `lower_return`, `lower_result`, `lift_arg`.
//! Role: The body of every exported entry point goes through `rust_call`; host
//! callback implementations use `catch_lowered` with the library's allocator.
//! Invariants: Panics never unwind across the ABI; they become status code 2.
//! Invariants: On failure the returned value is the FFI type's zero value and must be ignored.
use crate::core::buffer::{BufferAllocator, LocalAllocator, RustBuffer};
use crate::core::convert::FfiConverter;
use crate::core::error::Error;
use crate::core::status::CallStatus;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A failure already lowered into wire form, ready for a Call Status.
#[derive(Debug)]
pub enum LoweredError {
    /// Declared error; the buffer holds the lowered error value.
    Expected(RustBuffer),
    /// Anything else, reported as a diagnostic message.
    Unexpected(String),
}

impl LoweredError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        LoweredError::Unexpected(message.into())
    }

    /// Writes the failure into `status`.
    pub fn write_to(self, status: &mut CallStatus) {
        self.write_with(status, &LocalAllocator);
    }

    /// Same as `write_to`, lowering any message with `alloc`.
    pub fn write_with(self, status: &mut CallStatus, alloc: &dyn BufferAllocator) {
        match self {
            LoweredError::Expected(buf) => status.set_error(buf),
            LoweredError::Unexpected(message) => {
                status.set_unexpected(lower_message(message, alloc))
            }
        }
    }
}

impl From<Error> for LoweredError {
    fn from(err: Error) -> Self {
        LoweredError::Unexpected(err.to_string())
    }
}

/// Zero value returned alongside a non-zero status.
pub trait FfiDefault {
    fn ffi_default() -> Self;
}

macro_rules! ffi_default_zero {
    ($($ty:ty),*) => {
        $(
            impl FfiDefault for $ty {
                fn ffi_default() -> Self {
                    0 as $ty
                }
            }
        )*
    };
}

ffi_default_zero!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl FfiDefault for () {
    fn ffi_default() -> Self {}
}

impl FfiDefault for RustBuffer {
    fn ffi_default() -> Self {
        RustBuffer::new()
    }
}

/// Runs `call`, catching panics, and reports its outcome through `status`.
pub fn rust_call<R, F>(status: &mut CallStatus, call: F) -> R
where
    R: FfiDefault,
    F: FnOnce() -> Result<R, LoweredError>,
{
    catch_lowered(&LocalAllocator, status, call)
}

/// `rust_call` for code whose error buffers belong to `alloc`.
pub fn catch_lowered<R, F>(alloc: &dyn BufferAllocator, status: &mut CallStatus, call: F) -> R
where
    R: FfiDefault,
    F: FnOnce() -> Result<R, LoweredError>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            err.write_with(status, alloc);
            R::ffi_default()
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::debug!(%message, "call panicked");
            status.set_unexpected(lower_message(message, alloc));
            R::ffi_default()
        }
    }
}

/// Lowers a return value for the host.
pub fn lower_return<T: FfiConverter>(value: T) -> Result<T::FfiType, LoweredError> {
    T::lower(value, &LocalAllocator).map_err(LoweredError::from)
}

/// Lowers a `Result` whose error is a declared error type.
pub fn lower_result<T, E>(result: Result<T, E>) -> Result<T::FfiType, LoweredError>
where
    T: FfiConverter,
    E: FfiConverter<FfiType = RustBuffer>,
{
    lower_result_with(&LocalAllocator, result)
}

pub fn lower_result_with<T, E>(
    alloc: &dyn BufferAllocator,
    result: Result<T, E>,
) -> Result<T::FfiType, LoweredError>
where
    T: FfiConverter,
    E: FfiConverter<FfiType = RustBuffer>,
{
    match result {
        Ok(value) => T::lower(value, alloc).map_err(LoweredError::from),
        Err(err) => {
            let buf = E::lower(err, alloc)?;
            Err(LoweredError::Expected(buf))
        }
    }
}

/// Lifts an argument the host lowered for this call.
pub fn lift_arg<T: FfiConverter>(value: T::FfiType, name: &str) -> Result<T, LoweredError> {
    T::try_lift(value, &LocalAllocator)
        .map_err(|err| LoweredError::Unexpected(format!("failed to lift argument `{name}`: {err}")))
}

pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "native panic with a non-string payload".to_string()
}

fn lower_message(message: String, alloc: &dyn BufferAllocator) -> RustBuffer {
    String::lower(message, alloc).unwrap_or_else(|_| RustBuffer::new())
}

#[cfg(test)]
mod tests {
    use super::{LoweredError, lift_arg, lower_result, lower_return, rust_call};
    use crate::core::buffer::{LocalAllocator, RustBuffer};
    use crate::core::convert::FfiConverter;
    use crate::core::error::{CallError, ErrorKind};
    use crate::core::status::{CallStatus, check_call_status, check_infallible_status};

    #[test]
    fn success_leaves_status_zeroed() {
        let mut status = CallStatus::new();
        let value: u32 = rust_call(&mut status, || Ok(41 + 1));
        assert_eq!(value, 42);
        assert!(status.is_success());
        assert!(status.error_buf.is_empty());
    }

    #[test]
    fn declared_error_sets_code_one() {
        let mut status = CallStatus::new();
        let value: RustBuffer = rust_call(&mut status, || {
            lower_result::<String, String>(Err("no such key".to_string()))
        });
        assert!(value.is_empty());
        assert_eq!(status.code, 1);
        match check_call_status::<String>(&LocalAllocator, status) {
            Err(CallError::Expected(message)) => assert_eq!(message, "no such key"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn panic_sets_code_two_with_message() {
        let mut status = CallStatus::new();
        let value: f64 = rust_call(&mut status, || -> Result<f64, LoweredError> {
            panic!("divide by zero")
        });
        assert_eq!(value, 0.0);
        assert_eq!(status.code, 2);
        let err = check_infallible_status(&LocalAllocator, status).expect_err("error");
        assert_eq!(err.kind(), ErrorKind::Panic);
        assert_eq!(err.message(), Some("divide by zero"));
    }

    #[test]
    fn formatted_panic_message_is_kept() {
        let mut status = CallStatus::new();
        let index = 9;
        rust_call(&mut status, || -> Result<(), LoweredError> {
            panic!("index {index} out of range")
        });
        let err = check_infallible_status(&LocalAllocator, status).expect_err("error");
        assert_eq!(err.message(), Some("index 9 out of range"));
    }

    #[test]
    fn lift_arg_names_the_argument() {
        let err = lift_arg::<bool>(5, "flag").expect_err("should fail");
        match err {
            LoweredError::Unexpected(message) => assert!(message.contains("`flag`")),
            LoweredError::Expected(_) => panic!("expected an unexpected error"),
        }
    }

    #[test]
    fn lowered_return_lifts_on_host() {
        let buf = lower_return(vec!["a".to_string(), "b".to_string()]).expect("lower");
        let lifted = Vec::<String>::try_lift(buf, &LocalAllocator).expect("lift");
        assert_eq!(lifted, vec!["a", "b"]);
    }
}
