//! Purpose: Call Status out-parameter and the three-way status check.
//! Exports: `CallStatus`, `CallStatusCode`, `check_call_status`, `check_infallible_status`.
//! Role: Every fallible boundary call, in either direction, reports through this struct.
//! Invariants: Code 0 never touches the error buffer.
//! Invariants: Code 1 decodes the declared error type; code 2 decodes a diagnostic string.
//! Invariants: Any other code is a protocol violation and the buffer is left unread.
use crate::core::buffer::{BufferAllocator, RustBuffer};
use crate::core::convert::FfiConverter;
use crate::core::error::{CallError, Error, ErrorKind, protocol};

pub const UNKNOWN_PANIC_MESSAGE: &str = "native panic with no message";

/// Poll result: the future may have made progress; poll again.
pub const POLL_NOT_READY: i8 = 0;
/// Poll result: the future is done (or cancelled); call `complete`.
pub const POLL_READY: i8 = 1;

/// Wakeup entry point the host passes to each native poll.
pub type ContinuationCallback = extern "C" fn(data: u64, poll_result: i8);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i8)]
pub enum CallStatusCode {
    Success = 0,
    Error = 1,
    UnexpectedError = 2,
}

impl CallStatusCode {
    pub fn from_raw(code: i8) -> Option<Self> {
        match code {
            0 => Some(CallStatusCode::Success),
            1 => Some(CallStatusCode::Error),
            2 => Some(CallStatusCode::UnexpectedError),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: RustBuffer,
}

impl CallStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.code == CallStatusCode::Success as i8
    }

    /// Records a declared error whose lowered value is already in `buf`.
    pub fn set_error(&mut self, buf: RustBuffer) {
        self.code = CallStatusCode::Error as i8;
        self.error_buf = buf;
    }

    /// Records an unexpected failure carrying `buf` as its lowered message.
    pub fn set_unexpected(&mut self, buf: RustBuffer) {
        self.code = CallStatusCode::UnexpectedError as i8;
        self.error_buf = buf;
    }

    fn take_error_buf(&mut self) -> RustBuffer {
        std::mem::take(&mut self.error_buf)
    }
}

/// Releases a pending async callback; the host aborts it if still running.
pub type ForeignFutureFree = extern "C" fn(handle: u64);

/// Host-side async callback in flight, as returned through a vtable method.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ForeignFuture {
    pub handle: u64,
    pub free: ForeignFutureFree,
}

/// Outcome of an async callback, reported once through its completion callback.
#[repr(C)]
#[derive(Debug)]
pub struct ForeignFutureResult<R> {
    pub return_value: R,
    pub call_status: CallStatus,
}

/// Completion entry point the native side passes with each async callback call.
///
/// `callback_data` owns native state; the host calls this exactly once per
/// accepted call, even after the call's `ForeignFuture` was freed.
pub type ForeignFutureComplete<R> = extern "C" fn(callback_data: u64, result: ForeignFutureResult<R>);

/// Translates a filled-in status into a typed or runtime error.
pub fn check_call_status<E>(
    alloc: &dyn BufferAllocator,
    mut status: CallStatus,
) -> Result<(), CallError<E>>
where
    E: FfiConverter<FfiType = RustBuffer>,
{
    match CallStatusCode::from_raw(status.code) {
        Some(CallStatusCode::Success) => Ok(()),
        Some(CallStatusCode::Error) => {
            let err = E::try_lift(status.take_error_buf(), alloc)?;
            Err(CallError::Expected(err))
        }
        Some(CallStatusCode::UnexpectedError) => {
            Err(CallError::Runtime(unexpected_error(alloc, status.take_error_buf())))
        }
        None => Err(CallError::Runtime(unknown_code(status.code))),
    }
}

/// Status check for calls that declare no error type.
pub fn check_infallible_status(
    alloc: &dyn BufferAllocator,
    mut status: CallStatus,
) -> Result<(), Error> {
    match CallStatusCode::from_raw(status.code) {
        Some(CallStatusCode::Success) => Ok(()),
        Some(CallStatusCode::Error) => {
            if let Err(err) = alloc.free(status.take_error_buf()) {
                tracing::warn!(error = %err, "failed to free unexpected typed error buffer");
            }
            Err(protocol("typed error returned from a call that declares none")
                .with_code(status.code))
        }
        Some(CallStatusCode::UnexpectedError) => {
            Err(unexpected_error(alloc, status.take_error_buf()))
        }
        None => Err(unknown_code(status.code)),
    }
}

fn unexpected_error(alloc: &dyn BufferAllocator, buf: RustBuffer) -> Error {
    let code = CallStatusCode::UnexpectedError as i8;
    if buf.is_empty() {
        if let Err(err) = alloc.free(buf) {
            tracing::warn!(error = %err, "failed to free empty panic buffer");
        }
        return Error::new(ErrorKind::Panic)
            .with_message(UNKNOWN_PANIC_MESSAGE)
            .with_code(code);
    }
    match String::try_lift(buf, alloc) {
        Ok(message) => Error::new(ErrorKind::Panic)
            .with_message(message)
            .with_code(code),
        Err(err) => err,
    }
}

fn unknown_code(code: i8) -> Error {
    protocol("unknown call status code").with_code(code)
}
