//! Purpose: Fixed-name C ABI every component library exports.
//! Exports: contract version, Wire Buffer alloc/free/reserve/from-bytes, native future entry points.
//! Role: The runtime half of a component; generated entry points sit beside these.
//! Invariants: Every fallible entry point reports through a `CallStatus` and never unwinds.
//! Invariants: Buffers are freed only by the library that allocated them.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use crate::core::buffer::{ForeignBytes, MAX_BUFFER_LEN, RustBuffer};
use crate::core::checksum::CONTRACT_VERSION;
use crate::core::error::protocol;
use crate::core::status::{CallStatus, ContinuationCallback};
use crate::native::future::{
    rust_future_cancel, rust_future_complete, rust_future_free, rust_future_poll,
};
use crate::native::scaffolding::{LoweredError, rust_call};

#[unsafe(no_mangle)]
pub extern "C" fn uniwire_contract_version() -> u32 {
    CONTRACT_VERSION
}

#[unsafe(no_mangle)]
pub extern "C" fn uniwire_rustbuffer_alloc(len: u64, status: &mut CallStatus) -> RustBuffer {
    rust_call(status, || {
        if len > MAX_BUFFER_LEN {
            return Err(protocol(format!("cannot allocate buffer of {len} bytes")).into());
        }
        Ok(RustBuffer::from_vec(vec![0u8; len as usize]))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn uniwire_rustbuffer_from_bytes(
    bytes: ForeignBytes,
    status: &mut CallStatus,
) -> RustBuffer {
    rust_call(status, || {
        let slice = bytes.as_slice()?;
        Ok(RustBuffer::from_vec(slice.to_vec()))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn uniwire_rustbuffer_free(buf: RustBuffer, status: &mut CallStatus) {
    rust_call(status, || {
        if buf.len() > buf.capacity() {
            return Err(LoweredError::from(protocol("freeing buffer with length above capacity")));
        }
        buf.destroy();
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn uniwire_rustbuffer_reserve(
    buf: RustBuffer,
    additional: u64,
    status: &mut CallStatus,
) -> RustBuffer {
    rust_call(status, || buf.reserve(additional).map_err(LoweredError::from))
}

macro_rules! future_entry_points {
    ($($ty:ty => $poll:ident, $cancel:ident, $complete:ident, $free:ident;)*) => {
        $(
            #[unsafe(no_mangle)]
            pub extern "C" fn $poll(handle: u64, callback: ContinuationCallback, data: u64) {
                unsafe { rust_future_poll::<$ty>(handle, callback, data) }
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn $cancel(handle: u64) {
                unsafe { rust_future_cancel::<$ty>(handle) }
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn $complete(handle: u64, status: &mut CallStatus) -> $ty {
                unsafe { rust_future_complete::<$ty>(handle, status) }
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn $free(handle: u64) {
                unsafe { rust_future_free::<$ty>(handle) }
            }
        )*
    };
}

future_entry_points! {
    u8 => uniwire_rust_future_poll_u8, uniwire_rust_future_cancel_u8,
        uniwire_rust_future_complete_u8, uniwire_rust_future_free_u8;
    i8 => uniwire_rust_future_poll_i8, uniwire_rust_future_cancel_i8,
        uniwire_rust_future_complete_i8, uniwire_rust_future_free_i8;
    u16 => uniwire_rust_future_poll_u16, uniwire_rust_future_cancel_u16,
        uniwire_rust_future_complete_u16, uniwire_rust_future_free_u16;
    i16 => uniwire_rust_future_poll_i16, uniwire_rust_future_cancel_i16,
        uniwire_rust_future_complete_i16, uniwire_rust_future_free_i16;
    u32 => uniwire_rust_future_poll_u32, uniwire_rust_future_cancel_u32,
        uniwire_rust_future_complete_u32, uniwire_rust_future_free_u32;
    i32 => uniwire_rust_future_poll_i32, uniwire_rust_future_cancel_i32,
        uniwire_rust_future_complete_i32, uniwire_rust_future_free_i32;
    u64 => uniwire_rust_future_poll_u64, uniwire_rust_future_cancel_u64,
        uniwire_rust_future_complete_u64, uniwire_rust_future_free_u64;
    i64 => uniwire_rust_future_poll_i64, uniwire_rust_future_cancel_i64,
        uniwire_rust_future_complete_i64, uniwire_rust_future_free_i64;
    f32 => uniwire_rust_future_poll_f32, uniwire_rust_future_cancel_f32,
        uniwire_rust_future_complete_f32, uniwire_rust_future_free_f32;
    f64 => uniwire_rust_future_poll_f64, uniwire_rust_future_cancel_f64,
        uniwire_rust_future_complete_f64, uniwire_rust_future_free_f64;
    RustBuffer => uniwire_rust_future_poll_rust_buffer, uniwire_rust_future_cancel_rust_buffer,
        uniwire_rust_future_complete_rust_buffer, uniwire_rust_future_free_rust_buffer;
    () => uniwire_rust_future_poll_void, uniwire_rust_future_cancel_void,
        uniwire_rust_future_complete_void, uniwire_rust_future_free_void;
}
