//! Purpose: Lowering and lifting rules for every value type that crosses the boundary.
//! Exports: `FfiConverter`, buffer helpers, and the `wire_record!` / `wire_enum!` macros.
//! Role: Shared by host bindings and native scaffolding; both agree on one wire format.
//! Invariants: `try_lift(lower(x)) == x` for every implementation.
//! Invariants: Scalars pass by value; everything else travels in a `RustBuffer`.
//! Invariants: Record fields and enum payloads are written in declaration order.
use crate::core::buffer::{BufferAllocator, RustBuffer};
use crate::core::error::{Error, protocol};
use crate::core::wire::{WireReader, WireWriter};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait FfiConverter: Sized {
    /// ABI-safe representation passed to or returned from an entry point.
    type FfiType;

    /// Fewest bytes one value occupies on the wire.
    ///
    /// Sequence reads use it to reject counts the input cannot hold; 0 turns
    /// that check off.
    const MIN_WIRE_LEN: usize = 0;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error>;

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error>;

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error>;

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error>;
}

pub fn lower_into_rust_buffer<T: FfiConverter>(
    value: &T,
    alloc: &dyn BufferAllocator,
) -> Result<RustBuffer, Error> {
    let mut writer = WireWriter::new();
    T::write(value, &mut writer)?;
    let buf = alloc.alloc_from_bytes(writer.as_bytes())?;
    writer.commit();
    Ok(buf)
}

pub fn try_lift_from_rust_buffer<T: FfiConverter>(
    buf: RustBuffer,
    alloc: &dyn BufferAllocator,
) -> Result<T, Error> {
    let bytes = alloc.take_bytes(buf)?;
    let mut reader = WireReader::new(&bytes);
    let value = T::read(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// Rejects a sequence count the remaining input is too short to hold.
fn check_count(reader: &WireReader<'_>, count: usize, min_len: usize) -> Result<(), Error> {
    if min_len > 0 && count > reader.remaining() / min_len {
        return Err(protocol(format!(
            "sequence of {count} elements cannot fit in {} remaining bytes",
            reader.remaining()
        )));
    }
    Ok(())
}

macro_rules! scalar_converter {
    ($ty:ty, $read:ident, $write:ident) => {
        impl FfiConverter for $ty {
            type FfiType = $ty;
            const MIN_WIRE_LEN: usize = std::mem::size_of::<$ty>();

            fn lower(value: Self, _alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
                Ok(value)
            }

            fn try_lift(value: Self::FfiType, _alloc: &dyn BufferAllocator) -> Result<Self, Error> {
                Ok(value)
            }

            fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
                writer.$write(*value);
                Ok(())
            }

            fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
                reader.$read()
            }
        }
    };
}

scalar_converter!(u8, read_u8, write_u8);
scalar_converter!(i8, read_i8, write_i8);
scalar_converter!(u16, read_u16, write_u16);
scalar_converter!(i16, read_i16, write_i16);
scalar_converter!(u32, read_u32, write_u32);
scalar_converter!(i32, read_i32, write_i32);
scalar_converter!(u64, read_u64, write_u64);
scalar_converter!(i64, read_i64, write_i64);
scalar_converter!(f32, read_f32, write_f32);
scalar_converter!(f64, read_f64, write_f64);

impl FfiConverter for bool {
    type FfiType = i8;
    const MIN_WIRE_LEN: usize = 1;

    fn lower(value: Self, _alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        Ok(i8::from(value))
    }

    fn try_lift(value: Self::FfiType, _alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(protocol(format!("unexpected byte {other} for boolean"))),
        }
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        writer.write_i8(i8::from(*value));
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        let byte = reader.read_i8()?;
        Self::try_lift(byte, &crate::core::buffer::LocalAllocator)
    }
}

impl FfiConverter for String {
    type FfiType = RustBuffer;
    const MIN_WIRE_LEN: usize = 4;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        lower_into_rust_buffer(&value, alloc)
    }

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        try_lift_from_rust_buffer(value, alloc)
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        writer.write_str(value)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        reader.read_string()
    }
}

impl<T: FfiConverter> FfiConverter for Option<T> {
    type FfiType = RustBuffer;
    const MIN_WIRE_LEN: usize = 1;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        lower_into_rust_buffer(&value, alloc)
    }

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        try_lift_from_rust_buffer(value, alloc)
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        match value {
            None => {
                writer.write_i8(0);
                Ok(())
            }
            Some(inner) => {
                writer.write_i8(1);
                T::write(inner, writer)
            }
        }
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        match reader.read_i8()? {
            0 => Ok(None),
            1 => Ok(Some(T::read(reader)?)),
            other => Err(protocol(format!("unexpected presence byte {other}"))),
        }
    }
}

/// `Vec<u8>` doubles as the bytes type: its element encoding is one raw byte.
impl<T: FfiConverter> FfiConverter for Vec<T> {
    type FfiType = RustBuffer;
    const MIN_WIRE_LEN: usize = 4;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        lower_into_rust_buffer(&value, alloc)
    }

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        try_lift_from_rust_buffer(value, alloc)
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        writer.write_len(value.len())?;
        for item in value {
            T::write(item, writer)?;
        }
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        let count = reader.read_len()?;
        check_count(reader, count, T::MIN_WIRE_LEN)?;
        // Elements may be empty on the wire, so the count alone is no bound.
        let mut out = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            out.push(T::read(reader)?);
        }
        Ok(out)
    }
}

impl<K, V> FfiConverter for HashMap<K, V>
where
    K: FfiConverter + Eq + Hash,
    V: FfiConverter,
{
    type FfiType = RustBuffer;
    const MIN_WIRE_LEN: usize = 4;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        lower_into_rust_buffer(&value, alloc)
    }

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        try_lift_from_rust_buffer(value, alloc)
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        writer.write_len(value.len())?;
        for (key, item) in value {
            K::write(key, writer)?;
            V::write(item, writer)?;
        }
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        let count = reader.read_len()?;
        check_count(reader, count, K::MIN_WIRE_LEN + V::MIN_WIRE_LEN)?;
        let mut out = HashMap::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let key = K::read(reader)?;
            let item = V::read(reader)?;
            out.insert(key, item);
        }
        Ok(out)
    }
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

impl FfiConverter for Duration {
    type FfiType = RustBuffer;
    const MIN_WIRE_LEN: usize = 12;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        lower_into_rust_buffer(&value, alloc)
    }

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        try_lift_from_rust_buffer(value, alloc)
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        writer.write_u64(value.as_secs());
        writer.write_u32(value.subsec_nanos());
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        let secs = reader.read_u64()?;
        let nanos = reader.read_u32()?;
        if nanos >= NANOS_PER_SEC {
            return Err(protocol(format!("duration nanos out of range: {nanos}")));
        }
        Ok(Duration::new(secs, nanos))
    }
}

/// Timestamps are floor-split around the epoch: `seconds + nanos / 1e9`.
impl FfiConverter for SystemTime {
    type FfiType = RustBuffer;
    const MIN_WIRE_LEN: usize = 12;

    fn lower(value: Self, alloc: &dyn BufferAllocator) -> Result<Self::FfiType, Error> {
        lower_into_rust_buffer(&value, alloc)
    }

    fn try_lift(value: Self::FfiType, alloc: &dyn BufferAllocator) -> Result<Self, Error> {
        try_lift_from_rust_buffer(value, alloc)
    }

    fn write(value: &Self, writer: &mut WireWriter) -> Result<(), Error> {
        let (secs, nanos) = match value.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let secs = i64::try_from(after.as_secs())
                    .map_err(|_| protocol("timestamp too far after the epoch"))?;
                (secs, after.subsec_nanos())
            }
            Err(before) => {
                let before = before.duration();
                let whole = i64::try_from(before.as_secs())
                    .map_err(|_| protocol("timestamp too far before the epoch"))?;
                match before.subsec_nanos() {
                    0 => (-whole, 0),
                    nanos => (-whole - 1, NANOS_PER_SEC - nanos),
                }
            }
        };
        writer.write_i64(secs);
        writer.write_u32(nanos);
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, Error> {
        let secs = reader.read_i64()?;
        let nanos = reader.read_u32()?;
        if nanos >= NANOS_PER_SEC {
            return Err(protocol(format!("timestamp nanos out of range: {nanos}")));
        }
        let fraction = Duration::from_nanos(u64::from(nanos));
        let out_of_range = || protocol("timestamp out of range for this platform");
        if secs >= 0 {
            UNIX_EPOCH
                .checked_add(Duration::from_secs(secs as u64))
                .and_then(|time| time.checked_add(fraction))
                .ok_or_else(out_of_range)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(secs.unsigned_abs()))
                .and_then(|time| time.checked_add(fraction))
                .ok_or_else(out_of_range)
        }
    }
}

/// Declares a record and its converter; fields go on the wire in the order written.
#[macro_export]
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_meta:meta])* $field_vis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$field_meta])* $field_vis $field: $ty, )*
        }

        impl $crate::core::convert::FfiConverter for $name {
            type FfiType = $crate::core::buffer::RustBuffer;
            const MIN_WIRE_LEN: usize =
                0 $( + <$ty as $crate::core::convert::FfiConverter>::MIN_WIRE_LEN )*;

            fn lower(
                value: Self,
                alloc: &dyn $crate::core::buffer::BufferAllocator,
            ) -> ::std::result::Result<Self::FfiType, $crate::core::error::Error> {
                $crate::core::convert::lower_into_rust_buffer(&value, alloc)
            }

            fn try_lift(
                value: Self::FfiType,
                alloc: &dyn $crate::core::buffer::BufferAllocator,
            ) -> ::std::result::Result<Self, $crate::core::error::Error> {
                $crate::core::convert::try_lift_from_rust_buffer(value, alloc)
            }

            fn write(
                value: &Self,
                writer: &mut $crate::core::wire::WireWriter,
            ) -> ::std::result::Result<(), $crate::core::error::Error> {
                $( <$ty as $crate::core::convert::FfiConverter>::write(&value.$field, writer)?; )*
                let _ = writer;
                Ok(())
            }

            fn read(
                reader: &mut $crate::core::wire::WireReader<'_>,
            ) -> ::std::result::Result<Self, $crate::core::error::Error> {
                let _ = &reader;
                Ok(Self {
                    $( $field: <$ty as $crate::core::convert::FfiConverter>::read(reader)?, )*
                })
            }
        }
    };
}

/// Declares a fieldless enum whose wire form is a 1-based i32 variant index.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$variant_meta:meta])* $variant:ident ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $(#[$variant_meta])* $variant, )+
        }

        impl $crate::core::convert::FfiConverter for $name {
            type FfiType = $crate::core::buffer::RustBuffer;
            const MIN_WIRE_LEN: usize = 4;

            fn lower(
                value: Self,
                alloc: &dyn $crate::core::buffer::BufferAllocator,
            ) -> ::std::result::Result<Self::FfiType, $crate::core::error::Error> {
                $crate::core::convert::lower_into_rust_buffer(&value, alloc)
            }

            fn try_lift(
                value: Self::FfiType,
                alloc: &dyn $crate::core::buffer::BufferAllocator,
            ) -> ::std::result::Result<Self, $crate::core::error::Error> {
                $crate::core::convert::try_lift_from_rust_buffer(value, alloc)
            }

            fn write(
                value: &Self,
                writer: &mut $crate::core::wire::WireWriter,
            ) -> ::std::result::Result<(), $crate::core::error::Error> {
                let index = match value {
                    $( $name::$variant => $name::$variant as i32, )+
                };
                writer.write_i32(index + 1);
                Ok(())
            }

            fn read(
                reader: &mut $crate::core::wire::WireReader<'_>,
            ) -> ::std::result::Result<Self, $crate::core::error::Error> {
                let index = reader.read_i32()?;
                $(
                    if index == $name::$variant as i32 + 1 {
                        return Ok($name::$variant);
                    }
                )+
                Err($crate::core::error::Error::new($crate::core::error::ErrorKind::Protocol)
                    .with_message(format!(
                        "invalid enum index {index} for {}",
                        stringify!($name)
                    )))
            }
        }
    };
}
