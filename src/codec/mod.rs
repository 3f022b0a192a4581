//! Binary codec for the stream wire format.
//!
//! Every value on the wire is written through [`Encode`] and read back through
//! [`Decode`] against a cursor in a [`ByteBuffer`]. This module is the only
//! place the layout is defined:
//!
//! - Primitives are fixed width in native byte order.
//! - `bool` is one byte, non-zero meaning `true`.
//! - Fixed arrays are their elements back to back, no prefix.
//! - `Vec<T>`, `String`, maps and sets carry a `u32` count prefix.
//! - Maps and sets are written in sorted order so encodings are stable.
//! - Records are their fields in declaration order (see [`wire_record!`]).
//!
//! Decoding never panics. A read that runs out of bytes returns `None`, which
//! callers treat as "no valid data in this block".
//!
//! ```rust
//! use mocap_stream::codec::ByteBuffer;
//!
//! let mut buffer = ByteBuffer::new();
//! buffer.write(&vec![1.5f64, 2.5]);
//! buffer.write("origin");
//!
//! buffer.set_offset(0);
//! assert_eq!(buffer.read::<Vec<f64>>(), Some(vec![1.5, 2.5]));
//! assert_eq!(buffer.read::<String>().as_deref(), Some("origin"));
//! assert_eq!(buffer.read::<u8>(), None);
//! ```

mod buffer;

pub use buffer::ByteBuffer;

use std::collections::{BTreeMap, BTreeSet};

/// A value that can be written to a [`ByteBuffer`].
pub trait Encode {
    fn encode(&self, buffer: &mut ByteBuffer);
}

/// A value that can be read back from a [`ByteBuffer`].
pub trait Decode: Sized {
    /// Returns `None` when the buffer runs out before the value is complete.
    fn decode(buffer: &mut ByteBuffer) -> Option<Self>;
}

macro_rules! primitive_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, buffer: &mut ByteBuffer) {
                    buffer.write_bytes(&self.to_ne_bytes());
                }
            }

            impl Decode for $ty {
                fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
                    let bytes = buffer.read_bytes(std::mem::size_of::<$ty>())?;
                    Some(<$ty>::from_ne_bytes(bytes.try_into().ok()?))
                }
            }
        )*
    };
}

primitive_codec!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Encode for bool {
    fn encode(&self, buffer: &mut ByteBuffer) {
        buffer.write(&u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        buffer.read::<u8>().map(|byte| byte != 0)
    }
}

fn write_count(buffer: &mut ByteBuffer, count: usize) {
    buffer.write(&(count as u32));
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, buffer: &mut ByteBuffer) {
        for item in self {
            item.encode(buffer);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        let items = (0..N).map(|_| T::decode(buffer)).collect::<Option<Vec<T>>>()?;
        items.try_into().ok()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, buffer: &mut ByteBuffer) {
        write_count(buffer, self.len());
        for item in self {
            item.encode(buffer);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buffer: &mut ByteBuffer) {
        self.as_slice().encode(buffer);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        let count = buffer.read::<u32>()? as usize;
        // A hostile count must not drive the allocation.
        let mut items = Vec::with_capacity(count.min(buffer.remaining()));
        for _ in 0..count {
            items.push(T::decode(buffer)?);
        }
        Some(items)
    }
}

impl Encode for str {
    fn encode(&self, buffer: &mut ByteBuffer) {
        write_count(buffer, self.len());
        buffer.write_bytes(self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, buffer: &mut ByteBuffer) {
        self.as_str().encode(buffer);
    }
}

impl Decode for String {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        let start = buffer.offset();
        let length = buffer.read::<u32>()? as usize;
        match buffer.read_bytes(length) {
            Some(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            None => {
                buffer.set_offset(start);
                None
            }
        }
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, buffer: &mut ByteBuffer) {
        write_count(buffer, self.len());
        for (key, value) in self {
            key.encode(buffer);
            value.encode(buffer);
        }
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        let count = buffer.read::<u32>()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::decode(buffer)?;
            let value = V::decode(buffer)?;
            map.insert(key, value);
        }
        Some(map)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, buffer: &mut ByteBuffer) {
        write_count(buffer, self.len());
        for item in self {
            item.encode(buffer);
        }
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        let count = buffer.read::<u32>()?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(T::decode(buffer)?);
        }
        Some(set)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode(&self, buffer: &mut ByteBuffer) {
        self.0.encode(buffer);
        self.1.encode(buffer);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        Some((A::decode(buffer)?, B::decode(buffer)?))
    }
}

/// Declare a plain data record whose wire form is its fields in order.
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $crate::codec::Encode for $name {
            #[allow(unused_variables)]
            fn encode(&self, buffer: &mut $crate::codec::ByteBuffer) {
                $( buffer.write(&self.$field); )*
            }
        }

        impl $crate::codec::Decode for $name {
            #[allow(unused_variables)]
            fn decode(buffer: &mut $crate::codec::ByteBuffer) -> Option<Self> {
                Some(Self { $( $field: buffer.read()?, )* })
            }
        }
    };
}

pub(crate) use wire_record;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip<T>(value: &T) -> (Option<T>, usize, usize)
    where
        T: Encode + Decode,
    {
        let mut buffer = ByteBuffer::new();
        buffer.write(value);
        let written = buffer.offset();
        buffer.set_offset(0);
        let decoded = buffer.read::<T>();
        (decoded, written, buffer.offset())
    }

    wire_record! {
        /// Record used to exercise the macro.
        pub struct Sample {
            pub id: u32,
            pub name: String,
            pub position: [f64; 3],
            pub flags: BTreeSet<u16>,
        }
    }

    proptest! {
        #[test]
        fn primitives_round_trip(
            a in any::<u8>(),
            b in any::<i16>(),
            c in any::<u32>(),
            d in any::<i64>(),
            e in any::<bool>(),
        ) {
            let value = ((a, b), ((c, d), e));
            let (decoded, written, read) = round_trip(&value);
            prop_assert_eq!(decoded, Some(value));
            prop_assert_eq!(written, read);
        }

        #[test]
        fn floats_round_trip_bit_exact(x in any::<f64>(), y in any::<f32>()) {
            let (decoded, _, _) = round_trip(&(x, y));
            let (dx, dy) = decoded.expect("float pair should decode");
            prop_assert_eq!(dx.to_bits(), x.to_bits());
            prop_assert_eq!(dy.to_bits(), y.to_bits());
        }

        #[test]
        fn containers_round_trip(
            values in prop::collection::vec(any::<u32>(), 0..64),
            labels in prop::collection::btree_map(".{0,12}", any::<i32>(), 0..16),
            ids in prop::collection::btree_set(any::<u16>(), 0..16),
            fixed in any::<[i16; 4]>(),
        ) {
            let value = ((values, labels), (ids, fixed));
            let (decoded, written, read) = round_trip(&value);
            prop_assert_eq!(decoded, Some(value));
            prop_assert_eq!(written, read);
        }

        #[test]
        fn truncated_input_never_decodes(
            values in prop::collection::vec(".{0,8}", 1..8),
            cut in 0usize..1000,
        ) {
            let mut buffer = ByteBuffer::new();
            buffer.write(&values);
            let full = buffer.len();
            let cut = cut % full;

            let mut truncated = ByteBuffer::from_bytes(buffer.as_bytes()[..cut].to_vec());
            prop_assert_eq!(truncated.read::<Vec<String>>(), None);
        }
    }

    #[test]
    fn record_round_trip() {
        let sample = Sample {
            id: 7,
            name: "LeftFoot".to_string(),
            position: [1.0, -2.0, 3.5],
            flags: [1u16, 4, 9].into_iter().collect(),
        };
        let (decoded, written, read) = round_trip(&sample);
        assert_eq!(decoded, Some(sample));
        assert_eq!(written, read);
    }

    #[test]
    fn string_length_beyond_buffer_is_rejected() {
        let mut buffer = ByteBuffer::new();
        buffer.write(&100u32);
        buffer.write_bytes(b"short");
        buffer.set_offset(0);
        assert_eq!(buffer.read::<String>(), None);
        assert_eq!(buffer.offset(), 0);
    }

    #[test]
    fn hostile_vector_count_fails_cleanly() {
        let mut buffer = ByteBuffer::new();
        buffer.write(&u32::MAX);
        buffer.write(&1u64);
        buffer.set_offset(0);
        assert_eq!(buffer.read::<Vec<u64>>(), None);
    }

    #[test]
    fn maps_encode_in_sorted_order() {
        let mut first = BTreeMap::new();
        first.insert(3u8, 30u8);
        first.insert(1u8, 10u8);
        let mut buffer = ByteBuffer::new();
        buffer.write(&first);
        assert_eq!(&buffer.as_bytes()[4..], &[1, 10, 3, 30]);
    }
}
