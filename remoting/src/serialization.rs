// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Serialization of remote method arguments and results
//!
//! Every argument and result type of a remotable method implements [BytesConvertable]. The
//! trait supplies a stable wire name for the type (used when deriving interface and method ids,
//! so it must never depend on the compiler) along with the conversions to and from bytes.
//!
//! Arguments are packed by [ArgumentWriter] as a sequence of `(u64 big-endian length, bytes)`
//! pairs and unpacked in the same order by [ArgumentReader].
//!
//! Implementations are provided for the primitive types, [String], [Vec] and [Option]. Any other
//! codec (prost, serde, ...) can be plugged in by implementing the trait for the user's types.

use std::borrow::Cow;

use crate::DecodeErr;

/// Trait for types which can be sent over the wire as an argument or result
/// of a remote method
pub trait BytesConvertable: Sized + Send + 'static {
    /// The stable, compiler-independent name of this type on the wire
    fn type_name() -> Cow<'static, str>;

    /// Serialize this value to bytes
    fn into_bytes(self) -> Vec<u8>;

    /// Deserialize a value from bytes
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeErr>;
}

impl BytesConvertable for () {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("()")
    }
    fn into_bytes(self) -> Vec<u8> {
        vec![]
    }
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeErr> {
        if bytes.is_empty() {
            Ok(())
        } else {
            Err(DecodeErr::TrailingBytes(bytes.len()))
        }
    }
}

impl BytesConvertable for bool {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("bool")
    }
    fn into_bytes(self) -> Vec<u8> {
        vec![u8::from(self)]
    }
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeErr> {
        match bytes.as_slice() {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(DecodeErr::invalid("bool", "expected a single 0 or 1 byte")),
        }
    }
}

macro_rules! implement_numeric {
    {$ty: ty, $name: literal} => {
        impl BytesConvertable for $ty {
            fn type_name() -> Cow<'static, str> {
                Cow::Borrowed($name)
            }
            fn into_bytes(self) -> Vec<u8> {
                self.to_be_bytes().to_vec()
            }
            fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeErr> {
                let data: [u8; std::mem::size_of::<$ty>()] = bytes.as_slice().try_into().map_err(|_| {
                    DecodeErr::invalid(
                        $name,
                        format!("expected {} bytes, found {}", std::mem::size_of::<$ty>(), bytes.len()),
                    )
                })?;
                Ok(<$ty>::from_be_bytes(data))
            }
        }
    };
}

implement_numeric! {i8, "i8"}
implement_numeric! {i16, "i16"}
implement_numeric! {i32, "i32"}
implement_numeric! {i64, "i64"}
implement_numeric! {i128, "i128"}
implement_numeric! {u8, "u8"}
implement_numeric! {u16, "u16"}
implement_numeric! {u32, "u32"}
implement_numeric! {u64, "u64"}
implement_numeric! {u128, "u128"}
implement_numeric! {f32, "f32"}
implement_numeric! {f64, "f64"}

impl BytesConvertable for String {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }
    fn into_bytes(self) -> Vec<u8> {
        self.into_bytes()
    }
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeErr> {
        String::from_utf8(bytes).map_err(|err| DecodeErr::invalid("string", err.to_string()))
    }
}

impl<T: BytesConvertable> BytesConvertable for Vec<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("list<{}>", T::type_name()))
    }
    fn into_bytes(self) -> Vec<u8> {
        let mut writer = ArgumentWriter::new();
        writer.push(self.len() as u64);
        for item in self {
            writer.push(item);
        }
        writer.into_bytes()
    }
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeErr> {
        let mut reader = ArgumentReader::new(bytes);
        let len = reader.next::<u64>()? as usize;
        // every element carries at least its 8 byte length prefix
        let mut items = Vec::with_capacity(len.min(reader.remaining() / 8));
        for _ in 0..len {
            items.push(reader.next::<T>()?);
        }
        reader.finish()?;
        Ok(items)
    }
}

impl<T: BytesConvertable> BytesConvertable for Option<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("option<{}>", T::type_name()))
    }
    fn into_bytes(self) -> Vec<u8> {
        match self {
            None => vec![0u8],
            Some(value) => {
                let mut data = vec![1u8];
                data.extend(value.into_bytes());
                data
            }
        }
    }
    fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, DecodeErr> {
        match bytes.first() {
            Some(0) if bytes.len() == 1 => Ok(None),
            Some(1) => {
                let value = bytes.split_off(1);
                Ok(Some(T::from_bytes(value)?))
            }
            _ => Err(DecodeErr::invalid(
                Self::type_name(),
                "missing or invalid presence tag",
            )),
        }
    }
}

/// Packs method arguments into a single buffer
#[derive(Debug, Default)]
pub struct ArgumentWriter {
    data: Vec<u8>,
}

impl ArgumentWriter {
    /// Create a new, empty argument buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next argument
    pub fn push<T: BytesConvertable>(&mut self, value: T) -> &mut Self {
        let arg_data = value.into_bytes();
        let arg_len = (arg_data.len() as u64).to_be_bytes();
        self.data.extend(arg_len);
        self.data.extend(arg_data);
        self
    }

    /// Consume the writer, retrieving the packed buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Unpacks method arguments from a buffer written by an [ArgumentWriter]
#[derive(Debug)]
pub struct ArgumentReader {
    data: Vec<u8>,
    ptr: usize,
}

impl ArgumentReader {
    /// Wrap a packed argument buffer
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, ptr: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.ptr
    }

    /// Read the next argument
    pub fn next<T: BytesConvertable>(&mut self) -> Result<T, DecodeErr> {
        let len_bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| DecodeErr::invalid("u64", "bad length prefix"))?;
        let len = usize::try_from(u64::from_be_bytes(len_bytes))
            .map_err(|_| DecodeErr::invalid(T::type_name(), "length prefix overflows usize"))?;
        let data = self.take(len)?.to_vec();
        T::from_bytes(data)
    }

    /// Assert that every argument was consumed
    pub fn finish(self) -> Result<(), DecodeErr> {
        match self.remaining() {
            0 => Ok(()),
            left => Err(DecodeErr::TrailingBytes(left)),
        }
    }

    fn take(&mut self, len: usize) -> Result<&[u8], DecodeErr> {
        let available = self.remaining();
        if len > available {
            return Err(DecodeErr::Truncated {
                needed: len,
                available,
            });
        }
        let start = self.ptr;
        self.ptr += len;
        Ok(&self.data[start..self.ptr])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_packing_preserves_order() {
        let mut writer = ArgumentWriter::new();
        writer
            .push(7i32)
            .push("hello".to_string())
            .push(vec![1u16, 2, 3])
            .push(Some(false))
            .push(Option::<u8>::None);

        let mut reader = ArgumentReader::new(writer.into_bytes());
        assert_eq!(7i32, reader.next::<i32>().unwrap());
        assert_eq!("hello", reader.next::<String>().unwrap());
        assert_eq!(vec![1u16, 2, 3], reader.next::<Vec<u16>>().unwrap());
        assert_eq!(Some(false), reader.next::<Option<bool>>().unwrap());
        assert_eq!(None, reader.next::<Option<u8>>().unwrap());
        reader.finish().expect("All arguments should be consumed");
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let mut writer = ArgumentWriter::new();
        writer.push(42u64);
        let mut bytes = writer.into_bytes();
        bytes.truncate(bytes.len() - 3);

        let mut reader = ArgumentReader::new(bytes);
        assert_eq!(
            Err(DecodeErr::Truncated {
                needed: 8,
                available: 5
            }),
            reader.next::<u64>()
        );
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut writer = ArgumentWriter::new();
        writer.push(1u8).push(2u8);
        let mut reader = ArgumentReader::new(writer.into_bytes());
        let _ = reader.next::<u8>().unwrap();
        assert_eq!(Err(DecodeErr::TrailingBytes(9)), reader.finish());
    }

    #[test]
    fn test_wrong_width_is_invalid() {
        let err = i32::from_bytes(vec![0, 1]).unwrap_err();
        assert!(matches!(err, DecodeErr::InvalidValue { .. }));
        assert!(String::from_bytes(vec![0xff, 0xfe]).is_err());
        assert!(bool::from_bytes(vec![2]).is_err());
    }

    #[test]
    fn test_wire_names_compose() {
        assert_eq!("list<option<string>>", Vec::<Option<String>>::type_name());
        assert_eq!("()", <() as BytesConvertable>::type_name());
    }
}
