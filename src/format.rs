//! On-disk layout of a TLV container and its 1-byte header codec.
//!
//! A container is `[header:1][global count:8, signed, native-endian]` followed
//! by `count * element_size(tag)` tightly packed body bytes. The header packs
//! the element type tag into bits 7..4 and a caller-assigned label into bits
//! 3..0. Decoding yields an immutable [`FormatDescriptor`] that is threaded
//! explicitly into every positional I/O call; there is no mutable
//! "current stored type" anywhere in this crate.

use crate::tlv_error::TlvError;
use bytemuck::Pod;
use static_assertions::const_assert_eq;

/// Size of the header byte at offset 0.
pub const HEADER_BYTES: u64 = 1;
/// Size of the signed 64-bit global element count at offset 1.
pub const COUNT_BYTES: u64 = 8;
/// Offset of the first body byte.
pub const BODY_OFFSET: u64 = HEADER_BYTES + COUNT_BYTES;

/// Element type recorded in the high nibble of the header.
///
/// Only three of the four nibble bits are meaningful; raw values 6 and 7 are
/// a reserved region and rejected on decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// Unsigned 32-bit integer, 4 bytes.
    UInt32 = 0,
    /// Signed 32-bit integer, 4 bytes.
    Int32 = 1,
    /// IEEE-754 single precision, 4 bytes.
    Float32 = 2,
    /// IEEE-754 double precision, 8 bytes.
    Float64 = 3,
    /// Raw byte, 1 byte.
    Byte = 4,
    /// Platform word (`usize`), one machine word on disk.
    SizeWord = 5,
}

impl TypeTag {
    /// Decode a raw tag value, rejecting the reserved region.
    pub fn from_raw(raw: u8) -> Result<Self, TlvError> {
        match raw {
            0 => Ok(TypeTag::UInt32),
            1 => Ok(TypeTag::Int32),
            2 => Ok(TypeTag::Float32),
            3 => Ok(TypeTag::Float64),
            4 => Ok(TypeTag::Byte),
            5 => Ok(TypeTag::SizeWord),
            other => Err(TlvError::InvalidTypeTag(other)),
        }
    }

    /// On-disk byte width of one element of this type.
    pub fn element_size(self) -> u64 {
        match self {
            TypeTag::UInt32 | TypeTag::Int32 | TypeTag::Float32 => 4,
            TypeTag::Float64 => 8,
            TypeTag::Byte => 1,
            TypeTag::SizeWord => core::mem::size_of::<usize>() as u64,
        }
    }
}

// Pin the fixed-width entries of the size table to the scalar types that
// claim them.
const_assert_eq!(core::mem::size_of::<u32>(), 4);
const_assert_eq!(core::mem::size_of::<i32>(), 4);
const_assert_eq!(core::mem::size_of::<f32>(), 4);
const_assert_eq!(core::mem::size_of::<f64>(), 8);
const_assert_eq!(core::mem::size_of::<u8>(), 1);

/// Immutable decode of one header byte: element type plus caller label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Element type governing byte width for all positional I/O on the file.
    pub tag: TypeTag,
    /// Caller-assigned 4-bit payload tag; never dispatched on.
    pub label: u8,
}

impl FormatDescriptor {
    /// Build a descriptor, validating the label fits its 4-bit field.
    pub fn new(tag: TypeTag, label: u8) -> Result<Self, TlvError> {
        if label > 0x0F {
            return Err(TlvError::InvalidLabel(label));
        }
        Ok(Self { tag, label })
    }

    /// Pack into the header byte: tag in bits 7..4, label in bits 3..0.
    pub fn encode(self) -> u8 {
        ((self.tag as u8 & 0b0111) << 4) | (self.label & 0b1111)
    }

    /// Exact inverse of [`encode`](Self::encode).
    pub fn decode(byte: u8) -> Result<Self, TlvError> {
        let tag = TypeTag::from_raw(byte >> 4)?;
        Ok(Self {
            tag,
            label: byte & 0b1111,
        })
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for u8 {}
    impl Sealed for usize {}
}

/// Scalar types storable in a container body.
///
/// Sealed: the set of impls is exactly the closed [`TypeTag`] enumeration, so
/// every I/O call can check the caller's element type against the tag
/// recorded on disk instead of trusting protocol discipline.
pub trait TlvScalar: Pod + sealed::Sealed {
    /// The tag this scalar is stored under.
    const TAG: TypeTag;
}

impl TlvScalar for u32 {
    const TAG: TypeTag = TypeTag::UInt32;
}
impl TlvScalar for i32 {
    const TAG: TypeTag = TypeTag::Int32;
}
impl TlvScalar for f32 {
    const TAG: TypeTag = TypeTag::Float32;
}
impl TlvScalar for f64 {
    const TAG: TypeTag = TypeTag::Float64;
}
impl TlvScalar for u8 {
    const TAG: TypeTag = TypeTag::Byte;
}
impl TlvScalar for usize {
    const TAG: TypeTag = TypeTag::SizeWord;
}
