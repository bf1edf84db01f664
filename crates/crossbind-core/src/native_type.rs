//! Native storage types.
//!
//! [`NativeScalar`] enumerates the fixed catalogue of basic numeric storage
//! types the signature mini-language can name. [`NativeType`] is the storage
//! category of one resolved signature element: a scalar, an address-sized
//! pointer, or the `void` return sentinel. Both know their byte size and their
//! `libffi` call-interface type, which is all the invocation engine needs to
//! build a calling thunk.

use libffi::middle::Type;

/// A basic numeric storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeScalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl NativeScalar {
    /// Every scalar, in registry declaration order.
    pub const ALL: [NativeScalar; 10] = [
        NativeScalar::I8,
        NativeScalar::U8,
        NativeScalar::I16,
        NativeScalar::U16,
        NativeScalar::I32,
        NativeScalar::U32,
        NativeScalar::I64,
        NativeScalar::U64,
        NativeScalar::F32,
        NativeScalar::F64,
    ];

    /// The signature tag naming this scalar.
    pub fn tag(&self) -> &'static str {
        match self {
            NativeScalar::I8 => "i8",
            NativeScalar::U8 => "u8",
            NativeScalar::I16 => "i16",
            NativeScalar::U16 => "u16",
            NativeScalar::I32 => "i32",
            NativeScalar::U32 => "u32",
            NativeScalar::I64 => "i64",
            NativeScalar::U64 => "u64",
            NativeScalar::F32 => "f32",
            NativeScalar::F64 => "f64",
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match self {
            NativeScalar::I8 | NativeScalar::U8 => 1,
            NativeScalar::I16 | NativeScalar::U16 => 2,
            NativeScalar::I32 | NativeScalar::U32 | NativeScalar::F32 => 4,
            NativeScalar::I64 | NativeScalar::U64 | NativeScalar::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, NativeScalar::F32 | NativeScalar::F64)
    }

    /// The `libffi` type describing this scalar in a call interface.
    pub fn ffi_type(&self) -> Type {
        match self {
            NativeScalar::I8 => Type::i8(),
            NativeScalar::U8 => Type::u8(),
            NativeScalar::I16 => Type::i16(),
            NativeScalar::U16 => Type::u16(),
            NativeScalar::I32 => Type::i32(),
            NativeScalar::U32 => Type::u32(),
            NativeScalar::I64 => Type::i64(),
            NativeScalar::U64 => Type::u64(),
            NativeScalar::F32 => Type::f32(),
            NativeScalar::F64 => Type::f64(),
        }
    }
}

impl std::fmt::Display for NativeScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// The storage category of one resolved signature element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// A basic scalar passed by value.
    Scalar(NativeScalar),
    /// An address-sized pointer (basic-type pointer, string, or object).
    Ptr,
    /// The return-only `void` sentinel.
    Void,
}

impl NativeType {
    /// Byte size of the storage, as used by the field size-consistency check.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            NativeType::Scalar(s) => s.size_in_bytes(),
            NativeType::Ptr => std::mem::size_of::<*const ()>(),
            NativeType::Void => 0,
        }
    }

    /// The `libffi` type describing this storage in a call interface.
    pub fn ffi_type(&self) -> Type {
        match self {
            NativeType::Scalar(s) => s.ffi_type(),
            NativeType::Ptr => Type::pointer(),
            NativeType::Void => Type::void(),
        }
    }
}
