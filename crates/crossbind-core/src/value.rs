//! Host-side runtime values.
//!
//! [`Value`] is the dynamic value type that crosses the interop boundary:
//! one variant per basic scalar width, plus the extended forms: strings,
//! element-tagged arrays, bound objects, and raw typed pointers. The
//! invocation engine classifies a value at call time the way the signature
//! mini-language classifies tags: scalars are native-representable and pass
//! through, everything else resolves a type mapping and runs a converter.
//!
//! [`NativeValue`] is the marshalled form of one argument: native-representable
//! storage that stays alive for the duration of the native call.
//! [`RawValue`] is an untranslated native return value, handed back as-is to
//! internal callers (constructors and destructors) that do not want host
//! conversion.

use std::cell::RefCell;
use std::ffi::{CString, c_void};
use std::rc::Rc;

use crate::binding::ObjectRef;
use crate::native_memory::NativeAddress;
use crate::native_type::NativeScalar;

// ============================================================================
// Value
// ============================================================================

/// A dynamically typed host value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absence of a value; produced by `void` returns only.
    Void,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// A host string, marshalled to/from a null-terminated native string.
    Str(String),
    /// A shared, element-tagged byte buffer passed to native code by pointer.
    Array(HostArray),
    /// A non-owning reference to a bound native object.
    Object(ObjectRef),
    /// A raw typed pointer over a basic scalar. Never dereferenced implicitly.
    Ptr(TypedPtr),
}

impl Value {
    /// Whether this value is a native-representable scalar.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::I8(_)
                | Value::U8(_)
                | Value::I16(_)
                | Value::U16(_)
                | Value::I32(_)
                | Value::U32(_)
                | Value::I64(_)
                | Value::U64(_)
                | Value::F32(_)
                | Value::F64(_)
        )
    }

    /// A short label for error messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Ptr(_) => "pointer",
        }
    }

    /// The value as a signed 64-bit integer, if it is any integer scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::U8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U64(v) => Some(v as i64),
            _ => None,
        }
    }

    /// The value as a 64-bit float, if it is any float scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_typed_ptr(&self) -> Option<TypedPtr> {
        match self {
            Value::Ptr(p) => Some(*p),
            _ => None,
        }
    }

    /// Convert a scalar value into the declared native storage.
    ///
    /// Integer values convert freely between integer widths and widen to
    /// floats; float values convert only between float widths. Returns `None`
    /// for non-scalars and for float-to-integer conversions, which the
    /// original boundary never accepted.
    pub fn to_native_scalar(&self, declared: NativeScalar) -> Option<NativeValue> {
        if let Some(int) = self.as_i64() {
            let converted = match declared {
                NativeScalar::I8 => NativeValue::I8(int as i8),
                NativeScalar::U8 => NativeValue::U8(int as u8),
                NativeScalar::I16 => NativeValue::I16(int as i16),
                NativeScalar::U16 => NativeValue::U16(int as u16),
                NativeScalar::I32 => NativeValue::I32(int as i32),
                NativeScalar::U32 => NativeValue::U32(int as u32),
                NativeScalar::I64 => NativeValue::I64(int),
                NativeScalar::U64 => NativeValue::U64(int as u64),
                NativeScalar::F32 => NativeValue::F32(int as f32),
                NativeScalar::F64 => NativeValue::F64(int as f64),
            };
            return Some(converted);
        }
        if let Some(float) = self.as_f64() {
            return match declared {
                NativeScalar::F32 => Some(NativeValue::F32(float as f32)),
                NativeScalar::F64 => Some(NativeValue::F64(float)),
                _ => None,
            };
        }
        None
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        }
    )*};
}

value_from! {
    i8 => I8, u8 => U8, i16 => I16, u16 => U16,
    i32 => I32, u32 => U32, i64 => I64, u64 => U64,
    f32 => F32, f64 => F64, String => Str, HostArray => Array,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

// ============================================================================
// HostArray
// ============================================================================

/// Marker trait for scalars that can populate a [`HostArray`].
pub trait ArrayElement: Copy + 'static {
    /// The native scalar this element marshals as.
    const SCALAR: NativeScalar;
}

macro_rules! array_element {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl ArrayElement for $t {
            const SCALAR: NativeScalar = NativeScalar::$variant;
        }
    )*};
}

array_element! {
    i8 => I8, u8 => U8, i16 => I16, u16 => U16,
    i32 => I32, u32 => U32, i64 => I64, u64 => U64,
    f32 => F32, f64 => F64,
}

/// A contiguous, element-tagged buffer shared between host and native code.
///
/// The buffer is passed across the boundary by pointer, so native code mutates
/// it in place; clones share the same storage and observe those writes. The
/// engine is single-threaded by design, hence the `Rc`/`RefCell` interior.
#[derive(Debug, Clone)]
pub struct HostArray {
    elem: NativeScalar,
    data: Rc<RefCell<Vec<u8>>>,
}

impl HostArray {
    /// Build an array by copying a host slice.
    pub fn from_slice<T: ArrayElement>(items: &[T]) -> Self {
        let byte_len = std::mem::size_of_val(items);
        let mut data = vec![0u8; byte_len];
        // Scalars have no padding, so a byte copy is exact.
        unsafe {
            std::ptr::copy_nonoverlapping(items.as_ptr() as *const u8, data.as_mut_ptr(), byte_len);
        }
        HostArray {
            elem: T::SCALAR,
            data: Rc::new(RefCell::new(data)),
        }
    }

    /// The scalar type of the elements.
    pub fn elem(&self) -> NativeScalar {
        self.elem
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.data.borrow().len() / self.elem.size_in_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }

    /// Copy the buffer back out as typed elements.
    ///
    /// Panics if `T` does not match the array's element scalar; that is a
    /// host-side programming error, not a boundary condition.
    pub fn to_vec<T: ArrayElement>(&self) -> Vec<T> {
        assert_eq!(
            T::SCALAR,
            self.elem,
            "requested {} elements from a {} array",
            T::SCALAR,
            self.elem
        );
        let bytes = self.data.borrow();
        let count = bytes.len() / std::mem::size_of::<T>();
        let mut out: Vec<T> = Vec::with_capacity(count);
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                out.as_mut_ptr() as *mut u8,
                count * std::mem::size_of::<T>(),
            );
            out.set_len(count);
        }
        out
    }

    /// The buffer's base address, for marshalling.
    ///
    /// Valid as long as the array (or any clone) is alive and not resized.
    pub(crate) fn base_ptr(&self) -> *mut c_void {
        self.data.borrow_mut().as_mut_ptr() as *mut c_void
    }
}

// ============================================================================
// TypedPtr
// ============================================================================

/// A non-owning typed pointer over a basic scalar.
///
/// Produced by pointer-to-basic return values and field reads. Wrapping never
/// dereferences and never takes ownership; reading is explicit and unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedPtr {
    addr: NativeAddress,
    pointee: NativeScalar,
}

impl TypedPtr {
    pub fn new(addr: NativeAddress, pointee: NativeScalar) -> Self {
        TypedPtr { addr, pointee }
    }

    pub fn addr(&self) -> NativeAddress {
        self.addr
    }

    pub fn pointee(&self) -> NativeScalar {
        self.pointee
    }

    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }

    /// Read the pointed-at scalar.
    ///
    /// # Safety
    ///
    /// The pointer must reference live, properly aligned native storage of
    /// the pointee type.
    pub unsafe fn read(&self) -> Value {
        unsafe {
            match self.pointee {
                NativeScalar::I8 => Value::I8(self.addr.read_as()),
                NativeScalar::U8 => Value::U8(self.addr.read_as()),
                NativeScalar::I16 => Value::I16(self.addr.read_as()),
                NativeScalar::U16 => Value::U16(self.addr.read_as()),
                NativeScalar::I32 => Value::I32(self.addr.read_as()),
                NativeScalar::U32 => Value::U32(self.addr.read_as()),
                NativeScalar::I64 => Value::I64(self.addr.read_as()),
                NativeScalar::U64 => Value::U64(self.addr.read_as()),
                NativeScalar::F32 => Value::F32(self.addr.read_as()),
                NativeScalar::F64 => Value::F64(self.addr.read_as()),
            }
        }
    }
}

// ============================================================================
// NativeValue / RawValue
// ============================================================================

/// The marshalled, native-representable form of one argument.
///
/// Owns whatever storage must stay alive for the duration of the native call
/// (e.g. the `CString` behind a string argument).
#[derive(Debug)]
pub enum NativeValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// An address passed by value.
    Ptr(*mut c_void),
    /// An owned native string; the pointer passed is `as_ptr()`.
    CString(CString),
}

/// An untranslated native return value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Void,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Addr(*mut c_void),
}

impl RawValue {
    /// The raw value as an address, if the callable returned a pointer.
    pub fn as_address(&self) -> Option<NativeAddress> {
        match self {
            RawValue::Addr(p) => Some(NativeAddress::from_mut(*p)),
            _ => None,
        }
    }

    /// Translate a scalar raw value into a host value. Pointers are not
    /// scalars and classify through the registry instead.
    pub(crate) fn into_scalar_value(self) -> Option<Value> {
        match self {
            RawValue::I8(v) => Some(Value::I8(v)),
            RawValue::U8(v) => Some(Value::U8(v)),
            RawValue::I16(v) => Some(Value::I16(v)),
            RawValue::U16(v) => Some(Value::U16(v)),
            RawValue::I32(v) => Some(Value::I32(v)),
            RawValue::U32(v) => Some(Value::U32(v)),
            RawValue::I64(v) => Some(Value::I64(v)),
            RawValue::U64(v) => Some(Value::U64(v)),
            RawValue::F32(v) => Some(Value::F32(v)),
            RawValue::F64(v) => Some(Value::F64(v)),
            RawValue::Void | RawValue::Addr(_) => None,
        }
    }
}
