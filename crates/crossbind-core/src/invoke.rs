//! The invocation engine.
//!
//! An [`Invoker`] wraps one (function pointer, signature) pair into a callable
//! that validates, converts, and dispatches arguments and return values.
//! Construction resolves every signature element through the type registry and
//! builds the `libffi` call interface for the target address; dispatch is the
//! single place where the foreign-call boundary is crossed.
//!
//! Two call paths exist: [`Invoker::call`] performs full return-value
//! classification and conversion, while [`Invoker::call_raw`] hands back the
//! untranslated return value, the path constructors and destructors use
//! since they only need an address (or nothing).

use std::ffi::c_void;

use libffi::middle::{Arg, Cif, CodePtr, Type};

use crate::error::{CallError, InteropError, SignatureError};
use crate::native_memory::NativeAddress;
use crate::native_type::NativeType;
use crate::registry::TypeRegistry;
use crate::signature::{SigElement, split_signature};
use crate::value::{NativeValue, RawValue, Value};

/// One callable bound to a native address and its parsed signature.
pub struct Invoker {
    name: String,
    /// Resolved elements, return first.
    elements: Vec<SigElement>,
    cif: Cif,
    code: CodePtr,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("name", &self.name)
            .field("elements", &self.elements)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Resolve a signature against the registry and build the calling thunk
    /// for `address`.
    pub fn new(
        registry: &TypeRegistry,
        name: impl Into<String>,
        address: NativeAddress,
        signature: &str,
    ) -> Result<Self, InteropError> {
        let name = name.into();
        let tags = split_signature(signature)?;
        let mut elements = Vec::with_capacity(tags.len());
        for (position, tag) in tags.iter().enumerate() {
            let element = registry.describe_element(tag)?;
            // `void` is a return sentinel, never an argument.
            if position > 0 && element.is_void() {
                return Err(SignatureError::InvalidVoid { tag: tag.clone() }.into());
            }
            elements.push(element);
        }

        let arg_types: Vec<Type> = elements[1..].iter().map(|e| e.native.ffi_type()).collect();
        let cif = Cif::new(arg_types, elements[0].native.ffi_type());
        Ok(Invoker {
            name,
            elements,
            cif,
            code: CodePtr::from_ptr(address.as_ptr()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared arguments.
    pub fn arity(&self) -> usize {
        self.elements.len() - 1
    }

    /// The resolved return element.
    pub fn return_element(&self) -> &SigElement {
        &self.elements[0]
    }

    /// Call and convert the return value into a host [`Value`].
    pub fn call(&self, registry: &TypeRegistry, args: &[Value]) -> Result<Value, InteropError> {
        let raw = self.call_raw(registry, args)?;
        let ret = &self.elements[0];

        if ret.is_void() {
            return Ok(Value::Void);
        }
        if ret.is_basic {
            // Dispatch produced storage of exactly the declared scalar.
            return raw
                .into_scalar_value()
                .ok_or_else(|| self.return_shape_error(ret));
        }
        let address = raw.as_address().ok_or_else(|| self.return_shape_error(ret))?;
        if ret.is_basic_ptr {
            let pointee = ret.pointee.ok_or_else(|| self.return_shape_error(ret))?;
            return Ok(Value::Ptr(crate::value::TypedPtr::new(address, pointee)));
        }
        // Extended pointer: hand the address to the type's converter.
        let entry = registry.lookup_by_tag(&ret.tag)?;
        let convert = entry.require_to_host()?;
        Ok((**convert)(address)?)
    }

    /// Call and yield the untranslated return value.
    pub fn call_raw(&self, registry: &TypeRegistry, args: &[Value]) -> Result<RawValue, InteropError> {
        let native_args = self.marshal_args(registry, args)?;
        Ok(unsafe { self.dispatch(&native_args) })
    }

    /// Call with pre-marshalled arguments, bypassing validation.
    ///
    /// Used by object teardown, where the only argument is the object's own
    /// pointer and no registry is in reach.
    pub(crate) fn call_prepared(&self, native_args: &[NativeValue]) -> RawValue {
        unsafe { self.dispatch(native_args) }
    }

    fn return_shape_error(&self, ret: &SigElement) -> InteropError {
        CallError::ConverterMismatch {
            tag: ret.tag.clone(),
        }
        .into()
    }

    /// Validate and convert positional arguments into native storage.
    fn marshal_args(
        &self,
        registry: &TypeRegistry,
        args: &[Value],
    ) -> Result<Vec<NativeValue>, InteropError> {
        if args.len() != self.arity() {
            return Err(CallError::ArityMismatch {
                name: self.name.clone(),
                expected: self.arity(),
                actual: args.len(),
            }
            .into());
        }

        let mut native_args = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let element = &self.elements[index + 1];

            // Raw typed pointers never pass as values.
            if matches!(arg, Value::Ptr(_)) {
                return Err(CallError::PointerArgument {
                    name: self.name.clone(),
                    index,
                }
                .into());
            }

            if arg.is_scalar() {
                // A scalar where a basic-type pointer is declared would be
                // reinterpreted as an address; reject before the boundary.
                if element.is_basic_ptr {
                    return Err(CallError::ScalarForBasicPointer {
                        name: self.name.clone(),
                        index,
                        declared: element.tag.clone(),
                    }
                    .into());
                }
                native_args.push(self.marshal_scalar(arg, element, index)?);
                continue;
            }

            // Structured value: resolve its mapping and require tag agreement.
            let entry = registry.lookup_by_value(arg)?;
            let actual_tag = match arg {
                Value::Array(array) => {
                    let elem_entry = registry.lookup_by_scalar(array.elem())?;
                    match &elem_entry.tag {
                        Some(tag) => format!("*{tag}"),
                        None => String::new(),
                    }
                }
                _ => entry.tag.clone().unwrap_or_default(),
            };
            if actual_tag != element.tag {
                return Err(CallError::TagMismatch {
                    name: self.name.clone(),
                    index,
                    declared: element.tag.clone(),
                    actual: if actual_tag.is_empty() {
                        arg.type_label().to_string()
                    } else {
                        actual_tag
                    },
                }
                .into());
            }
            let convert = entry.require_to_native()?;
            native_args.push((**convert)(arg)?);
        }
        Ok(native_args)
    }

    fn marshal_scalar(
        &self,
        arg: &Value,
        element: &SigElement,
        index: usize,
    ) -> Result<NativeValue, InteropError> {
        match element.native {
            NativeType::Scalar(declared) => {
                arg.to_native_scalar(declared)
                    .ok_or_else(|| {
                        CallError::ScalarCategory {
                            name: self.name.clone(),
                            index,
                            declared: element.tag.clone(),
                            actual: arg.type_label(),
                        }
                        .into()
                    })
            }
            // Integer passthrough into extended-pointer parameters: the
            // address form destructors and low-level callers hand in.
            NativeType::Ptr => match arg.as_i64() {
                Some(addr) => Ok(NativeValue::Ptr(addr as usize as *mut c_void)),
                None => Err(CallError::ScalarCategory {
                    name: self.name.clone(),
                    index,
                    declared: element.tag.clone(),
                    actual: arg.type_label(),
                }
                .into()),
            },
            NativeType::Void => Err(SignatureError::InvalidVoid {
                tag: element.tag.clone(),
            }
            .into()),
        }
    }

    /// Read an integral return value at full word width.
    ///
    /// # Safety
    ///
    /// Same contract as [`Invoker::dispatch`]; the call interface's return
    /// type must be integral and at most word-sized.
    unsafe fn word(&self, call_args: &[Arg]) -> usize {
        unsafe { self.cif.call::<usize>(self.code, call_args) }
    }

    /// Cross the boundary.
    ///
    /// # Safety
    ///
    /// The target address and signature must describe a real native function,
    /// which is the reflection table's contract; the marshalled arguments must
    /// match the call interface built at construction.
    unsafe fn dispatch(&self, native_args: &[NativeValue]) -> RawValue {
        // Pointer payloads need stable slots for libffi to point at; the
        // vector must not reallocate once the first Arg borrows into it.
        let mut ptr_slots: Vec<*mut c_void> = Vec::with_capacity(native_args.len());
        let mut call_args: Vec<Arg> = Vec::with_capacity(native_args.len());
        for native in native_args {
            let arg = match native {
                NativeValue::I8(v) => Arg::new(v),
                NativeValue::U8(v) => Arg::new(v),
                NativeValue::I16(v) => Arg::new(v),
                NativeValue::U16(v) => Arg::new(v),
                NativeValue::I32(v) => Arg::new(v),
                NativeValue::U32(v) => Arg::new(v),
                NativeValue::I64(v) => Arg::new(v),
                NativeValue::U64(v) => Arg::new(v),
                NativeValue::F32(v) => Arg::new(v),
                NativeValue::F64(v) => Arg::new(v),
                NativeValue::Ptr(p) => {
                    ptr_slots.push(*p);
                    Arg::new(&ptr_slots[ptr_slots.len() - 1])
                }
                NativeValue::CString(c) => {
                    ptr_slots.push(c.as_ptr() as *mut c_void);
                    Arg::new(&ptr_slots[ptr_slots.len() - 1])
                }
            };
            call_args.push(arg);
        }

        unsafe {
            match self.elements[0].native {
                NativeType::Void => {
                    self.cif.call::<()>(self.code, &call_args);
                    RawValue::Void
                }
                NativeType::Scalar(s) => {
                    use crate::native_type::NativeScalar::*;
                    // Sub-word integral returns come back promoted to a full
                    // word; read the word and truncate.
                    match s {
                        I8 => RawValue::I8(self.word(&call_args) as i8),
                        U8 => RawValue::U8(self.word(&call_args) as u8),
                        I16 => RawValue::I16(self.word(&call_args) as i16),
                        U16 => RawValue::U16(self.word(&call_args) as u16),
                        I32 => RawValue::I32(self.word(&call_args) as i32),
                        U32 => RawValue::U32(self.word(&call_args) as u32),
                        I64 => RawValue::I64(self.cif.call(self.code, &call_args)),
                        U64 => RawValue::U64(self.cif.call(self.code, &call_args)),
                        F32 => RawValue::F32(self.cif.call(self.code, &call_args)),
                        F64 => RawValue::F64(self.cif.call(self.code, &call_args)),
                    }
                }
                NativeType::Ptr => RawValue::Addr(self.cif.call::<*mut c_void>(self.code, &call_args)),
            }
        }
    }
}
