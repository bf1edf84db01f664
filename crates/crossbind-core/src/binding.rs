//! The object-binding system.
//!
//! For each host-declared class naming an existing class entry, the engine
//! builds a [`ClassBinding`]: constructor and destructor invokers, one method
//! invoker per reflected class method, and one [`FieldAccessor`] per reflected
//! field. Binding happens exactly once per class, during the initialization
//! phase; every name-resolution choice (primary vs. reserved alternate name)
//! is made at bind time and recorded in the binding's tables, never re-derived
//! at access time.
//!
//! Objects come in two forms. [`ObjectRef`] is the non-owning wrapper that
//! crosses the boundary: a native pointer paired with its binding, cheap to
//! clone, never destroying anything. [`BoundObject`] is produced by
//! constructor proxies and owns its pointer: destruction invokes the native
//! destructor exactly once and clears the pointer. A process-wide ownership
//! ledger rejects a second owner for a live native pointer instead of
//! tolerating a future double free.

use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::engine::Engine;
use crate::error::{CallError, InteropError, LookupError, OwnershipError, RebindError};
use crate::invoke::Invoker;
use crate::native_memory::NativeAddress;
use crate::native_type::NativeType;
use crate::registry::TypeRegistry;
use crate::signature::SigElement;
use crate::table::{EntryKind, ReflectionTable};
use crate::value::{NativeValue, TypedPtr, Value};

/// Prefix under which a generated member is exposed when the host declaration
/// already claims its primary name.
pub const ALTERNATE_PREFIX: &str = "raw_";

// ============================================================================
// ClassDecl
// ============================================================================

/// A host class declaration: the class name plus the set of member names the
/// host side defines itself.
///
/// The member set drives two-tier name resolution: a reflected member whose
/// name the host already claims is bound under [`ALTERNATE_PREFIX`] instead,
/// so the host-declared member can delegate to it explicitly.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    class_name: String,
    host_members: FxHashSet<String>,
}

impl ClassDecl {
    pub fn new(class_name: impl Into<String>) -> Self {
        ClassDecl {
            class_name: class_name.into(),
            host_members: FxHashSet::default(),
        }
    }

    /// Record a member name the host declaration defines itself.
    pub fn with_host_member(mut self, name: impl Into<String>) -> Self {
        self.host_members.insert(name.into());
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn has_host_member(&self, name: &str) -> bool {
        self.host_members.contains(name)
    }

    /// The name a reflected member is exposed under, decided once at bind time.
    fn exposed_name(&self, member: &str) -> String {
        if self.has_host_member(member) {
            format!("{ALTERNATE_PREFIX}{member}")
        } else {
            member.to_string()
        }
    }
}

// ============================================================================
// Ownership ledger
// ============================================================================

/// Process-wide set of natively owned addresses.
///
/// Backs the fail-fast duplicate-owner check. The mutex exists because `Drop`
/// may in principle run on any thread; it is not a license to share objects
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct OwnershipLedger(Arc<Mutex<FxHashSet<usize>>>);

impl OwnershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an address; `false` if it already has an owner.
    fn try_claim(&self, address: usize) -> bool {
        let mut owned = self.0.lock().unwrap_or_else(|e| e.into_inner());
        owned.insert(address)
    }

    fn release(&self, address: usize) {
        let mut owned = self.0.lock().unwrap_or_else(|e| e.into_inner());
        owned.remove(&address);
    }

    /// Whether an address currently has an owner.
    pub fn is_owned(&self, address: usize) -> bool {
        let owned = self.0.lock().unwrap_or_else(|e| e.into_inner());
        owned.contains(&address)
    }
}

// ============================================================================
// FieldAccessor
// ============================================================================

/// Accessor for one reflected field: byte offset plus element descriptor.
///
/// Reading computes `base + offset` and reinterprets that address as the
/// field's native storage. Writing is permitted only for basic non-pointer
/// fields; fields that reference other objects are read-only through this
/// accessor.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    qualified_name: String,
    offset: usize,
    element: SigElement,
}

impl FieldAccessor {
    pub fn element(&self) -> &SigElement {
        &self.element
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn read(&self, base: NativeAddress, registry: &TypeRegistry) -> Result<Value, InteropError> {
        let addr = base.byte_add(self.offset);
        match self.element.native {
            NativeType::Scalar(scalar) => Ok(unsafe { TypedPtr::new(addr, scalar).read() }),
            NativeType::Void => Err(crate::error::SignatureError::InvalidVoid {
                tag: self.element.tag.clone(),
            }
            .into()),
            NativeType::Ptr => {
                // Pointer-typed field: load the stored address first.
                let stored =
                    NativeAddress::from_mut(unsafe { addr.read_as::<*mut std::ffi::c_void>() });
                if let Some(pointee) = self.element.pointee {
                    return Ok(Value::Ptr(TypedPtr::new(stored, pointee)));
                }
                let entry = registry.lookup_by_tag(&self.element.tag)?;
                let convert = entry.require_to_host()?;
                Ok((**convert)(stored)?)
            }
        }
    }

    fn write(&self, base: NativeAddress, value: &Value) -> Result<(), InteropError> {
        let NativeType::Scalar(scalar) = self.element.native else {
            let (class, field) = self
                .qualified_name
                .split_once('.')
                .unwrap_or(("", &self.qualified_name));
            return Err(OwnershipError::PointerFieldWrite {
                class: class.to_string(),
                field: field.to_string(),
            }
            .into());
        };
        let native = value.to_native_scalar(scalar).ok_or(CallError::FieldStore {
            field: self.qualified_name.clone(),
            declared: self.element.tag.clone(),
            actual: value.type_label(),
        })?;
        let addr = base.byte_add(self.offset);
        unsafe {
            match native {
                NativeValue::I8(v) => addr.write_as(v),
                NativeValue::U8(v) => addr.write_as(v),
                NativeValue::I16(v) => addr.write_as(v),
                NativeValue::U16(v) => addr.write_as(v),
                NativeValue::I32(v) => addr.write_as(v),
                NativeValue::U32(v) => addr.write_as(v),
                NativeValue::I64(v) => addr.write_as(v),
                NativeValue::U64(v) => addr.write_as(v),
                NativeValue::F32(v) => addr.write_as(v),
                NativeValue::F64(v) => addr.write_as(v),
                NativeValue::Ptr(_) | NativeValue::CString(_) => {
                    return Err(CallError::FieldStore {
                        field: self.qualified_name.clone(),
                        declared: self.element.tag.clone(),
                        actual: value.type_label(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// ClassBinding
// ============================================================================

/// Everything generated for one bound class.
#[derive(Debug)]
pub struct ClassBinding {
    class_name: String,
    constructor: Invoker,
    destructor: Invoker,
    methods: FxHashMap<String, Invoker>,
    fields: FxHashMap<String, FieldAccessor>,
    ledger: OwnershipLedger,
}

impl ClassBinding {
    /// Build the binding record for a declaration from the reflection tables.
    ///
    /// Fails without touching the registry: a missing class entry, a bad
    /// member signature, or a field whose reflected size disagrees with its
    /// tag all abort the whole class binding at definition time.
    pub(crate) fn build(
        registry: &TypeRegistry,
        table: &ReflectionTable,
        decl: &ClassDecl,
        ledger: OwnershipLedger,
    ) -> Result<Self, InteropError> {
        let class_name = decl.class_name().to_string();
        let entry = table
            .find_class_entry(&class_name)?
            .ok_or_else(|| LookupError::ClassEntryNotFound {
                name: class_name.clone(),
            })?;

        let constructor = Invoker::new(
            registry,
            format!("{class_name}_constructor"),
            entry.constructor,
            &entry.constructor_sig,
        )?;
        let destructor = Invoker::new(
            registry,
            format!("{class_name}_destructor"),
            entry.destructor,
            &entry.destructor_sig,
        )?;

        let mut methods = FxHashMap::default();
        let mut fields = FxHashMap::default();
        let member_prefix = format!("{class_name}.");
        for access in table.access_entries()? {
            if !access.name.starts_with(&member_prefix) {
                continue;
            }
            match access.kind {
                EntryKind::ClassMethod => {
                    let exposed = decl.exposed_name(access.unqualified_name());
                    let invoker =
                        Invoker::new(registry, access.name.clone(), access.address, &access.signature)?;
                    methods.insert(exposed, invoker);
                }
                EntryKind::ClassField => {
                    let element = registry.describe_element(&access.signature)?;
                    let implied = element.native.size_in_bytes();
                    if implied != access.field_size {
                        return Err(RebindError::FieldSizeMismatch {
                            class: class_name.clone(),
                            field: access.unqualified_name().to_string(),
                            reflected: access.field_size,
                            implied,
                        }
                        .into());
                    }
                    let exposed = decl.exposed_name(access.unqualified_name());
                    fields.insert(
                        exposed,
                        FieldAccessor {
                            qualified_name: access.name.clone(),
                            offset: access.field_offset,
                            element,
                        },
                    );
                }
                EntryKind::GlobalFunction => {}
            }
        }

        debug!(
            class = %class_name,
            methods = methods.len(),
            fields = fields.len(),
            "built class binding"
        );
        Ok(ClassBinding {
            class_name,
            constructor,
            destructor,
            methods,
            fields,
            ledger,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Exposed method names, including alternates chosen at bind time.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Exposed field names, including alternates chosen at bind time.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Invoke the constructor proxy and take ownership of the result.
    pub fn construct(
        self: &Arc<Self>,
        engine: &Engine,
        args: &[Value],
    ) -> Result<BoundObject, InteropError> {
        let raw = self.constructor.call_raw(engine.registry(), args)?;
        let addr = match raw.as_address() {
            Some(addr) if !addr.is_null() => addr,
            _ => {
                return Err(OwnershipError::NullConstruction {
                    class: self.class_name.clone(),
                }
                .into());
            }
        };
        if !self.ledger.try_claim(addr.as_usize()) {
            return Err(OwnershipError::DuplicateOwner {
                address: addr.as_usize(),
            }
            .into());
        }
        Ok(BoundObject {
            handle: ObjectRef {
                ptr: addr,
                binding: Arc::clone(self),
            },
            owning: true,
        })
    }

    /// Wrap an address in a non-owning reference to this class.
    pub fn wrap(self: &Arc<Self>, addr: NativeAddress) -> ObjectRef {
        ObjectRef {
            ptr: addr,
            binding: Arc::clone(self),
        }
    }

    fn method(&self, name: &str) -> Result<&Invoker, LookupError> {
        self.methods.get(name).ok_or_else(|| LookupError::MethodNotFound {
            class: self.class_name.clone(),
            name: name.to_string(),
        })
    }

    fn field(&self, name: &str) -> Result<&FieldAccessor, LookupError> {
        self.fields.get(name).ok_or_else(|| LookupError::FieldNotFound {
            class: self.class_name.clone(),
            name: name.to_string(),
        })
    }

    fn destroy_at(&self, addr: NativeAddress) {
        self.destructor
            .call_prepared(&[NativeValue::Ptr(addr.as_mut_ptr())]);
        self.ledger.release(addr.as_usize());
    }
}

// ============================================================================
// ObjectRef / BoundObject
// ============================================================================

/// A non-owning reference to a native object: pointer plus binding.
///
/// This is the form that crosses the boundary as method receivers, object
/// arguments, converted return values and field reads. Dropping it never
/// touches the native object.
#[derive(Clone)]
pub struct ObjectRef {
    ptr: NativeAddress,
    binding: Arc<ClassBinding>,
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRef")
            .field("class", &self.binding.class_name)
            .field("ptr", &self.ptr)
            .finish()
    }
}

impl ObjectRef {
    pub fn class_name(&self) -> &str {
        self.binding.class_name()
    }

    pub fn ptr(&self) -> NativeAddress {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn binding(&self) -> &Arc<ClassBinding> {
        &self.binding
    }

    fn ensure_live(&self) -> Result<(), OwnershipError> {
        if self.ptr.is_null() {
            return Err(OwnershipError::NullObject {
                class: self.binding.class_name.clone(),
            });
        }
        Ok(())
    }

    /// Call a bound method; the object itself is passed as the receiver.
    pub fn call(&self, engine: &Engine, method: &str, args: &[Value]) -> Result<Value, InteropError> {
        self.ensure_live()?;
        let invoker = self.binding.method(method)?;
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(Value::Object(self.clone()));
        full_args.extend_from_slice(args);
        invoker.call(engine.registry(), &full_args)
    }

    /// Read a bound field.
    pub fn get(&self, engine: &Engine, field: &str) -> Result<Value, InteropError> {
        self.ensure_live()?;
        self.binding.field(field)?.read(self.ptr, engine.registry())
    }

    /// Write a basic (non-pointer) bound field.
    pub fn set(&self, _engine: &Engine, field: &str, value: &Value) -> Result<(), InteropError> {
        self.ensure_live()?;
        self.binding.field(field)?.write(self.ptr, value)
    }
}

/// An owning host-side wrapper around a native object.
///
/// Produced by constructor proxies. Destruction invokes the native destructor
/// exactly once (explicitly through [`BoundObject::destroy`], or as a safety
/// net on drop) and clears the pointer so it cannot run twice.
#[derive(Debug)]
pub struct BoundObject {
    handle: ObjectRef,
    owning: bool,
}

impl BoundObject {
    pub fn class_name(&self) -> &str {
        self.handle.class_name()
    }

    pub fn ptr(&self) -> NativeAddress {
        self.handle.ptr
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    /// A non-owning reference to this object, for passing across the boundary.
    pub fn handle(&self) -> ObjectRef {
        self.handle.clone()
    }

    /// This object as an argument value.
    pub fn as_value(&self) -> Value {
        Value::Object(self.handle.clone())
    }

    pub fn call(&self, engine: &Engine, method: &str, args: &[Value]) -> Result<Value, InteropError> {
        self.handle.call(engine, method, args)
    }

    pub fn get(&self, engine: &Engine, field: &str) -> Result<Value, InteropError> {
        self.handle.get(engine, field)
    }

    pub fn set(&self, engine: &Engine, field: &str, value: &Value) -> Result<(), InteropError> {
        self.handle.set(engine, field, value)
    }

    /// Destroy the native object now.
    ///
    /// Fails if the object was already destroyed. After this call the wrapper
    /// holds a null pointer and drop does nothing further.
    pub fn destroy(&mut self) -> Result<(), InteropError> {
        if self.handle.ptr.is_null() {
            return Err(OwnershipError::NullObject {
                class: self.handle.binding.class_name.clone(),
            }
            .into());
        }
        self.teardown();
        Ok(())
    }

    /// Give up ownership without destroying the native object.
    ///
    /// The returned reference behaves like any other non-owning wrapper; the
    /// native side (or another owner) becomes responsible for the object.
    pub fn release(mut self) -> ObjectRef {
        self.owning = false;
        self.handle.binding.ledger.release(self.handle.ptr.as_usize());
        self.handle.clone()
    }

    fn teardown(&mut self) {
        let addr = self.handle.ptr;
        self.handle.binding.destroy_at(addr);
        self.handle.ptr = NativeAddress::null();
    }
}

impl Drop for BoundObject {
    fn drop(&mut self) {
        if self.owning && !self.handle.ptr.is_null() {
            self.teardown();
        }
    }
}
