//! The interop engine.
//!
//! [`Engine`] ties the components together: it loads a native module's
//! reflection table, builds the type registry from it, and hands out function
//! proxies and class bindings. All registry mutation happens through the
//! engine during the initialization phase (construction plus one
//! [`Engine::bind_class`] call per host-declared class), after which the
//! engine is used read-only.

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::binding::{BoundObject, ClassBinding, ClassDecl, OwnershipLedger};
use crate::error::{CallError, InteropError, LookupError, RebindError};
use crate::invoke::Invoker;
use crate::registry::{HostKind, TypeRegistry};
use crate::table::{EntryKind, ReflectionTable};
use crate::value::{NativeValue, Value};

/// The top-level interop engine for one native module.
///
/// The engine keeps the module's library handle alive; bound objects call
/// back into that module when destroyed, so drop objects before the engine
/// that produced them.
pub struct Engine {
    table: ReflectionTable,
    registry: TypeRegistry,
    bindings: FxHashMap<String, Arc<ClassBinding>>,
    ledger: OwnershipLedger,
}

impl Engine {
    /// Load a native module from a dynamic library.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InteropError> {
        let table = ReflectionTable::load(path)?;
        Self::from_table(table)
    }

    /// Build an engine over an already-discovered reflection table.
    pub fn from_table(table: ReflectionTable) -> Result<Self, InteropError> {
        let registry = TypeRegistry::from_table(&table)?;
        Ok(Engine {
            table,
            registry,
            bindings: FxHashMap::default(),
            ledger: OwnershipLedger::new(),
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn table(&self) -> &ReflectionTable {
        &self.table
    }

    /// Build a callable proxy for a reflected global function.
    pub fn function(&self, name: &str) -> Result<Function, InteropError> {
        let entry = self
            .table
            .find_access_entry(EntryKind::GlobalFunction, name)?
            .ok_or_else(|| LookupError::AccessEntryNotFound {
                kind: EntryKind::GlobalFunction.label(),
                name: name.to_string(),
            })?;
        let invoker = Invoker::new(&self.registry, name, entry.address, &entry.signature)?;
        Ok(Function { invoker })
    }

    /// Bind a host class declaration to its native class.
    ///
    /// Builds the full binding record first, then, only on success, resolves
    /// the class's extended type to the host side and installs its converters.
    /// Each class binds exactly once.
    pub fn bind_class(&mut self, decl: ClassDecl) -> Result<Arc<ClassBinding>, InteropError> {
        let class_name = decl.class_name().to_string();
        if self.bindings.contains_key(&class_name) {
            return Err(RebindError::ClassAlreadyBound { name: class_name }.into());
        }

        let binding = Arc::new(ClassBinding::build(
            &self.registry,
            &self.table,
            &decl,
            self.ledger.clone(),
        )?);

        let tag = format!("*{class_name}");
        self.registry
            .resolve_extended_type(&tag, HostKind::Class(class_name.clone()))?;

        let arg_tag = tag.clone();
        self.registry.set_host_to_native(
            &tag,
            Rc::new(move |value| match value {
                Value::Object(obj) => Ok(NativeValue::Ptr(obj.ptr().as_mut_ptr())),
                _ => Err(CallError::ConverterMismatch {
                    tag: arg_tag.clone(),
                }),
            }),
        )?;
        let return_binding = Arc::clone(&binding);
        self.registry.set_native_to_host(
            &tag,
            Rc::new(move |addr| Ok(Value::Object(return_binding.wrap(addr)))),
        )?;

        debug!(class = %class_name, "bound host class");
        self.bindings.insert(class_name, Arc::clone(&binding));
        Ok(binding)
    }

    /// A previously bound class, by name.
    pub fn class_binding(&self, name: &str) -> Option<&Arc<ClassBinding>> {
        self.bindings.get(name)
    }

    /// Bind and construct in one step.
    pub fn construct(
        &mut self,
        decl: ClassDecl,
        args: &[Value],
    ) -> Result<BoundObject, InteropError> {
        let binding = self.bind_class(decl)?;
        binding.construct(self, args)
    }

    /// Invoke the module's diagnostic entry dump.
    pub fn dump_entries(&self) {
        self.table.dump_entries();
    }
}

/// A callable proxy for one reflected global function.
#[derive(Debug)]
pub struct Function {
    invoker: Invoker,
}

impl Function {
    pub fn name(&self) -> &str {
        self.invoker.name()
    }

    pub fn arity(&self) -> usize {
        self.invoker.arity()
    }

    /// Call with full argument validation and return-value conversion.
    pub fn call(&self, engine: &Engine, args: &[Value]) -> Result<Value, InteropError> {
        self.invoker.call(engine.registry(), args)
    }
}
