//! crossbind: reflection-table driven interop with compiled native modules.
//!
//! A native module publishes a self-describing reflection table: entries for
//! free functions, per-class methods, per-class fields, and per-class
//! constructor/destructor pairs, each tagged with a compact textual type
//! signature. This crate consumes that table to synthesize callable proxies,
//! field accessors, and object bindings, with no generated glue code per
//! function.
//!
//! ```no_run
//! use crossbind::prelude::*;
//!
//! fn demo() -> Result<(), InteropError> {
//!     let mut engine = Engine::load("./native_module.so")?;
//!
//!     // Global functions become callable proxies.
//!     let mult = engine.function("mult")?;
//!     let product = mult.call(&engine, &[Value::I32(5), Value::I32(6)])?;
//!     assert_eq!(product.as_i64(), Some(30));
//!
//!     // Native classes bind to host declarations.
//!     let widget = engine.bind_class(ClassDecl::new("widget"))?;
//!     let obj = widget.construct(&engine, &[Value::F32(100.0), Value::I32(5)])?;
//!     obj.call(&engine, "double_speed", &[])?;
//!     let speed = obj.get(&engine, "speed")?;
//!     assert_eq!(speed.as_f64(), Some(200.0));
//!     Ok(())
//! }
//! ```

pub use crossbind_core::*;

/// The commonly used surface in one import.
pub mod prelude {
    pub use crossbind_core::binding::{BoundObject, ClassBinding, ClassDecl, ObjectRef};
    pub use crossbind_core::engine::{Engine, Function};
    pub use crossbind_core::error::{InteropError, InteropResult};
    pub use crossbind_core::native_memory::NativeAddress;
    pub use crossbind_core::native_type::{NativeScalar, NativeType};
    pub use crossbind_core::registry::TypeRegistry;
    pub use crossbind_core::table::{EntryKind, ReflectionTable};
    pub use crossbind_core::value::{HostArray, TypedPtr, Value};
}
