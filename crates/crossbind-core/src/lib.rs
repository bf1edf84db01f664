//! Core interop engine.
//!
//! Lets a host runtime call into, and be called back with data from,
//! compiled native code exposed only as raw function pointers and memory
//! offsets. The native module publishes a self-describing reflection table;
//! this crate consumes it to synthesize callable proxies, field accessors,
//! and object bindings without per-function glue code.
//!
//! The pieces, leaf first:
//!
//! - [`signature`]: the textual signature mini-language.
//! - [`registry`]: the catalogue mapping native type tags to host
//!   representations and converters.
//! - [`table`]: the reflection-table discovery protocol.
//! - [`invoke`]: the invocation engine crossing the foreign-call boundary.
//! - [`binding`]: per-class bindings, field accessors, and object lifetime.
//! - [`engine`]: the facade tying one native module's pieces together.

pub mod binding;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod native_memory;
pub mod native_type;
pub mod registry;
pub mod signature;
pub mod table;
pub mod value;

pub use binding::{ALTERNATE_PREFIX, BoundObject, ClassBinding, ClassDecl, ObjectRef, OwnershipLedger};
pub use engine::{Engine, Function};
pub use error::{
    CallError, InteropError, InteropResult, LookupError, OwnershipError, RebindError,
    SignatureError, TableError,
};
pub use invoke::Invoker;
pub use native_memory::NativeAddress;
pub use native_type::{NativeScalar, NativeType};
pub use registry::{HostKind, MappingKind, TypeRegistry};
pub use signature::{SigElement, split_signature};
pub use table::{
    AccessEntry, ClassEntry, EntryKind, RawAccessEntry, RawClassEntry, ReflectionTable,
    TableExports,
};
pub use value::{ArrayElement, HostArray, NativeValue, RawValue, TypedPtr, Value};
