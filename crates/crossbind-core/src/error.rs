//! Unified error types for the interop engine.
//!
//! This module provides a consistent error type hierarchy for all phases of
//! interop processing: signature parsing, table discovery, type registration,
//! class binding, and invocation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! InteropError (top-level wrapper)
//! ├── SignatureError - malformed signature strings and type tags
//! ├── TableError     - malformed or unreadable reflection tables
//! ├── LookupError    - entries or mappings that do not exist
//! ├── RebindError    - attempts to bind something twice (or inconsistently)
//! ├── CallError      - argument/return marshalling failures
//! └── OwnershipError - object lifetime and write-protection violations
//! ```
//!
//! All errors are detected eagerly, at binding or call time, and abort the
//! operation that triggered them. There is no silent coercion or retry.

use thiserror::Error;

// ============================================================================
// Signature Errors
// ============================================================================

/// Errors produced while parsing a signature string or a single type tag.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignatureError {
    /// The signature has no separator between arguments and return tag.
    #[error("signature '{sig}' is missing the ';' separator")]
    MissingSeparator { sig: String },

    /// The signature has more than one separator.
    #[error("signature '{sig}' has more than one ';' separator")]
    ExtraSeparator { sig: String },

    /// A type tag carries more than one indirection marker.
    #[error("tag '{tag}' exceeds the maximum indirection level of 1")]
    IndirectionTooDeep { tag: String },

    /// A type tag names a type the registry does not know.
    #[error("unknown type tag '{tag}'")]
    UnknownTag { tag: String },

    /// An extended type was referenced without indirection.
    #[error("extended type '{tag}' must be referenced through a pointer")]
    ExtendedWithoutPointer { tag: String },

    /// `void` was used with indirection or outside return position.
    #[error("'void' is only valid as a plain return tag, got '{tag}'")]
    InvalidVoid { tag: String },
}

// ============================================================================
// Table Errors
// ============================================================================

/// Errors produced by the reflection-table client.
#[derive(Debug, Error)]
pub enum TableError {
    /// The native module could not be loaded.
    #[error("failed to load native module '{path}': {message}")]
    LoadFailed { path: String, message: String },

    /// A required table export is missing from the module.
    #[error("native module does not export '{symbol}'")]
    MissingExport { symbol: &'static str },

    /// An entry index is outside the table bounds.
    #[error("{table} entry index {index} out of range (table has {len} entries)")]
    IndexOutOfRange {
        table: &'static str,
        index: u64,
        len: u64,
    },

    /// The module returned a null entry pointer for a valid index.
    #[error("{table} entry {index} is null")]
    NullEntry { table: &'static str, index: u64 },

    /// An access entry carries an unknown kind discriminant.
    #[error("access entry has unknown kind {value}")]
    BadKind { value: i32 },

    /// An entry string field is null or not valid UTF-8.
    #[error("entry field '{field}' is not a valid string")]
    BadString { field: &'static str },
}

// ============================================================================
// Lookup Errors
// ============================================================================

/// Errors produced when a requested entry or mapping does not exist.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// No access entry with the given kind and name.
    #[error("no {kind} entry named '{name}' in the reflection table")]
    AccessEntryNotFound { kind: &'static str, name: String },

    /// No class entry with the given name.
    #[error("no class entry named '{name}' in the reflection table")]
    ClassEntryNotFound { name: String },

    /// No type mapping registered for the given tag.
    #[error("no type mapping registered for tag '{tag}'")]
    MappingNotFound { tag: String },

    /// No type mapping registered for the given native scalar.
    #[error("no type mapping registered for native scalar '{scalar}'")]
    ScalarMappingNotFound { scalar: &'static str },

    /// A scalar value was looked up through the extended-type path.
    #[error("scalar values are native-representable and have no extended mapping")]
    ScalarHostLookup,

    /// A bound class exposes no method with the given name.
    #[error("class '{class}' has no bound method '{name}'")]
    MethodNotFound { class: String, name: String },

    /// A bound class exposes no field with the given name.
    #[error("class '{class}' has no bound field '{name}'")]
    FieldNotFound { class: String, name: String },
}

// ============================================================================
// Rebind Errors
// ============================================================================

/// Errors produced when binding something that is already bound, or whose
/// declared shape disagrees with the reflection table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RebindError {
    /// The extended type already has a host binding.
    #[error("extended type '{tag}' already has a host binding")]
    HostTypeAlreadyBound { tag: String },

    /// A class tag was registered twice, or collides with a basic tag.
    #[error("class tag '{name}' conflicts with an existing type registration")]
    ClassTagConflict { name: String },

    /// The class is already bound to a host declaration.
    #[error("class '{name}' is already bound")]
    ClassAlreadyBound { name: String },

    /// A field's reflected size disagrees with its signature tag.
    #[error(
        "field '{class}.{field}' declares {reflected} bytes but its tag implies {implied} bytes"
    )]
    FieldSizeMismatch {
        class: String,
        field: String,
        reflected: usize,
        implied: usize,
    },
}

// ============================================================================
// Call Errors
// ============================================================================

/// Errors produced while marshalling arguments or return values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The argument count disagrees with the signature.
    #[error("'{name}' takes {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A value's resolved tag disagrees with the declared element.
    #[error("argument {index} of '{name}': declared '{declared}', got value of type '{actual}'")]
    TagMismatch {
        name: String,
        index: usize,
        declared: String,
        actual: String,
    },

    /// A raw typed pointer was passed where a plain value was declared.
    #[error("argument {index} of '{name}': raw pointers cannot be passed as values")]
    PointerArgument { name: String, index: usize },

    /// A scalar was passed where a pointer to a basic type was declared.
    #[error("argument {index} of '{name}': a scalar cannot stand in for a '{declared}' pointer")]
    ScalarForBasicPointer {
        name: String,
        index: usize,
        declared: String,
    },

    /// A scalar value's numeric category disagrees with the declared element.
    #[error("argument {index} of '{name}': cannot convert {actual} to declared '{declared}'")]
    ScalarCategory {
        name: String,
        index: usize,
        declared: String,
        actual: &'static str,
    },

    /// The mapping entry has no converter for the required direction.
    #[error("type '{tag}' has no {direction} converter installed")]
    MissingConverter {
        tag: String,
        direction: &'static str,
    },

    /// A converter was applied to a value of the wrong shape.
    #[error("converter for '{tag}' received an incompatible value")]
    ConverterMismatch { tag: String },

    /// A field write with a value the field's storage cannot hold.
    #[error("field '{field}': cannot store {actual} into '{declared}'")]
    FieldStore {
        field: String,
        declared: String,
        actual: &'static str,
    },

    /// A host string contains an interior NUL and cannot cross the boundary.
    #[error("string argument contains an interior NUL byte")]
    NulInString,

    /// A native string is not valid UTF-8 and cannot become a host string.
    #[error("native string is not valid UTF-8")]
    InvalidStringData,

    /// The native side returned a null pointer where a value was promised.
    #[error("'{name}' returned a null pointer")]
    NullReturn { name: String },
}

// ============================================================================
// Ownership Errors
// ============================================================================

/// Violations of the object lifetime and write-protection rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OwnershipError {
    /// Pointer-typed fields are read-only through the accessor.
    #[error("field '{class}.{field}' is pointer-typed and read-only")]
    PointerFieldWrite { class: String, field: String },

    /// A second object attempted to take ownership of a live native pointer.
    #[error("native object at {address:#x} already has an owner")]
    DuplicateOwner { address: usize },

    /// The constructor returned null, so there is nothing to own.
    #[error("constructor of '{class}' returned null")]
    NullConstruction { class: String },

    /// The object was already destroyed (or never owned a pointer).
    #[error("object of class '{class}' has no live native pointer")]
    NullObject { class: String },
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error wrapping every phase-specific error type.
#[derive(Debug, Error)]
pub enum InteropError {
    /// A signature parsing error.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// A reflection-table error.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A lookup error.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// A rebind error.
    #[error(transparent)]
    Rebind(#[from] RebindError),

    /// A call marshalling error.
    #[error(transparent)]
    Call(#[from] CallError),

    /// An ownership violation.
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
}

impl InteropError {
    /// Check if this is a signature error.
    pub fn is_signature(&self) -> bool {
        matches!(self, InteropError::Signature(_))
    }

    /// Check if this is a table error.
    pub fn is_table(&self) -> bool {
        matches!(self, InteropError::Table(_))
    }

    /// Check if this is a lookup error.
    pub fn is_lookup(&self) -> bool {
        matches!(self, InteropError::Lookup(_))
    }

    /// Check if this is a rebind error.
    pub fn is_rebind(&self) -> bool {
        matches!(self, InteropError::Rebind(_))
    }

    /// Check if this is a call error.
    pub fn is_call(&self) -> bool {
        matches!(self, InteropError::Call(_))
    }

    /// Check if this is an ownership violation.
    pub fn is_ownership(&self) -> bool {
        matches!(self, InteropError::Ownership(_))
    }
}

/// Convenience alias used across the engine.
pub type InteropResult<T> = Result<T, InteropError>;
