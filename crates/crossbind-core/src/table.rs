//! The reflection-table client.
//!
//! A conforming native module publishes two foreign arrays of fixed-layout
//! records, access entries (free functions, class methods, class fields) and
//! class entries (constructor/destructor pairs), and exposes them through
//! five exported functions: two entry counts, two indexed accessors, and a
//! diagnostic dump. This module resolves those exports, either from a dynamic
//! library or from raw function pointers supplied by an embedder, and decodes
//! the raw records into owned host-side views.
//!
//! The table is immutable after module load; every read goes back through the
//! module's accessors and no caching is performed.

use std::ffi::{CStr, c_char, c_void};
use std::path::Path;

use libloading::Library;
use num_enum::TryFromPrimitive;
use tracing::debug;

use crate::error::TableError;
use crate::native_memory::NativeAddress;

// ============================================================================
// Raw ABI records
// ============================================================================

/// One access-table record, exactly as the native module lays it out.
#[repr(C)]
pub struct RawAccessEntry {
    pub kind: i32,
    pub addr: *mut c_void,
    pub name: *const c_char,
    pub sig: *const c_char,
    pub offset: usize,
    pub field_size: usize,
}

/// One class-table record, exactly as the native module lays it out.
#[repr(C)]
pub struct RawClassEntry {
    pub name: *const c_char,
    pub ctor_addr: *mut c_void,
    pub ctor_sig: *const c_char,
    pub dtor_addr: *mut c_void,
    pub dtor_sig: *const c_char,
}

/// The kind discriminant of an access entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(i32)]
pub enum EntryKind {
    GlobalFunction = 1,
    ClassMethod = 2,
    ClassField = 3,
}

impl EntryKind {
    /// Human-readable label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::GlobalFunction => "global function",
            EntryKind::ClassMethod => "class method",
            EntryKind::ClassField => "class field",
        }
    }
}

// ============================================================================
// Decoded views
// ============================================================================

/// A decoded access entry with owned strings.
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub kind: EntryKind,
    /// Qualified name; class members are `"<className>.<memberName>"`.
    pub name: String,
    pub signature: String,
    pub address: NativeAddress,
    /// Byte offset of the field inside its object. Fields only.
    pub field_offset: usize,
    /// Declared byte size of the field. Fields only.
    pub field_size: usize,
}

impl AccessEntry {
    /// The member name with its class qualifier stripped.
    pub fn unqualified_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// A decoded class entry with owned strings.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub name: String,
    pub constructor: NativeAddress,
    pub constructor_sig: String,
    pub destructor: NativeAddress,
    pub destructor_sig: String,
}

// ============================================================================
// Module exports
// ============================================================================

pub type EntryCountFn = unsafe extern "C" fn() -> u64;
pub type AccessEntryAtFn = unsafe extern "C" fn(u64) -> *const RawAccessEntry;
pub type ClassEntryAtFn = unsafe extern "C" fn(u64) -> *const RawClassEntry;
pub type DumpEntriesFn = unsafe extern "C" fn();

pub const SYM_ACCESS_COUNT: &str = "reflect_access_entry_count";
pub const SYM_ACCESS_AT: &str = "reflect_access_entry_at";
pub const SYM_CLASS_COUNT: &str = "reflect_class_entry_count";
pub const SYM_CLASS_AT: &str = "reflect_class_entry_at";
pub const SYM_DUMP: &str = "reflect_dump_entries";

/// The resolved export functions of one conforming native module.
#[derive(Clone, Copy)]
pub struct TableExports {
    pub access_count: EntryCountFn,
    pub access_at: AccessEntryAtFn,
    pub class_count: EntryCountFn,
    pub class_at: ClassEntryAtFn,
    pub dump: Option<DumpEntriesFn>,
}

// ============================================================================
// ReflectionTable
// ============================================================================

/// Read access to one native module's reflection tables.
///
/// Keeps the backing library alive for as long as the table (and everything
/// derived from it: invokers, bindings, objects) may be used.
pub struct ReflectionTable {
    exports: TableExports,
    _lib: Option<Library>,
}

impl ReflectionTable {
    /// Load a native module from a dynamic library and resolve its exports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let lib = unsafe { Library::new(path) }.map_err(|e| TableError::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let exports = unsafe {
            TableExports {
                access_count: *resolve(&lib, SYM_ACCESS_COUNT)?,
                access_at: *resolve(&lib, SYM_ACCESS_AT)?,
                class_count: *resolve(&lib, SYM_CLASS_COUNT)?,
                class_at: *resolve(&lib, SYM_CLASS_AT)?,
                dump: lib
                    .get::<DumpEntriesFn>(SYM_DUMP.as_bytes())
                    .ok()
                    .map(|sym| *sym),
            }
        };

        let table = ReflectionTable {
            exports,
            _lib: Some(lib),
        };
        debug!(
            path = %path.display(),
            access_entries = table.access_entry_count(),
            class_entries = table.class_entry_count(),
            "loaded native module"
        );
        Ok(table)
    }

    /// Build a table from already-resolved exports (embedders that link the
    /// native module statically, and test fixtures).
    ///
    /// # Safety
    ///
    /// The exports must follow the reflection-table contract: indices below
    /// the reported counts yield non-null pointers to records whose string
    /// fields are valid null-terminated strings, stable for the lifetime of
    /// the process.
    pub unsafe fn from_exports(exports: TableExports) -> Self {
        ReflectionTable {
            exports,
            _lib: None,
        }
    }

    pub fn access_entry_count(&self) -> u64 {
        unsafe { (self.exports.access_count)() }
    }

    pub fn class_entry_count(&self) -> u64 {
        unsafe { (self.exports.class_count)() }
    }

    /// Decode the access entry at `index`.
    pub fn access_entry(&self, index: u64) -> Result<AccessEntry, TableError> {
        let len = self.access_entry_count();
        if index >= len {
            return Err(TableError::IndexOutOfRange {
                table: "access",
                index,
                len,
            });
        }
        let raw = unsafe { (self.exports.access_at)(index) };
        if raw.is_null() {
            return Err(TableError::NullEntry {
                table: "access",
                index,
            });
        }
        let raw = unsafe { &*raw };
        let kind = EntryKind::try_from_primitive(raw.kind)
            .map_err(|_| TableError::BadKind { value: raw.kind })?;
        Ok(AccessEntry {
            kind,
            name: unsafe { decode_str(raw.name, "name")? },
            signature: unsafe { decode_str(raw.sig, "signature")? },
            address: NativeAddress::from_mut(raw.addr),
            field_offset: raw.offset,
            field_size: raw.field_size,
        })
    }

    /// Decode the class entry at `index`.
    pub fn class_entry(&self, index: u64) -> Result<ClassEntry, TableError> {
        let len = self.class_entry_count();
        if index >= len {
            return Err(TableError::IndexOutOfRange {
                table: "class",
                index,
                len,
            });
        }
        let raw = unsafe { (self.exports.class_at)(index) };
        if raw.is_null() {
            return Err(TableError::NullEntry {
                table: "class",
                index,
            });
        }
        let raw = unsafe { &*raw };
        Ok(ClassEntry {
            name: unsafe { decode_str(raw.name, "class name")? },
            constructor: NativeAddress::from_mut(raw.ctor_addr),
            constructor_sig: unsafe { decode_str(raw.ctor_sig, "constructor signature")? },
            destructor: NativeAddress::from_mut(raw.dtor_addr),
            destructor_sig: unsafe { decode_str(raw.dtor_sig, "destructor signature")? },
        })
    }

    /// All access entries, decoded.
    pub fn access_entries(&self) -> Result<Vec<AccessEntry>, TableError> {
        (0..self.access_entry_count())
            .map(|i| self.access_entry(i))
            .collect()
    }

    /// All class entries, decoded.
    pub fn class_entries(&self) -> Result<Vec<ClassEntry>, TableError> {
        (0..self.class_entry_count())
            .map(|i| self.class_entry(i))
            .collect()
    }

    /// Linear scan for the first access entry with the given kind and exact
    /// qualified name.
    pub fn find_access_entry(
        &self,
        kind: EntryKind,
        name: &str,
    ) -> Result<Option<AccessEntry>, TableError> {
        for index in 0..self.access_entry_count() {
            let entry = self.access_entry(index)?;
            if entry.kind == kind && entry.name == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Linear scan for the class entry with the given name.
    pub fn find_class_entry(&self, name: &str) -> Result<Option<ClassEntry>, TableError> {
        for index in 0..self.class_entry_count() {
            let entry = self.class_entry(index)?;
            if entry.name == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Invoke the module's own diagnostic dump, if it exports one.
    pub fn dump_entries(&self) {
        match self.exports.dump {
            Some(dump) => unsafe { dump() },
            None => debug!("native module exports no entry dump"),
        }
    }
}

unsafe fn resolve<'lib, T>(
    lib: &'lib Library,
    symbol: &'static str,
) -> Result<libloading::Symbol<'lib, T>, TableError> {
    unsafe {
        lib.get(symbol.as_bytes())
            .map_err(|_| TableError::MissingExport { symbol })
    }
}

unsafe fn decode_str(ptr: *const c_char, field: &'static str) -> Result<String, TableError> {
    if ptr.is_null() {
        return Err(TableError::BadString { field });
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_string)
        .map_err(|_| TableError::BadString { field })
}
