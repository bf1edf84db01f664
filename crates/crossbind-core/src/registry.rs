//! The type registry.
//!
//! Central catalogue of type mappings: how a signature tag stores natively,
//! how the matching host value looks, and which converters carry values across
//! the boundary. The registry is populated in a single initialization phase
//! (builtins at construction, one synthetic entry per native class discovered
//! in the reflection table, and one host binding per `bind_class` call), after
//! which it is treated as read-only.
//!
//! # Mapping categories
//!
//! - **Basic** entries are the fixed scalar catalogue plus the `void` return
//!   sentinel. They always carry a tag and native storage and never convert.
//! - **Extended** entries require translation: the built-in null-terminated
//!   string type, the host array type (whose native form depends on the
//!   array's element type at call time), and one opaque-pointer entry per
//!   native class. Class entries defer their host binding until a host
//!   declaration claims them, exactly once.

use std::ffi::{CStr, CString};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{CallError, InteropError, LookupError, RebindError, SignatureError};
use crate::native_memory::NativeAddress;
use crate::native_type::{NativeScalar, NativeType};
use crate::signature::{SigElement, decompose_tag};
use crate::table::ReflectionTable;
use crate::value::{NativeValue, Value};

/// The built-in null-terminated string tag.
pub const CSTR_TAG: &str = "*cstr";

/// Converts a native address into a host value (return values, field reads).
pub type NativeToHost = Rc<dyn Fn(NativeAddress) -> Result<Value, CallError>>;

/// Converts a host value into native-representable storage (arguments).
pub type HostToNative = Rc<dyn Fn(&Value) -> Result<NativeValue, CallError>>;

/// Whether a mapping is native-representable as-is or requires translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Basic,
    Extended,
}

/// Host-side identity of an extended mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostKind {
    /// Host strings (`Value::Str`).
    Str,
    /// Element-tagged host arrays (`Value::Array`).
    Array,
    /// A bound native class, by class name (`Value::Object`).
    Class(String),
}

/// One registry record.
pub struct TypeMapping {
    /// The native ABI tag, absent for purely host-side entries (arrays).
    pub tag: Option<String>,
    /// Native storage, absent when it depends on the value (arrays).
    pub native: Option<NativeType>,
    /// Host identity; extended entries may defer this until a class binds.
    pub host: Option<HostKind>,
    pub kind: MappingKind,
    pub(crate) to_host: Option<NativeToHost>,
    pub(crate) to_native: Option<HostToNative>,
}

impl std::fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMapping")
            .field("tag", &self.tag)
            .field("native", &self.native)
            .field("host", &self.host)
            .field("kind", &self.kind)
            .field("to_host", &self.to_host.is_some())
            .field("to_native", &self.to_native.is_some())
            .finish()
    }
}

impl TypeMapping {
    /// The entry's tag, for error messages.
    fn tag_label(&self) -> String {
        self.tag.clone().unwrap_or_else(|| "<host-only>".to_string())
    }

    /// The native-to-host converter, or a missing-converter error.
    pub(crate) fn require_to_host(&self) -> Result<&NativeToHost, CallError> {
        self.to_host.as_ref().ok_or_else(|| CallError::MissingConverter {
            tag: self.tag_label(),
            direction: "native-to-host",
        })
    }

    /// The host-to-native converter, or a missing-converter error.
    pub(crate) fn require_to_native(&self) -> Result<&HostToNative, CallError> {
        self.to_native.as_ref().ok_or_else(|| CallError::MissingConverter {
            tag: self.tag_label(),
            direction: "host-to-native",
        })
    }
}

/// The catalogue of basic and extended type mappings.
pub struct TypeRegistry {
    entries: Vec<TypeMapping>,
    by_tag: FxHashMap<String, usize>,
    by_scalar: FxHashMap<NativeScalar, usize>,
    by_host: FxHashMap<HostKind, usize>,
    basic_tags: FxHashSet<String>,
}

impl TypeRegistry {
    /// Build a registry holding only the built-in catalogue.
    pub fn with_builtins() -> Self {
        let mut registry = TypeRegistry {
            entries: Vec::new(),
            by_tag: FxHashMap::default(),
            by_scalar: FxHashMap::default(),
            by_host: FxHashMap::default(),
            basic_tags: FxHashSet::default(),
        };

        for scalar in NativeScalar::ALL {
            registry.push_entry(TypeMapping {
                tag: Some(scalar.tag().to_string()),
                native: Some(NativeType::Scalar(scalar)),
                host: None,
                kind: MappingKind::Basic,
                to_host: None,
                to_native: None,
            });
        }

        // The return-only sentinel.
        registry.push_entry(TypeMapping {
            tag: Some("void".to_string()),
            native: Some(NativeType::Void),
            host: None,
            kind: MappingKind::Basic,
            to_host: None,
            to_native: None,
        });

        // Null-terminated strings.
        registry.push_entry(TypeMapping {
            tag: Some(CSTR_TAG.to_string()),
            native: Some(NativeType::Ptr),
            host: Some(HostKind::Str),
            kind: MappingKind::Extended,
            to_host: Some(Rc::new(decode_cstr)),
            to_native: Some(Rc::new(encode_cstr)),
        });

        // Host arrays: native form depends on the element type at call time.
        registry.push_entry(TypeMapping {
            tag: None,
            native: None,
            host: Some(HostKind::Array),
            kind: MappingKind::Extended,
            to_host: None,
            to_native: Some(Rc::new(array_base_pointer)),
        });

        registry
    }

    /// Build a registry from a reflection table: builtins plus one synthetic
    /// extended entry per discovered native class.
    pub fn from_table(table: &ReflectionTable) -> Result<Self, InteropError> {
        let mut registry = Self::with_builtins();
        for entry in table.class_entries()? {
            registry.register_class_tag(&entry.name)?;
        }
        Ok(registry)
    }

    fn push_entry(&mut self, mapping: TypeMapping) -> usize {
        let index = self.entries.len();
        if let Some(tag) = &mapping.tag {
            self.by_tag.insert(tag.clone(), index);
            if mapping.kind == MappingKind::Basic {
                self.basic_tags.insert(tag.clone());
            }
        }
        if let (MappingKind::Basic, Some(NativeType::Scalar(s))) = (mapping.kind, mapping.native) {
            self.by_scalar.insert(s, index);
        }
        if let Some(host) = &mapping.host {
            self.by_host.insert(host.clone(), index);
        }
        self.entries.push(mapping);
        index
    }

    /// Register the synthetic opaque-pointer entry for a native class.
    ///
    /// Fails if the class name collides with a basic tag or the class was
    /// already registered.
    pub fn register_class_tag(&mut self, class_name: &str) -> Result<(), RebindError> {
        let tag = format!("*{class_name}");
        if self.basic_tags.contains(class_name) || self.by_tag.contains_key(&tag) {
            return Err(RebindError::ClassTagConflict {
                name: class_name.to_string(),
            });
        }
        self.push_entry(TypeMapping {
            tag: Some(tag),
            native: Some(NativeType::Ptr),
            host: None,
            kind: MappingKind::Extended,
            to_host: None,
            to_native: None,
        });
        Ok(())
    }

    /// Whether the tag names a basic type (including the `void` sentinel).
    pub fn is_basic_tag(&self, tag: &str) -> bool {
        self.basic_tags.contains(tag)
    }

    /// Bind a host identity to a previously unresolved extended entry.
    pub fn resolve_extended_type(&mut self, tag: &str, host: HostKind) -> Result<(), InteropError> {
        let index = self.index_by_tag(tag)?;
        if self.entries[index].host.is_some() {
            return Err(RebindError::HostTypeAlreadyBound {
                tag: tag.to_string(),
            }
            .into());
        }
        self.entries[index].host = Some(host.clone());
        self.by_host.insert(host, index);
        Ok(())
    }

    /// Install the native-to-host converter for a tag.
    pub fn set_native_to_host(&mut self, tag: &str, f: NativeToHost) -> Result<(), InteropError> {
        let index = self.index_by_tag(tag)?;
        self.entries[index].to_host = Some(f);
        Ok(())
    }

    /// Install the host-to-native converter for a tag.
    pub fn set_host_to_native(&mut self, tag: &str, f: HostToNative) -> Result<(), InteropError> {
        let index = self.index_by_tag(tag)?;
        self.entries[index].to_native = Some(f);
        Ok(())
    }

    fn index_by_tag(&self, tag: &str) -> Result<usize, LookupError> {
        self.by_tag
            .get(tag)
            .copied()
            .ok_or_else(|| LookupError::MappingNotFound {
                tag: tag.to_string(),
            })
    }

    /// Look up a mapping by its native ABI tag.
    pub fn lookup_by_tag(&self, tag: &str) -> Result<&TypeMapping, LookupError> {
        self.index_by_tag(tag).map(|i| &self.entries[i])
    }

    /// Look up the basic mapping for a native scalar.
    pub fn lookup_by_scalar(&self, scalar: NativeScalar) -> Result<&TypeMapping, LookupError> {
        self.by_scalar
            .get(&scalar)
            .map(|&i| &self.entries[i])
            .ok_or(LookupError::ScalarMappingNotFound {
                scalar: scalar.tag(),
            })
    }

    /// Look up the extended mapping matching a host value's runtime identity.
    ///
    /// Scalars are native-representable and never take this path; raw typed
    /// pointers have no mapping at all.
    pub fn lookup_by_value(&self, value: &Value) -> Result<&TypeMapping, LookupError> {
        let host = match value {
            Value::Str(_) => HostKind::Str,
            Value::Array(_) => HostKind::Array,
            Value::Object(obj) => HostKind::Class(obj.class_name().to_string()),
            Value::Ptr(_) => return Err(LookupError::ScalarHostLookup),
            _ => return Err(LookupError::ScalarHostLookup),
        };
        match self.by_host.get(&host) {
            Some(&i) => Ok(&self.entries[i]),
            None => {
                let tag = match host {
                    HostKind::Class(name) => format!("*{name}"),
                    HostKind::Str => CSTR_TAG.to_string(),
                    HostKind::Array => "<array>".to_string(),
                };
                Err(LookupError::MappingNotFound { tag })
            }
        }
    }

    /// Resolve one signature tag into a full element descriptor.
    ///
    /// Enforces the indirection rules: at most one level, extended types only
    /// behind a pointer, `void` only plain.
    pub fn describe_element(&self, tag: &str) -> Result<SigElement, SignatureError> {
        let (indirection, base) = decompose_tag(tag)?;

        if base == "void" {
            if indirection != 0 {
                return Err(SignatureError::InvalidVoid {
                    tag: tag.to_string(),
                });
            }
            return Ok(SigElement {
                tag: tag.to_string(),
                base: base.to_string(),
                indirection,
                is_basic: true,
                is_basic_ptr: false,
                native: NativeType::Void,
                pointee: None,
            });
        }

        if self.is_basic_tag(base) {
            let entry = self
                .lookup_by_tag(base)
                .map_err(|_| SignatureError::UnknownTag {
                    tag: tag.to_string(),
                })?;
            let scalar = match entry.native {
                Some(NativeType::Scalar(s)) => s,
                _ => {
                    return Err(SignatureError::UnknownTag {
                        tag: tag.to_string(),
                    });
                }
            };
            let (native, pointee) = if indirection == 0 {
                (NativeType::Scalar(scalar), None)
            } else {
                (NativeType::Ptr, Some(scalar))
            };
            return Ok(SigElement {
                tag: tag.to_string(),
                base: base.to_string(),
                indirection,
                is_basic: indirection == 0,
                is_basic_ptr: indirection == 1,
                native,
                pointee,
            });
        }

        // Extended types are only ever referenced through a pointer.
        if indirection == 0 {
            return Err(SignatureError::ExtendedWithoutPointer {
                tag: tag.to_string(),
            });
        }
        if !self.by_tag.contains_key(tag) {
            return Err(SignatureError::UnknownTag {
                tag: tag.to_string(),
            });
        }
        Ok(SigElement {
            tag: tag.to_string(),
            base: base.to_string(),
            indirection,
            is_basic: false,
            is_basic_ptr: false,
            native: NativeType::Ptr,
            pointee: None,
        })
    }
}

// ============================================================================
// Built-in converters
// ============================================================================

fn encode_cstr(value: &Value) -> Result<NativeValue, CallError> {
    match value {
        Value::Str(s) => CString::new(s.as_str())
            .map(NativeValue::CString)
            .map_err(|_| CallError::NulInString),
        _ => Err(CallError::ConverterMismatch {
            tag: CSTR_TAG.to_string(),
        }),
    }
}

fn decode_cstr(addr: NativeAddress) -> Result<Value, CallError> {
    if addr.is_null() {
        return Err(CallError::NullReturn {
            name: CSTR_TAG.to_string(),
        });
    }
    let s = unsafe { CStr::from_ptr(addr.as_ptr() as *const std::ffi::c_char) };
    s.to_str()
        .map(|s| Value::Str(s.to_string()))
        .map_err(|_| CallError::InvalidStringData)
}

fn array_base_pointer(value: &Value) -> Result<NativeValue, CallError> {
    match value {
        Value::Array(array) => Ok(NativeValue::Ptr(array.base_ptr())),
        _ => Err(CallError::ConverterMismatch {
            tag: "<array>".to_string(),
        }),
    }
}
