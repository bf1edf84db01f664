//! The signature mini-language.
//!
//! A signature encodes a callable's argument and return types as
//! `arg1:arg2:...;returnTag`. The argument list may be empty; the return tag
//! is mandatory. A type tag is an optional single leading `*` (one level of
//! indirection) followed by a bare tag: a basic scalar tag, `void`
//! (return-only), the built-in string tag, or a registered class name.
//!
//! Splitting yields the elements return-first, so downstream code indexes
//! argument `i` at position `i + 1`.

use crate::error::SignatureError;
use crate::native_type::{NativeScalar, NativeType};

/// Separates the argument list from the return tag. Exactly one per signature.
pub const RETURN_SEPARATOR: char = ';';

/// Separates argument tags from each other.
pub const ARG_DELIMITER: char = ':';

/// Marks one level of indirection on a type tag.
pub const INDIRECTION_MARKER: char = '*';

/// Split a signature into its elements, return tag first.
///
/// ```
/// use crossbind_core::signature::split_signature;
///
/// let elems = split_signature("i32:f64;u8").unwrap();
/// assert_eq!(elems, ["u8", "i32", "f64"]);
///
/// let elems = split_signature(";void").unwrap();
/// assert_eq!(elems, ["void"]);
/// ```
pub fn split_signature(sig: &str) -> Result<Vec<String>, SignatureError> {
    let mut parts = sig.split(RETURN_SEPARATOR);
    let args = parts.next().unwrap_or_default();
    let ret = match parts.next() {
        Some(ret) => ret,
        None => {
            return Err(SignatureError::MissingSeparator {
                sig: sig.to_string(),
            });
        }
    };
    if parts.next().is_some() {
        return Err(SignatureError::ExtraSeparator {
            sig: sig.to_string(),
        });
    }

    let mut elements = vec![ret.to_string()];
    if !args.is_empty() {
        elements.extend(args.split(ARG_DELIMITER).map(str::to_string));
    }
    Ok(elements)
}

/// Strip the indirection marker off a tag.
///
/// Returns the indirection level (0 or 1) and the bare tag. More than one
/// marker is rejected here, before any registry lookup happens.
pub fn decompose_tag(tag: &str) -> Result<(u8, &str), SignatureError> {
    let base = tag.trim_start_matches(INDIRECTION_MARKER);
    let indirection = tag.len() - base.len();
    if indirection > 1 {
        return Err(SignatureError::IndirectionTooDeep {
            tag: tag.to_string(),
        });
    }
    Ok((indirection as u8, base))
}

/// A fully resolved signature element.
///
/// Produced by the type registry's `describe_element`; carries everything the
/// invocation engine and field accessors need to marshal one value.
#[derive(Debug, Clone, PartialEq)]
pub struct SigElement {
    /// The tag as written, e.g. `*u32` or `*widget`.
    pub tag: String,
    /// The tag with indirection stripped, e.g. `u32` or `widget`.
    pub base: String,
    /// Indirection level: 0 or 1.
    pub indirection: u8,
    /// Level 0 over a basic tag.
    pub is_basic: bool,
    /// Level 1 over a basic tag.
    pub is_basic_ptr: bool,
    /// The native storage this element occupies in a call frame.
    pub native: NativeType,
    /// For basic-type pointers, the scalar being pointed at.
    pub pointee: Option<NativeScalar>,
}

impl SigElement {
    /// Whether this element is the `void` return sentinel.
    pub fn is_void(&self) -> bool {
        self.native == NativeType::Void
    }
}
