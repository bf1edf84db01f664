//! In-process native module used by the integration tests.
//!
//! Plays the role of a compiled native module: `#[repr(C)]` objects, real
//! `extern "C"` functions, and a reflection table served through the same
//! export-function protocol a dynamic library would use. Tests build engines
//! over it with `ReflectionTable::from_exports`.

#![allow(dead_code)]

use std::ffi::{c_char, c_void};
use std::mem::offset_of;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crossbind::prelude::*;
use crossbind::{RawAccessEntry, RawClassEntry, TableExports};

// ============================================================================
// Native objects
// ============================================================================

#[repr(C)]
pub struct AnaClass {
    pub a: u32,
    pub b: u32,
}

#[repr(C)]
pub struct FooClass {
    pub another: *mut AnaClass,
    pub history: *mut f32,
    pub speed: f32,
    pub count: i32,
}

/// Times the fooclass destructor ran, for lifetime assertions.
pub static FOO_DESTROYED: AtomicUsize = AtomicUsize::new(0);
/// Times the anaclass destructor ran.
pub static ANA_DESTROYED: AtomicUsize = AtomicUsize::new(0);
/// Times the module's diagnostic dump ran.
pub static DUMP_CALLS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn create_fooclass(speed: f32, count: i32) -> *mut FooClass {
    let another = Box::into_raw(Box::new(AnaClass { a: 999, b: 888 }));
    let foo = Box::into_raw(Box::new(FooClass {
        another,
        history: std::ptr::null_mut(),
        speed,
        count,
    }));
    unsafe { (*foo).history = &raw mut (*foo).speed };
    foo
}

extern "C" fn destroy_fooclass(foo: *mut FooClass) {
    if !foo.is_null() {
        unsafe {
            let foo = Box::from_raw(foo);
            drop(Box::from_raw(foo.another));
        }
        FOO_DESTROYED.fetch_add(1, Ordering::SeqCst);
    }
}

extern "C" fn create_anaclass(a: u32, b: u32) -> *mut AnaClass {
    Box::into_raw(Box::new(AnaClass { a, b }))
}

extern "C" fn destroy_anaclass(ana: *mut AnaClass) {
    if !ana.is_null() {
        unsafe { drop(Box::from_raw(ana)) };
        ANA_DESTROYED.fetch_add(1, Ordering::SeqCst);
    }
}

extern "C" fn fooclass_double_speed(foo: *mut FooClass) {
    let foo = unsafe { &mut *foo };
    foo.speed *= 2.0;
}

extern "C" fn fooclass_count_zero(foo: *mut FooClass, values: *const u32, len: u64) {
    let foo = unsafe { &mut *foo };
    let mut zeros = 0i32;
    for i in 0..len as usize {
        if unsafe { *values.add(i) } == 0 {
            zeros += 1;
        }
    }
    foo.count = zeros;
}

extern "C" fn fooclass_get_another(foo: *mut FooClass) -> *mut AnaClass {
    unsafe { (*foo).another }
}

// A class whose instances live in static storage: its constructor hands out
// the same address every time, which the ownership ledger must reject.
static SINGLETON_STORAGE: AtomicU32 = AtomicU32::new(0);

extern "C" fn create_singleton() -> *mut c_void {
    SINGLETON_STORAGE.as_ptr() as *mut c_void
}

extern "C" fn destroy_singleton(_p: *mut c_void) {}

// ============================================================================
// Global functions
// ============================================================================

extern "C" fn mult(x: i32, y: i32) -> i32 {
    x * y
}

extern "C" fn cstr_greeting() -> *const c_char {
    c"good".as_ptr()
}

extern "C" fn count_zeros(values: *const u32, len: u64) -> u64 {
    let mut zeros = 0u64;
    for i in 0..len as usize {
        if unsafe { *values.add(i) } == 0 {
            zeros += 1;
        }
    }
    zeros
}

extern "C" fn modify_array(values: *mut u32, len: u64) {
    for i in 0..len as usize {
        unsafe { *values.add(i) += 1 };
    }
}

// ============================================================================
// Reflection table
// ============================================================================

struct Fixture {
    access: Vec<RawAccessEntry>,
    classes: Vec<RawClassEntry>,
}

// The table holds raw pointers to immortal data: C-string literals, statics,
// and function addresses.
unsafe impl Send for Fixture {}
unsafe impl Sync for Fixture {}

const PTR_SIZE: usize = std::mem::size_of::<*const ()>();

fn function_entry(name: &'static std::ffi::CStr, sig: &'static std::ffi::CStr, addr: usize) -> RawAccessEntry {
    RawAccessEntry {
        kind: 1,
        addr: addr as *mut c_void,
        name: name.as_ptr(),
        sig: sig.as_ptr(),
        offset: 0,
        field_size: 0,
    }
}

fn method_entry(name: &'static std::ffi::CStr, sig: &'static std::ffi::CStr, addr: usize) -> RawAccessEntry {
    RawAccessEntry {
        kind: 2,
        addr: addr as *mut c_void,
        name: name.as_ptr(),
        sig: sig.as_ptr(),
        offset: 0,
        field_size: 0,
    }
}

fn field_entry(
    name: &'static std::ffi::CStr,
    sig: &'static std::ffi::CStr,
    offset: usize,
    field_size: usize,
) -> RawAccessEntry {
    RawAccessEntry {
        kind: 3,
        addr: std::ptr::null_mut(),
        name: name.as_ptr(),
        sig: sig.as_ptr(),
        offset,
        field_size,
    }
}

static FIXTURE: LazyLock<Fixture> = LazyLock::new(|| {
    let access = vec![
        function_entry(c"mult", c"i32:i32;i32", mult as usize),
        function_entry(c"cstr_greeting", c";*cstr", cstr_greeting as usize),
        function_entry(c"count_zeros", c"*u32:u64;u64", count_zeros as usize),
        function_entry(c"modify_array", c"*u32:u64;void", modify_array as usize),
        method_entry(
            c"fooclass.double_speed",
            c"*fooclass;void",
            fooclass_double_speed as usize,
        ),
        method_entry(
            c"fooclass.count_zero",
            c"*fooclass:*u32:u64;void",
            fooclass_count_zero as usize,
        ),
        method_entry(
            c"fooclass.get_another",
            c"*fooclass;*anaclass",
            fooclass_get_another as usize,
        ),
        field_entry(
            c"fooclass.another",
            c"*anaclass",
            offset_of!(FooClass, another),
            PTR_SIZE,
        ),
        field_entry(
            c"fooclass.history",
            c"*f32",
            offset_of!(FooClass, history),
            PTR_SIZE,
        ),
        field_entry(c"fooclass.speed", c"f32", offset_of!(FooClass, speed), 4),
        field_entry(c"fooclass.count", c"i32", offset_of!(FooClass, count), 4),
        field_entry(c"anaclass.a", c"u32", offset_of!(AnaClass, a), 4),
        field_entry(c"anaclass.b", c"u32", offset_of!(AnaClass, b), 4),
        // badclass reflects its field one word too large; binding must fail.
        field_entry(c"badclass.broken", c"u32", 0, 8),
    ];

    let classes = vec![
        RawClassEntry {
            name: c"fooclass".as_ptr(),
            ctor_addr: create_fooclass as usize as *mut c_void,
            ctor_sig: c"f32:i32;*fooclass".as_ptr(),
            dtor_addr: destroy_fooclass as usize as *mut c_void,
            dtor_sig: c"*fooclass;void".as_ptr(),
        },
        RawClassEntry {
            name: c"anaclass".as_ptr(),
            ctor_addr: create_anaclass as usize as *mut c_void,
            ctor_sig: c"u32:u32;*anaclass".as_ptr(),
            dtor_addr: destroy_anaclass as usize as *mut c_void,
            dtor_sig: c"*anaclass;void".as_ptr(),
        },
        RawClassEntry {
            name: c"singleton".as_ptr(),
            ctor_addr: create_singleton as usize as *mut c_void,
            ctor_sig: c";*singleton".as_ptr(),
            dtor_addr: destroy_singleton as usize as *mut c_void,
            dtor_sig: c"*singleton;void".as_ptr(),
        },
        RawClassEntry {
            name: c"badclass".as_ptr(),
            ctor_addr: create_singleton as usize as *mut c_void,
            ctor_sig: c";*badclass".as_ptr(),
            dtor_addr: destroy_singleton as usize as *mut c_void,
            dtor_sig: c"*badclass;void".as_ptr(),
        },
    ];

    Fixture { access, classes }
});

extern "C" fn access_entry_count() -> u64 {
    FIXTURE.access.len() as u64
}

extern "C" fn access_entry_at(index: u64) -> *const RawAccessEntry {
    FIXTURE
        .access
        .get(index as usize)
        .map_or(std::ptr::null(), |e| e as *const _)
}

extern "C" fn class_entry_count() -> u64 {
    FIXTURE.classes.len() as u64
}

extern "C" fn class_entry_at(index: u64) -> *const RawClassEntry {
    FIXTURE
        .classes
        .get(index as usize)
        .map_or(std::ptr::null(), |e| e as *const _)
}

extern "C" fn dump_entries() {
    DUMP_CALLS.fetch_add(1, Ordering::SeqCst);
}

/// A reflection table over the fixture module.
pub fn table() -> ReflectionTable {
    unsafe {
        ReflectionTable::from_exports(TableExports {
            access_count: access_entry_count,
            access_at: access_entry_at,
            class_count: class_entry_count,
            class_at: class_entry_at,
            dump: Some(dump_entries),
        })
    }
}

/// A fresh engine over the fixture module.
pub fn engine() -> Engine {
    Engine::from_table(table()).expect("fixture table is well-formed")
}
