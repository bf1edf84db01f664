//! Binding-system tests: class binding rules, two-tier name resolution,
//! field access control, and object lifetime/ownership.

mod fixture;

use crossbind::prelude::*;
use crossbind::{
    CallError, InteropError, LookupError, OwnershipError, RebindError,
};
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};

// Destructor counters are process-global; lifetime tests serialize on this.
static LIFECYCLE: Mutex<()> = Mutex::new(());

fn lifecycle_guard() -> MutexGuard<'static, ()> {
    LIFECYCLE.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Binding rules
// ============================================================================

#[test]
fn binding_exposes_reflected_members() {
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();

    assert!(widget.has_method("double_speed"));
    assert!(widget.has_method("count_zero"));
    assert!(widget.has_field("speed"));
    assert!(widget.has_field("count"));
    assert!(widget.has_field("another"));
    // Members of other classes never leak in.
    assert!(!widget.has_field("a"));
    assert_eq!(engine.class_binding("fooclass").unwrap().class_name(), "fooclass");
}

#[test]
fn host_declared_names_shift_generated_members_to_alternates() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine
        .bind_class(
            ClassDecl::new("fooclass")
                .with_host_member("speed")
                .with_host_member("double_speed"),
        )
        .unwrap();

    assert!(widget.has_field("raw_speed"));
    assert!(!widget.has_field("speed"));
    assert!(widget.has_method("raw_double_speed"));
    assert!(!widget.has_method("double_speed"));

    let foo = widget
        .construct(&engine, &[Value::F32(100.0), Value::I32(5)])
        .unwrap();
    // The alternate names are live; the primary names resolve to nothing.
    foo.call(&engine, "raw_double_speed", &[]).unwrap();
    assert_eq!(foo.get(&engine, "raw_speed").unwrap().as_f64(), Some(200.0));
    assert!(matches!(
        foo.get(&engine, "speed").unwrap_err(),
        InteropError::Lookup(LookupError::FieldNotFound { .. })
    ));
    assert!(matches!(
        foo.call(&engine, "double_speed", &[]).unwrap_err(),
        InteropError::Lookup(LookupError::MethodNotFound { .. })
    ));
}

#[test]
fn field_size_disagreement_fails_the_whole_class_binding() {
    let mut engine = fixture::engine();
    let err = engine.bind_class(ClassDecl::new("badclass")).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Rebind(RebindError::FieldSizeMismatch {
            reflected: 8,
            implied: 4,
            ..
        })
    ));
    // The failure happened at definition time; nothing was bound.
    assert!(engine.class_binding("badclass").is_none());
}

#[test]
fn unknown_class_fails_binding() {
    let mut engine = fixture::engine();
    let err = engine.bind_class(ClassDecl::new("ghostclass")).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Lookup(LookupError::ClassEntryNotFound { .. })
    ));
}

#[test]
fn classes_bind_exactly_once() {
    let mut engine = fixture::engine();
    engine.bind_class(ClassDecl::new("fooclass")).unwrap();
    let err = engine.bind_class(ClassDecl::new("fooclass")).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Rebind(RebindError::ClassAlreadyBound { .. })
    ));
}

#[test]
fn object_fields_of_unbound_classes_cannot_convert() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();
    let foo = widget
        .construct(&engine, &[Value::F32(1.0), Value::I32(1)])
        .unwrap();

    // anaclass is never bound, so its native-to-host converter is missing.
    let err = foo.get(&engine, "another").unwrap_err();
    assert!(matches!(
        err,
        InteropError::Call(CallError::MissingConverter { .. })
    ));
}

// ============================================================================
// Field access control
// ============================================================================

#[test]
fn basic_fields_are_writable() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();
    let foo = widget
        .construct(&engine, &[Value::F32(100.0), Value::I32(5)])
        .unwrap();

    foo.set(&engine, "speed", &Value::F32(789.0)).unwrap();
    assert_eq!(foo.get(&engine, "speed").unwrap().as_f64(), Some(789.0));

    // Integer widths convert on the way in.
    foo.set(&engine, "count", &Value::I64(12)).unwrap();
    assert_eq!(foo.get(&engine, "count").unwrap().as_i64(), Some(12));
}

#[test]
fn pointer_fields_are_read_only() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();
    let foo = widget
        .construct(&engine, &[Value::F32(1.0), Value::I32(1)])
        .unwrap();

    let err = foo
        .set(&engine, "another", &Value::U64(0xdead))
        .unwrap_err();
    assert!(matches!(
        err,
        InteropError::Ownership(OwnershipError::PointerFieldWrite { .. })
    ));
    let err = foo.set(&engine, "history", &Value::U64(0)).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Ownership(OwnershipError::PointerFieldWrite { .. })
    ));
}

#[test]
fn field_stores_reject_mismatched_categories() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();
    let foo = widget
        .construct(&engine, &[Value::F32(1.0), Value::I32(1)])
        .unwrap();

    let err = foo.set(&engine, "count", &Value::F64(1.5)).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Call(CallError::FieldStore { .. })
    ));
    let err = foo.set(&engine, "count", &Value::from("12")).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Call(CallError::FieldStore { .. })
    ));
}

// ============================================================================
// Ownership and lifetime
// ============================================================================

#[test]
fn explicit_destroy_runs_the_destructor_once() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();

    let before = fixture::FOO_DESTROYED.load(Ordering::SeqCst);
    let mut foo = widget
        .construct(&engine, &[Value::F32(1.0), Value::I32(1)])
        .unwrap();
    assert!(foo.is_owning());

    foo.destroy().unwrap();
    assert_eq!(fixture::FOO_DESTROYED.load(Ordering::SeqCst), before + 1);

    // The pointer is cleared: destruction cannot run twice, and access fails.
    let err = foo.destroy().unwrap_err();
    assert!(matches!(
        err,
        InteropError::Ownership(OwnershipError::NullObject { .. })
    ));
    let err = foo.get(&engine, "speed").unwrap_err();
    assert!(matches!(
        err,
        InteropError::Ownership(OwnershipError::NullObject { .. })
    ));
    drop(foo);
    assert_eq!(fixture::FOO_DESTROYED.load(Ordering::SeqCst), before + 1);
}

#[test]
fn dropping_an_owning_object_destroys_it() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();

    let before = fixture::FOO_DESTROYED.load(Ordering::SeqCst);
    {
        let _foo = widget
            .construct(&engine, &[Value::F32(1.0), Value::I32(1)])
            .unwrap();
    }
    assert_eq!(fixture::FOO_DESTROYED.load(Ordering::SeqCst), before + 1);
}

#[test]
fn non_owning_references_never_destroy() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();
    engine.bind_class(ClassDecl::new("anaclass")).unwrap();

    let foo = widget
        .construct(&engine, &[Value::F32(1.0), Value::I32(1)])
        .unwrap();

    let ana_before = fixture::ANA_DESTROYED.load(Ordering::SeqCst);
    {
        // Both the field path and the method path yield non-owning wrappers.
        let from_field = foo.get(&engine, "another").unwrap().into_object().unwrap();
        let from_method = foo
            .call(&engine, "get_another", &[])
            .unwrap()
            .into_object()
            .unwrap();
        assert_eq!(from_field.ptr(), from_method.ptr());
        let _clone = from_field.clone();
    }
    assert_eq!(fixture::ANA_DESTROYED.load(Ordering::SeqCst), ana_before);
}

#[test]
fn a_live_pointer_admits_only_one_owner() {
    let mut engine = fixture::engine();
    let singleton = engine.bind_class(ClassDecl::new("singleton")).unwrap();

    let first = singleton.construct(&engine, &[]).unwrap();
    let err = singleton.construct(&engine, &[]).unwrap_err();
    assert!(matches!(
        err,
        InteropError::Ownership(OwnershipError::DuplicateOwner { .. })
    ));

    // Destruction releases the claim.
    drop(first);
    let again = singleton.construct(&engine, &[]).unwrap();
    drop(again);
}

#[test]
fn release_gives_up_ownership_without_destroying() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let widget = engine.bind_class(ClassDecl::new("fooclass")).unwrap();

    let before = fixture::FOO_DESTROYED.load(Ordering::SeqCst);
    let foo = widget
        .construct(&engine, &[Value::F32(5.0), Value::I32(2)])
        .unwrap();
    let handle = foo.release();

    // No owner remains: nothing destroys, and the reference still reads.
    assert_eq!(fixture::FOO_DESTROYED.load(Ordering::SeqCst), before);
    assert_eq!(handle.get(&engine, "speed").unwrap().as_f64(), Some(5.0));
    drop(handle);
    assert_eq!(fixture::FOO_DESTROYED.load(Ordering::SeqCst), before);

    // The fixture object is intentionally leaked here; the native side owns it now.
}

#[test]
fn engine_construct_binds_and_builds() {
    let _guard = lifecycle_guard();
    let mut engine = fixture::engine();
    let foo = engine
        .construct(
            ClassDecl::new("fooclass"),
            &[Value::F32(3.0), Value::I32(9)],
        )
        .unwrap();
    assert_eq!(foo.class_name(), "fooclass");
    assert_eq!(foo.get(&engine, "count").unwrap().as_i64(), Some(9));
}
