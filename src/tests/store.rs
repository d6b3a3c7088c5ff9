use super::*;
use crate::common::*;
use crate::engine::subscript::{Modifiers, SubscriptArg};
use crate::runtime::Session;
use crate::value::{Binding, RangeSpec, TempState};

#[test]
fn test_temp_lifecycle() {
    let mut t = Tester::new("temp lifecycle");
    let table = t.symbols_mut();
    let a = table.alloc_array(TypeTag::Int32, &[4]).unwrap();
    assert!(table.is_free_temp(a));
    assert_eq!(table.elements::<i32>(a).unwrap(), vec![0; 4]);

    table.protect(a).unwrap();
    table.protect(a).unwrap();
    assert_eq!(table.state(a).unwrap(), TempState::Protected(2));
    assert!(!table.is_free_temp(a));
    table.unprotect(a).unwrap();
    assert!(!table.is_free_temp(a));
    table.unprotect(a).unwrap();
    assert!(table.is_free_temp(a));

    table.set_pipe(Some(a));
    assert!(!table.is_free_temp(a));
    table.set_pipe(None);
    assert!(table.is_free_temp(a));

    let seen = table.protected(a, |table| table.is_free_temp(a)).unwrap();
    assert!(!seen);
    assert!(table.is_free_temp(a));
}

#[test]
fn test_release_is_idempotent_and_stale_handles_fail() {
    let mut t = Tester::new("stale handles");
    let table = t.symbols_mut();
    let a = table.scalar_from(3i16);
    table.release(a);
    table.release(a);
    let b = table.scalar_from(4i16);
    // the slot is reused, the old handle must not reach it
    assert_eq!(a.index(), b.index());
    assert_eq!(table.value(a), Err(CoreError::UnknownSymbol(a)));
    table.release(a);
    assert_eq!(table.elements::<i16>(b).unwrap(), vec![4]);
}

#[test]
fn test_embedding_transfers_ownership() {
    let mut t = Tester::new("embedding");
    let table = t.symbols_mut();
    let list = table.alloc_compound();
    let child = table.scalar_from(1.5f64);
    let inner = table.push_member(list, Some("x"), child).unwrap();
    assert_eq!(inner, child);
    assert!(!table.is_free_temp(child));
    assert_eq!(table.state(child).unwrap(), TempState::Embedded(list));
    assert_eq!(table.member(list, "x").unwrap(), Some(child));
    assert_eq!(table.member(list, "y").unwrap(), None);

    // a named value is copied in, the binding stays untouched
    let named = table.scalar_from(2u8);
    let named = table.define("n", named).unwrap();
    let embedded = table.embed(named, list).unwrap();
    assert_ne!(embedded, named);
    assert_eq!(table.binding(named).unwrap(), Binding::Named);

    table.release(list);
    assert!(!table.contains(child));
    assert!(!table.contains(embedded));
    assert!(table.contains(named));
}

#[test]
fn test_release_of_held_element_is_ignored() {
    let mut t = Tester::new("release held element");
    let list = t.symbols_mut().alloc_compound();
    let x = t.scalar(4i32);
    let owned = t.symbols_mut().push_member(list, Some("a"), x).unwrap();
    t.symbols_mut().release(owned);
    assert!(t.symbols().contains(owned));
    assert_eq!(t.symbols().member(list, "a").unwrap(), Some(owned));

    t.extract(list, &[SubscriptArg::Index(0)], Modifiers::default())
        .expect_ok()
        .assert_is_not(owned)
        .assert_elements(&[4i32]);
    let copy = t.symbols_mut().copy(list).unwrap();
    let copied = t.symbols().members(copy).unwrap()[0].value;
    t.value(copied).assert_elements(&[4i32]);

    // the compound still takes its element along
    t.symbols_mut().release(list);
    assert!(!t.symbols().contains(owned));
}

#[test]
fn test_embedding_an_ancestor_copies() {
    let mut t = Tester::new("embedding cycle");
    let table = t.symbols_mut();
    let outer = table.alloc_compound();
    let inner = table.alloc_compound();
    table.embed(inner, outer).unwrap();
    let copied = table.embed(outer, inner).unwrap();
    assert_ne!(copied, outer);
    table.release(outer);
    assert_eq!(table.live_symbols(), 0);
}

#[test]
fn test_define_moves_free_temps() {
    let mut t = Tester::new("define");
    let a = t.array(&[3], &[1i32, 2, 3]);
    let table = t.symbols_mut();
    let before = table.live_symbols();
    let x = table.define("x", a).unwrap();
    assert_eq!(table.live_symbols(), before);
    assert!(!table.contains(a));
    assert_eq!(table.lookup("x"), Some(x));
    assert_eq!(table.binding(x).unwrap(), Binding::Named);
    assert!(!table.is_free_temp(x));

    // binding a named value copies it
    let y = table.define("y", x).unwrap();
    assert_ne!(x, y);
    assert_eq!(table.elements::<i32>(y).unwrap(), vec![1, 2, 3]);

    // rebinding keeps the handle and replaces the value
    let b = table.scalar_from(9u8);
    let again = table.define("x", b).unwrap();
    assert_eq!(again, x);
    assert_eq!(table.type_of(x).unwrap(), TypeTag::Byte);

    assert!(table.undefine("x"));
    assert!(!table.undefine("x"));
    assert_eq!(table.lookup("x"), None);
}

#[test]
fn test_copy_is_deep() {
    let mut t = Tester::new("deep copy");
    let table = t.symbols_mut();
    let list = table.alloc_compound();
    let child = table.array_from(&[2], &[5i64, 6]).unwrap();
    table.embed(child, list).unwrap();
    let copy = table.copy(list).unwrap();
    let copied_child = table.members(copy).unwrap()[0].value;
    assert_ne!(copied_child, child);
    assert_eq!(table.state(copied_child).unwrap(), TempState::Embedded(copy));
    assert_eq!(table.elements::<i64>(copied_child).unwrap(), vec![5, 6]);
}

#[test]
fn test_redim_round_trip() {
    let mut t = Tester::new("redim round trip");
    let data = (0..12).map(|v| v as f32 * 0.5).collect::<Vec<_>>();
    let a = t.array(&[12], &data);
    let table = t.symbols_mut();
    let original = match table.value(a).unwrap() {
        Value::Array(v) => v.data().to_vec(),
        other => panic!("unexpected {:?}", other),
    };
    table.redim(a, &[3, 4]).unwrap();
    assert_eq!(table.dims(a).unwrap(), vec![3, 4]);
    table.redim(a, &[12]).unwrap();
    match table.value(a).unwrap() {
        Value::Array(v) => assert_eq!(v.data(), original.as_slice()),
        other => panic!("unexpected {:?}", other),
    }

    table.redim(a, &[2, 2]).unwrap();
    assert_eq!(table.elements::<f32>(a).unwrap(), vec![0.0, 0.5, 1.0, 1.5]);
    assert_eq!(
        table.redim(a, &[5]),
        Err(CoreError::SizeTooLarge { requested: 5, available: 4 })
    );
    let s = table.alloc_string(b"abc");
    assert!(matches!(table.redim(s, &[3]), Err(CoreError::WrongKind { .. })));
}

#[test]
fn test_allocation_limits() {
    let config = CoreConfig { max_elements: 100, max_dims: 3, ..Default::default() };
    let mut t = Tester::new_with_config("allocation limits", config);
    let table = t.symbols_mut();
    assert!(matches!(table.alloc_array(TypeTag::Byte, &[]), Err(CoreError::InvalidDims { .. })));
    assert!(matches!(table.alloc_array(TypeTag::Byte, &[3, 0]), Err(CoreError::InvalidDims { .. })));
    assert!(matches!(table.alloc_array(TypeTag::Byte, &[1, 1, 1, 1]), Err(CoreError::InvalidDims { .. })));
    assert_eq!(
        table.alloc_array(TypeTag::Float64, &[10, 11]),
        Err(CoreError::AllocationFailed { elements: 110 })
    );
    assert!(matches!(
        table.alloc_array(TypeTag::StringScalar, &[2]),
        Err(CoreError::UnsupportedType { .. })
    ));
    assert!(matches!(
        table.array_from(&[3], &[1u8, 2]),
        Err(CoreError::InvalidDims { .. })
    ));
    assert_eq!(table.live_symbols(), 0);
}

#[test]
fn test_clone_shape() {
    let mut t = Tester::new("clone shape");
    let a = t.array(&[2, 3], &[1u8; 6]);
    let table = t.symbols_mut();
    let b = table.clone_shape(a, TypeTag::ComplexDouble).unwrap();
    assert_eq!(table.dims(b).unwrap(), vec![2, 3]);
    assert_eq!(table.type_of(b).unwrap(), TypeTag::ComplexDouble);
    let s = table.clone_shape(a, TypeTag::StringArray).unwrap();
    assert_eq!(table.type_of(s).unwrap(), TypeTag::StringArray);
    let r = table.alloc_range(RangeSpec::new(0, 2));
    assert!(matches!(table.clone_shape(r, TypeTag::Byte), Err(CoreError::WrongKind { .. })));
}

#[test]
fn test_end_statement_reclaims_free_temps() {
    let mut t = Tester::new("end statement");
    let x = t.named("x", &[2], &[1i32, 2]);
    let free = t.array(&[2], &[3i32, 4]);
    let kept = t.array(&[2], &[5i32, 6]);
    let list = t.symbols_mut().alloc_compound();
    let child = t.scalar(1u8);
    t.symbols_mut().embed(child, list).unwrap();
    t.symbols_mut().protect(kept).unwrap();

    // the free array and the compound go, the compound takes its element along
    assert_eq!(t.session_mut().end_statement(), 2);
    let table = t.symbols();
    assert!(table.contains(x));
    assert!(table.contains(kept));
    assert!(!table.contains(free));
    assert!(!table.contains(list));
    assert!(!table.contains(child));
}

#[test]
fn test_simple_session() {
    let mut session = Session::new_simple();
    let a = session.symbols_mut().scalar_from(1u8);
    assert!(session.symbols().is_free_temp(a));
    assert_eq!(session.end_statement(), 1);
    assert!(!session.symbols().contains(a));
}
