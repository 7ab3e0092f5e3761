//! Values and callbacks crossing the host boundary, driven only through the
//! public API and the exported C functions.

use plugbridge_core::abi::{
    plugbridge_bool_from_var, plugbridge_bool_to_var, plugbridge_f64_to_var,
    plugbridge_id_from_var, plugbridge_string_id_to_var,
};
use plugbridge_core::completion::plugbridge_run_completion_callback;
use plugbridge_core::{
    Code, DecodeError, HostId, RawVar, RefKind, Var, VarKind,
    block_until_complete, completion_channel, decode_bool, decode_double, decode_int32,
    decode_reference, encode_bool, encode_double, encode_int32, encode_reference, invoke,
    make_callback, make_null, make_undefined,
};
use std::ffi::c_void;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

#[test]
fn test_bool_scenario() {
    let raw = encode_bool(true);
    assert_eq!(raw.kind(), Some(VarKind::Bool));
    assert_eq!(raw.tag(), 2);
    assert_eq!(unsafe { raw.value.as_bool }, 1);
    assert!(decode_bool(raw));
    assert!(!decode_bool(encode_bool(false)));
}

#[test]
fn test_reference_scenario() {
    let raw = encode_reference(RefKind::String, 42);
    assert_eq!(raw.kind(), Some(VarKind::String));
    assert_eq!(unsafe { raw.value.as_id }, 42);
    assert_eq!(decode_reference(raw), 42);
}

#[test]
fn test_scalar_round_trips_at_edges() {
    for v in [i32::MIN, -1, 0, 1, i32::MAX] {
        assert_eq!(decode_int32(encode_int32(v)), v);
    }
    for v in [f64::MIN, -0.0, 0.0, f64::EPSILON, f64::MAX, f64::INFINITY] {
        assert_eq!(decode_double(encode_double(v)).to_bits(), v.to_bits());
    }
    assert!(decode_double(encode_double(f64::NAN)).is_nan());
}

#[test]
fn test_reference_round_trip_every_kind() {
    for kind in RefKind::ALL {
        for id in [0u64, 1, 42, u32::MAX as u64 + 1, u64::MAX] {
            let raw = encode_reference(kind, id);
            assert_eq!(raw.kind(), Some(kind.kind()));
            assert_eq!(decode_reference(raw), id);
        }
    }
}

#[test]
fn test_undefined_and_null_distinct_from_everything() {
    let undefined = make_undefined().tag();
    let null = make_null().tag();
    assert_ne!(undefined, null);

    let others = [
        encode_bool(true).tag(),
        encode_int32(0).tag(),
        encode_double(0.0).tag(),
    ]
    .into_iter()
    .chain(RefKind::ALL.map(|k| encode_reference(k, 0).tag()));
    for tag in others {
        assert_ne!(tag, undefined);
        assert_ne!(tag, null);
    }
}

#[test]
fn test_checked_decode_from_host_bytes() {
    let mut raw = encode_int32(7);
    assert_eq!(Var::from_raw(raw), Ok(Var::Int32(7)));

    raw.kind = 99;
    assert_eq!(Var::from_raw(raw), Err(DecodeError::UnknownKind(99)));

    let var = Var::from_raw(encode_reference(RefKind::Dictionary, 5)).unwrap();
    assert_eq!(var.expect_reference(RefKind::Dictionary), Ok(HostId::new(5)));
    assert!(matches!(
        var.as_bool(),
        Err(DecodeError::KindMismatch {
            expected: VarKind::Bool,
            found: VarKind::Dictionary
        })
    ));
}

#[test]
fn test_var_to_raw_matches_encoders() {
    assert_eq!(RawVar::from(Var::Bool(true)), encode_bool(true));
    assert_eq!(Var::Double(2.5).to_raw(), encode_double(2.5));
    assert_eq!(
        Var::reference(RefKind::Array, HostId::new(9)).to_raw(),
        encode_reference(RefKind::Array, 9)
    );
    assert_eq!(Var::default().to_raw(), make_undefined());
}

#[test]
fn test_c_shims_agree_with_rust() {
    assert_eq!(plugbridge_bool_to_var(true), encode_bool(true));
    assert!(plugbridge_bool_from_var(encode_bool(true)));
    assert_eq!(plugbridge_f64_to_var(1.5), encode_double(1.5));
    assert_eq!(
        plugbridge_id_from_var(plugbridge_string_id_to_var(77)),
        decode_reference(encode_reference(RefKind::String, 77))
    );
}

struct Counter {
    calls: AtomicUsize,
    last: AtomicI32,
}

unsafe extern "C" fn count(user_data: *mut c_void, result: i32) {
    let counter = unsafe { &*(user_data as *const Counter) };
    counter.calls.fetch_add(1, Ordering::SeqCst);
    counter.last.store(result, Ordering::SeqCst);
}

#[test]
fn test_callback_called_exactly_once_with_context_and_result() {
    let counter = Counter {
        calls: AtomicUsize::new(0),
        last: AtomicI32::new(0),
    };
    let ctx = &counter as *const Counter as *mut c_void;

    let cb = make_callback(count, ctx);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    unsafe { invoke(cb, Code::NoAccess.to_i32()) };

    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(counter.last.load(Ordering::SeqCst), -7);
}

#[test]
fn test_host_slot_fires_once() {
    let counter = Counter {
        calls: AtomicUsize::new(0),
        last: AtomicI32::new(0),
    };
    let mut slot = make_callback(count, &counter as *const Counter as *mut c_void);
    for result in [0, -2, -3] {
        unsafe { plugbridge_run_completion_callback(&mut slot, result) };
    }
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(counter.last.load(Ordering::SeqCst), 0);
}

#[test]
fn test_blocking_sentinel_never_calls() {
    let cb = block_until_complete();
    assert!(cb.is_blocking());
    unsafe { invoke(cb, 0) };
}

#[test]
fn test_closure_callback_through_channel() {
    let (cb, rx) = completion_channel("boundary");
    let handle = std::thread::spawn(move || unsafe { cb.invoke(Code::UserCancel.to_i32()) });
    assert_eq!(rx.wait(), Ok(Code::UserCancel));
    handle.join().unwrap();
}

#[test]
fn test_abandoned_callback_resolves_waiter() {
    let (cb, rx) = completion_channel("never-crossed");
    let waiter = std::thread::spawn(move || rx.wait());
    // The host call that would have taken it was rejected
    unsafe { cb.abort() };
    assert_eq!(waiter.join().unwrap(), Ok(Code::Aborted));
}
