//! Integration tests for the register bridge core: a response travels from
//! the upstream meter into the store, out to the downstream panel, and over
//! a relay envelope into a second store.

use meterlink_core::{
    Expect, FunctionCode, LivenessPolicy, MasterRef, MasterRegister, NumberFormat, NumericKind,
    PollSource, RegisterStore, ResponseBody, ServeError, SlaveRegister, Transform,
    decode_request, decode_response, encode_request, encode_response, resolve_offset, verify,
};

fn power_source() -> PollSource {
    PollSource {
        unit_addr: 1,
        function: FunctionCode::ReadInputRegisters,
        start_register: 12,
        quantity: 2,
    }
}

fn power_master() -> MasterRegister {
    MasterRegister::new(
        30013,
        Transform::Unpack {
            format: NumberFormat::F32,
            scale: 1.0,
            unit: Some("W".to_string()),
        },
    )
    .with_relay(true)
}

fn panel_slave() -> SlaveRegister {
    SlaveRegister::new(
        FunctionCode::ReadHoldingRegisters,
        14,
        MasterRef::Key(30013),
        Transform::Pack {
            format: NumberFormat::I16,
            scale: 1.0,
            kind: NumericKind::Int,
        },
    )
}

/// Build the meter response by hand the way a device would.
fn meter_response() -> Vec<u8> {
    encode_response(
        1,
        0x04,
        ResponseBody::Values(&[0xc2, 0x2c, 0x92, 0x3c]),
    )
}

#[test]
fn test_poll_then_serve() {
    let mut store = RegisterStore::with_poll_requests(
        vec![power_master()],
        &[power_source()],
        vec![panel_slave()],
        LivenessPolicy::default(),
    )
    .expect("store");

    let request = encode_request(1, 0x04, 12, 2);
    assert_eq!(request.len(), 8);

    let frame = meter_response();
    assert_eq!(frame, vec![0x01, 0x04, 0x04, 0xc2, 0x2c, 0x92, 0x3c, 0x6a, 0x84]);

    let pdu = decode_response(
        &frame,
        Some(Expect {
            unit_addr: 1,
            function: 0x04,
        }),
    )
    .expect("decode");
    let value = store
        .record_response(power_source().key(), &pdu, frame.clone())
        .expect("record")
        .expect("value");
    assert!((value + 43.14).abs() < 0.01);

    // Downstream panel reads holding register 14.
    let downstream = decode_request(&[0x01, 0x03, 0x00, 0x0e, 0x00, 0x01, 0xe5, 0xc9]).unwrap();
    let offset = resolve_offset(downstream.function, downstream.register_addr).unwrap();
    let payload = store.serve(offset, downstream.function).expect("serve");
    let reply = encode_response(
        downstream.unit_addr,
        downstream.function,
        ResponseBody::Passthrough(&payload),
    );

    assert!(verify(&reply).is_ok());
    assert_eq!(&reply[..5], &[0x01, 0x03, 0x02, 0xff, 0xd5]);
}

#[test]
fn test_six_fresh_serves_per_write() {
    let mut store = RegisterStore::with_poll_requests(
        vec![power_master()],
        &[power_source()],
        vec![panel_slave()],
        LivenessPolicy::default(),
    )
    .unwrap();

    let frame = meter_response();
    let pdu = decode_response(&frame, None).unwrap();
    store.record_response(30013, &pdu, frame.clone()).unwrap();

    let served = (0..10)
        .map(|_| store.serve(40015, 0x03))
        .take_while(Result::is_ok)
        .count();
    assert_eq!(served, 6);
    assert!(matches!(
        store.serve(40015, 0x03),
        Err(ServeError::StaleRegister { .. })
    ));
}

#[test]
fn test_relayed_frame_reproduces_master_state() {
    let mut meter_node = RegisterStore::with_poll_requests(
        vec![power_master()],
        &[power_source()],
        Vec::new(),
        LivenessPolicy::default(),
    )
    .unwrap();

    // The panel node has the same master but no poller feeding it.
    let mut panel_node = RegisterStore::new(
        vec![power_master()],
        vec![panel_slave()],
        LivenessPolicy::default(),
    )
    .unwrap();

    let frame = meter_response();
    let pdu = decode_response(&frame, None).unwrap();
    meter_node.record_response(30013, &pdu, frame).unwrap();

    let candidate = meter_node.relay_candidates().pop().expect("candidate");
    let received = decode_response(
        &candidate.frame,
        Some(Expect {
            unit_addr: candidate.source.unit_addr,
            function: candidate.source.function.into(),
        }),
    )
    .unwrap();
    panel_node
        .ingest_response(candidate.source.key(), &received, candidate.frame.clone())
        .unwrap();

    let local = meter_node.master(30013).unwrap();
    let remote = panel_node.master(30013).unwrap();
    assert_eq!(local.raw, remote.raw);
    assert_eq!(local.frame, remote.frame);
    assert_eq!(local.value, remote.value);
    assert_eq!(local.alive, remote.alive);

    assert_eq!(panel_node.serve(40015, 0x03), Ok(vec![0x02, 0xff, 0xd5]));
}
