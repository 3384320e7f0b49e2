use crate::error::Error;
use crate::frame::CallFrame;
use crate::frame::Frame;
use crate::frame::ReturnFrame;
use crate::value::ByteBuf;
use crate::value::PortHandle;
use crate::value::RawPort;
use crate::value::TransferList;
use crate::value::Value;
use crate::value::seal;

#[test]
fn test_call_frame_round_trip() {
    let frame = CallFrame {
        namespace: "fn".to_string(),
        name: "add".to_string(),
        key: 7,
        args: vec![Value::U64(1), Value::U64(2)],
    };

    let value = Frame::Call(frame.clone()).into_value();
    assert_eq!(value.get("name"), Some(&Value::text("add")));
    assert_eq!(value.get("key"), Some(&Value::U64(7)));

    match Frame::classify(value) {
        Some(Frame::Call(decoded)) => {
            assert_eq!(decoded.namespace, "fn");
            assert_eq!(decoded.name, "add");
            assert_eq!(decoded.key, 7);
            assert_eq!(decoded.args, frame.args);
        }
        other => panic!("Expected Call frame, got {:?}", other),
    }
}

#[test]
fn test_return_frame_success_round_trip() {
    let frame = ReturnFrame {
        namespace: "fn".to_string(),
        name: "add".to_string(),
        key: 7,
        outcome: Ok(Value::U64(3)),
    };

    match Frame::classify(Frame::Return(frame).into_value()) {
        Some(Frame::Return(decoded)) => {
            assert_eq!(decoded.key, 7);
            assert_eq!(decoded.outcome, Ok(Value::U64(3)));
        }
        other => panic!("Expected Return frame, got {:?}", other),
    }
}

#[test]
fn test_return_frame_failure_round_trip() {
    let frame = ReturnFrame {
        namespace: "fn".to_string(),
        name: "boom".to_string(),
        key: 1,
        outcome: Err(Value::text("it broke")),
    };

    match Frame::classify(Frame::Return(frame).into_value()) {
        Some(Frame::Return(decoded)) => {
            assert_eq!(decoded.outcome, Err(Value::text("it broke")));
        }
        other => panic!("Expected Return frame, got {:?}", other),
    }
}

#[test]
fn test_classify_ignores_unrelated_traffic() {
    // Scalars and foreign records are not engine frames.
    assert_eq!(Frame::classify(Value::U64(42)), None);
    assert_eq!(Frame::classify(Value::text("hello")), None);

    let foreign = Value::Record(vec![
        ("event".to_string(), Value::text("tick")),
        ("payload".to_string(), Value::U64(1)),
    ]);
    assert_eq!(Frame::classify(foreign), None);

    // Has the correlation header but neither args nor ok.
    let headless = Value::Record(vec![
        ("namespace".to_string(), Value::text("fn")),
        ("name".to_string(), Value::text("add")),
        ("key".to_string(), Value::U64(1)),
    ]);
    assert_eq!(Frame::classify(headless), None);
}

#[test]
fn test_classify_skips_unknown_fields() {
    let value = Value::Record(vec![
        ("namespace".to_string(), Value::text("fn")),
        ("trace".to_string(), Value::text("extra")),
        ("name".to_string(), Value::text("add")),
        ("key".to_string(), Value::U64(3)),
        ("args".to_string(), Value::List(vec![])),
    ]);

    match Frame::classify(value) {
        Some(Frame::Call(call)) => assert_eq!(call.name, "add"),
        other => panic!("Expected Call frame, got {:?}", other),
    }
}

#[test]
fn test_seal_copies_buffers_by_default() {
    let buf = ByteBuf::new(vec![1, 2, 3]);
    let value = Value::Buffer(buf.clone());

    let sealed = seal(&value, &TransferList::new()).unwrap();

    // The sender-side buffer is intact; the sealed one is a fresh allocation.
    assert_eq!(buf.len(), 3);
    let sealed_buf = sealed.as_buffer().unwrap();
    assert!(!sealed_buf.same_buf(&buf));
    assert_eq!(sealed_buf.clone_bytes().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_seal_moves_transferred_buffers() {
    let buf = ByteBuf::new(vec![1, 2, 3]);
    let value = Value::List(vec![Value::Buffer(buf.clone()), Value::U64(9)]);

    let mut transfers = TransferList::new();
    transfers.push_buf(&buf);
    let sealed = seal(&value, &transfers).unwrap();

    // The sender side is emptied by the transfer.
    assert!(buf.is_detached());
    assert_eq!(buf.len(), 0);

    let items = sealed.as_list().unwrap();
    assert_eq!(items[0].as_buffer().unwrap().clone_bytes().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_seal_detached_buffer_fails() {
    let buf = ByteBuf::new(vec![1]);
    buf.detach().unwrap();

    let err = seal(&Value::Buffer(buf), &TransferList::new()).unwrap_err();
    assert_eq!(err, Error::BufferDetached);
}

#[test]
fn test_seal_port_requires_transfer() {
    let (a, _b) = RawPort::pair();
    let port = PortHandle::new(a);

    let err = seal(&Value::Port(port.clone()), &TransferList::new()).unwrap_err();
    assert_eq!(err, Error::PortRequiresTransfer);

    let mut transfers = TransferList::new();
    transfers.push_port(&port);
    let sealed = seal(&Value::Port(port.clone()), &transfers).unwrap();
    assert!(port.is_detached());
    assert!(matches!(sealed, Value::Port(_)));
}

#[test]
fn test_transfer_list_dedups_by_identity() {
    let buf = ByteBuf::new(vec![1]);
    let alias = buf.clone();
    let other = ByteBuf::new(vec![1]);

    let mut transfers = TransferList::new();
    transfers.push_buf(&buf);
    transfers.push_buf(&alias);
    transfers.push_buf(&other);

    assert_eq!(transfers.len(), 2);
    assert!(transfers.contains_buf(&alias));
}

#[test]
fn test_detach_twice_fails() {
    let buf = ByteBuf::new(vec![1, 2]);
    assert_eq!(buf.detach().unwrap(), vec![1, 2]);
    assert_eq!(buf.detach().unwrap_err(), Error::BufferDetached);
}
