//! Drives the router's raw-TCP transport the way a real WAMP peer would: a
//! plain socket doing the 4-byte handshake and frame-at-a-time JSON messages,
//! with no access to the crate's internal message types.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde_json::{json, Value as Json};

use wamp_router::Router;

fn handshake(stream: &mut TcpStream) {
    // high nibble 0xF: "any max length"; low nibble 1: JSON serializer.
    stream.write_all(&[0x7F, 0xF1, 0, 0]).unwrap();
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(reply[0], 0x7F, "bad magic byte in handshake reply");
    assert_eq!(reply[1] & 0x0F, 1, "router did not accept JSON serializer");
}

fn send(stream: &mut TcpStream, message: Json) {
    let payload = message.to_string();
    stream.write_u8(0).unwrap(); // regular frame
    stream
        .write_u24::<BigEndian>(payload.len() as u32)
        .unwrap();
    stream.write_all(payload.as_bytes()).unwrap();
    stream.flush().unwrap();
}

fn recv(stream: &mut TcpStream) -> Json {
    let kind = stream.read_u8().unwrap();
    assert_eq!(kind, 0, "expected a regular frame");
    let len = stream.read_u24::<BigEndian>().unwrap();
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).unwrap();
    serde_json::from_slice(&payload).unwrap()
}

fn connect(addr: &str, realm: &str) -> TcpStream {
    connect_as(addr, realm, json!({}))
}

fn connect_as(addr: &str, realm: &str, hello_details: Json) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    handshake(&mut stream);
    send(&mut stream, json!([1, realm, hello_details]));
    let welcome = recv(&mut stream);
    assert_eq!(welcome[0], 2, "expected WELCOME, got {:?}", welcome);
    stream
}

fn start_router(realm: &str, port: u16) -> String {
    let mut router = Router::new();
    router.add_realm(realm);
    let addr = format!("127.0.0.1:{}", port);
    router
        .listen_tcp(&addr)
        .expect("failed to bind raw-TCP listener");
    // leak the router: the listener thread keeps the test process alive for
    // the duration of the test regardless.
    std::mem::forget(router);
    addr
}

#[test]
fn hello_subscribe_publish_and_acknowledge() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.pubsub", 18181);

    let mut s1 = connect(&addr, "test.pubsub");
    let mut s2 = connect(&addr, "test.pubsub");

    send(&mut s1, json!([32, 100, {}, "a.b"]));
    let subscribed = recv(&mut s1);
    assert_eq!(subscribed[0], 33);
    assert_eq!(subscribed[1], 100);
    let sub_id = subscribed[2].as_u64().unwrap();

    // Plain publish: the subscriber gets an EVENT, the publisher gets nothing.
    send(&mut s2, json!([16, 200, {}, "a.b", ["x"]]));
    let event = recv(&mut s1);
    assert_eq!(event[0], 36);
    assert_eq!(event[1].as_u64().unwrap(), sub_id);
    assert_eq!(event[4], json!(["x"]));

    // Publisher exclusion: s2 is not subscribed, so there is nothing to
    // distinguish here directly, but an acknowledged publish must answer s2
    // and must not re-deliver to s1 twice.
    send(&mut s2, json!([16, 201, {"acknowledge": true}, "a.b", ["y"]]));
    let published = recv(&mut s2);
    assert_eq!(published[0], 17);
    assert_eq!(published[1], 201);
    let event2 = recv(&mut s1);
    assert_eq!(event2[0], 36);
    assert_eq!(event2[4], json!(["y"]));
}

#[test]
fn publisher_does_not_receive_its_own_event() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.exclusion", 18182);

    let mut s1 = connect(&addr, "test.exclusion");

    send(&mut s1, json!([32, 1, {}, "a.b"]));
    let subscribed = recv(&mut s1);
    assert_eq!(subscribed[0], 33);

    send(&mut s1, json!([16, 2, {"acknowledge": true}, "a.b", ["x"]]));
    let published = recv(&mut s1);
    assert_eq!(published[0], 17, "publisher should see PUBLISHED, not EVENT");
}

#[test]
fn register_call_and_yield_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.rpc", 18183);

    let mut s1 = connect(&addr, "test.rpc");
    let mut s2 = connect(&addr, "test.rpc");

    send(&mut s1, json!([64, 300, {}, "p.q"]));
    let registered = recv(&mut s1);
    assert_eq!(registered[0], 65);
    assert_eq!(registered[1], 300);

    send(&mut s2, json!([48, 400, {}, "p.q", [1, 2]]));
    let invocation = recv(&mut s1);
    assert_eq!(invocation[0], 68);
    let invocation_id = invocation[1].as_u64().unwrap();
    assert_eq!(invocation[3], json!([1, 2]));

    send(&mut s1, json!([70, invocation_id, {}, [3]]));
    let result = recv(&mut s2);
    assert_eq!(result[0], 50);
    assert_eq!(result[1], 400);
    assert_eq!(result[3], json!([3]));
}

#[test]
fn provider_disconnect_mid_call_errors_the_caller() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.disconnect", 18184);

    let mut s1 = connect(&addr, "test.disconnect");
    let mut s2 = connect(&addr, "test.disconnect");

    send(&mut s1, json!([64, 300, {}, "p.q"]));
    let registered = recv(&mut s1);
    assert_eq!(registered[0], 65);

    send(&mut s2, json!([48, 400, {}, "p.q", []]));
    let invocation = recv(&mut s1);
    assert_eq!(invocation[0], 68);

    // The provider vanishes before yielding.
    drop(s1);

    let error = recv(&mut s2);
    assert_eq!(error[0], 8);
    assert_eq!(error[1], 48);
    assert_eq!(error[2], 400);
    assert_eq!(error[4], "wamp.error.no_such_procedure");
}

#[test]
fn disclose_me_reveals_the_caller_to_the_callee() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.disclose", 18186);

    let mut s1 = connect(&addr, "test.disclose");
    let mut s2 = connect_as(&addr, "test.disclose", json!({"authid": "alice"}));

    send(&mut s1, json!([64, 300, {}, "p.q"]));
    let registered = recv(&mut s1);
    assert_eq!(registered[0], 65);

    send(&mut s2, json!([48, 400, {"disclose_me": true}, "p.q", []]));
    let invocation = recv(&mut s1);
    assert_eq!(invocation[0], 68);
    let details = &invocation[2];
    assert_eq!(details["caller_authid"], json!("alice"));
    assert!(details["caller"].is_u64());
}

#[test]
fn call_without_disclose_me_reveals_nothing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.no_disclose", 18187);

    let mut s1 = connect(&addr, "test.no_disclose");
    let mut s2 = connect_as(&addr, "test.no_disclose", json!({"authid": "alice"}));

    send(&mut s1, json!([64, 300, {}, "p.q"]));
    let registered = recv(&mut s1);
    assert_eq!(registered[0], 65);

    send(&mut s2, json!([48, 400, {}, "p.q", []]));
    let invocation = recv(&mut s1);
    assert_eq!(invocation[0], 68);
    let details = &invocation[2];
    assert!(details.get("caller").is_none());
    assert!(details.get("caller_authid").is_none());
}

#[test]
fn unsupported_message_kind_gets_an_error_reply() {
    let _ = env_logger::builder().is_test(true).try_init();
    let addr = start_router("test.unsupported", 18185);

    let mut s1 = connect(&addr, "test.unsupported");
    send(&mut s1, json!([999, 42, {}]));
    let error = recv(&mut s1);
    assert_eq!(error[0], 8);
    assert_eq!(error[4], "wamp.error.unsupported");
}
