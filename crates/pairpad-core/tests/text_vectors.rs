//! Envelope and broadcast payload vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use pairpad_core::protocol::command::ClientCommand;
use pairpad_core::protocol::events::{ContentEvent, PresenceEvent};
use pairpad_core::protocol::text::Envelope;

fn load(name: &str) -> String {
    fs::read_to_string(format!("tests/vectors/{name}")).unwrap()
}

#[test]
fn parse_envelope_min() {
    let s = load("envelope_min.json");
    let env = Envelope::parse(&s).unwrap();
    assert_eq!(env.v, 1);
    assert_eq!(env.svc, "sys");
    assert_eq!(env.msg_type, "ping");
    assert!(env.data.is_none());
    assert_eq!(ClientCommand::try_from(&env).unwrap(), ClientCommand::Ping);
}

#[test]
fn parse_envelope_full() {
    let s = load("envelope_full.json");
    let env = Envelope::parse(&s).unwrap();
    assert_eq!(env.kind(), "doc/edit");
    assert_eq!(env.seq, Some(123));
    assert_eq!(env.room.as_deref(), Some("AB12"));
    match ClientCommand::try_from(&env).unwrap() {
        ClientCommand::Edit { content } => assert!(content.starts_with("def two_sum")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn envelope_rejects_unknown_fields() {
    let err = Envelope::parse(r#"{"v":1,"svc":"doc","type":"edit","flagz":1}"#).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn parse_join_sync_content() {
    let ev: ContentEvent = serde_json::from_str(&load("content_join_sync.json")).unwrap();
    assert!(ev.is_join_sync);
    assert_eq!(ev.version, Some(4));
    assert_eq!(ev.timestamp, 1_718_000_000_000);
}

#[test]
fn parse_presence_batch() {
    let ev: PresenceEvent = serde_json::from_str(&load("presence_join.json")).unwrap();
    assert_eq!(ev.sessions.len(), 2);
    assert_eq!(ev.sessions[1].display_name, "Linus");
    assert!(ev.sessions[0].joined_at < ev.sessions[1].joined_at);
}
