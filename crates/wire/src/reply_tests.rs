// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn ok_reply_round_trips() {
    let reply = Reply::ok(3, Some(serde_json::json!({"apps": []})));
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["type"], "status");
    assert_eq!(json["status"]["status"], 0);
    let back: Reply = serde_json::from_value(json).unwrap();
    assert_eq!(back, reply);
    assert!(back.is_ok());
}

#[test]
fn error_reply_carries_errno_and_message() {
    const EPERM: i32 = 1;
    let reply = Reply::error(5, EPERM, "cross-kind request");
    assert!(!reply.is_ok());
    assert_eq!(reply.seqno(), 5);
}
