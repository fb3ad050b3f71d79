//! Canned raw frames for the six scenarios in common use across gateway-core
//! and integration tests, so each suite doesn't hand-roll the same byte
//! layouts independently.

use bytes::Bytes;
use canon_protocol::RawFrame;

pub fn family_b_temp_hum(device_id: &str) -> RawFrame {
    RawFrame::new(
        format!("FamilyB/{device_id}/TemHum"),
        Bytes::from_static(&[0x02, 0x8C, 0x09, 0x09, 0x95, 0x0A, 0x1B, 0x29, 0x38, 0x35, 0x35, 0x01, 0x9E, 0x28]),
    )
}

pub fn family_t_rfid_notify(device_id: &str, port: u32, tag: &str, attached: bool) -> RawFrame {
    let action = if attached { 1 } else { 0 };
    let body = format!(
        r#"{{"msg_type":"u_state_changed_notify_req","msg_id":9001,
            "data":[{{"port":{port},"mod_id":"8C090995","u_count":24,
                      "events":[{{"num":17,"tag_code":"{tag}","alarm":0,"action":{action}}}]}}]}}"#
    );
    RawFrame::new(format!("FamilyT/{device_id}/u_state"), Bytes::from(body.into_bytes()))
}
