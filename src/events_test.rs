//! Tests for persisted record encoding

use super::*;

#[test]
fn test_diff_event_wire_format() {
    let event = DiffEvent::new("abc123", "host-17");
    let encoded = serde_json::to_value(&event).unwrap();

    assert_eq!(encoded["sha"], "abc123");
    assert_eq!(encoded["updatedBy"], "host-17");
    // RFC3339 timestamp
    let updated_at = encoded["updatedAt"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(updated_at).is_ok());
}

#[test]
fn test_diff_event_round_trip() {
    let event = DiffEvent::new("def456", "host-9");
    let encoded = serde_json::to_string(&event).unwrap();
    let decoded: DiffEvent = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, event);
}
