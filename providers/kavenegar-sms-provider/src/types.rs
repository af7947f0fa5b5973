use notification_common::DeliveryState;
use serde::Deserialize;

/// Common response envelope of every Kavenegar endpoint
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "return")]
    pub meta: ReturnMeta,
    pub entries: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnMeta {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

/// One accepted SMS in a send response
#[derive(Debug, Clone, Deserialize)]
pub struct SendEntry {
    pub messageid: i64,
    #[serde(default)]
    pub receptor: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub statustext: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusEntry {
    pub messageid: i64,
    pub status: i32,
    #[serde(default)]
    pub statustext: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub remaincredit: i64,
    #[serde(default)]
    pub expiredate: i64,
    #[serde(rename = "type", default)]
    pub account_type: String,
}

/// Kavenegar per-message status codes
pub mod status_code {
    pub const QUEUED: i32 = 1;
    pub const SCHEDULED: i32 = 2;
    pub const SENT_TO_OPERATOR: i32 = 4;
    pub const SENT_TO_OPERATOR_ALT: i32 = 5;
    pub const FAILED: i32 = 6;
    pub const DELIVERED: i32 = 10;
    pub const UNDELIVERED: i32 = 11;
    pub const CANCELED: i32 = 13;
    pub const BLOCKED: i32 = 14;
    pub const INVALID_ID: i32 = 100;
}

/// Map a Kavenegar message status onto the shared delivery state
pub fn delivery_state(status: i32) -> DeliveryState {
    use status_code::*;
    match status {
        DELIVERED => DeliveryState::Delivered,
        FAILED | UNDELIVERED | CANCELED | BLOCKED | INVALID_ID => DeliveryState::Failed,
        _ => DeliveryState::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(delivery_state(10), DeliveryState::Delivered);
        assert_eq!(delivery_state(11), DeliveryState::Failed);
        assert_eq!(delivery_state(6), DeliveryState::Failed);
        assert_eq!(delivery_state(1), DeliveryState::Pending);
        assert_eq!(delivery_state(4), DeliveryState::Pending);
    }

    #[test]
    fn test_send_response_parses() {
        let raw = r#"{"return":{"status":200,"message":"ok"},"entries":[
            {"messageid":8792343,"message":"hi","status":1,"statustext":"queued",
             "sender":"10004346","receptor":"09123456789","date":1356619709,"cost":120}]}"#;
        let parsed: ApiResponse<Vec<SendEntry>> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.meta.status, 200);
        let entries = parsed.entries.unwrap();
        assert_eq!(entries[0].messageid, 8792343);
        assert_eq!(entries[0].receptor, "09123456789");
    }

    #[test]
    fn test_error_response_without_entries_parses() {
        let raw = r#"{"return":{"status":418,"message":"credit not enough"},"entries":null}"#;
        let parsed: ApiResponse<Vec<SendEntry>> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.meta.status, 418);
        assert!(parsed.entries.is_none());

        let raw = r#"{"return":{"status":401,"message":"invalid api key"}}"#;
        let parsed: ApiResponse<Vec<StatusEntry>> = serde_json::from_str(raw).unwrap();
        assert!(parsed.entries.is_none());
    }
}
