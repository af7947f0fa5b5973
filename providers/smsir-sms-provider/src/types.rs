use notification_common::DeliveryState;
use serde::{Deserialize, Serialize};

/// Envelope of every sms.ir response. `status == 1` means success.
#[derive(Debug, Deserialize)]
pub struct SmsirResponse<T> {
    pub status: i32,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendRequest<'a> {
    pub mobiles: &'a [String],
    pub message_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
}

/// Accepted bulk send; `message_ids` follows the order of `mobiles`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendData {
    #[serde(default)]
    pub pack_id: Option<String>,
    #[serde(default)]
    pub message_ids: Vec<i64>,
    #[serde(default)]
    pub cost: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReport {
    pub message_id: i64,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub delivery_state: Option<i32>,
}

/// sms.ir delivery states
pub mod delivery_code {
    pub const DELIVERED: i32 = 1;
    pub const UNDELIVERED: i32 = 2;
    pub const AT_OPERATOR: i32 = 3;
    pub const REJECTED_BY_OPERATOR: i32 = 4;
    pub const AT_TELECOM: i32 = 5;
    pub const CANCELED: i32 = 6;
    pub const BLACKLISTED: i32 = 7;
}

/// Map an sms.ir delivery state onto the shared delivery state.
/// A report without a state is still in flight.
pub fn delivery_state(state: Option<i32>) -> DeliveryState {
    use delivery_code::*;
    match state {
        Some(DELIVERED) => DeliveryState::Delivered,
        Some(UNDELIVERED | REJECTED_BY_OPERATOR | CANCELED | BLACKLISTED) => DeliveryState::Failed,
        // AT_OPERATOR, AT_TELECOM and codes added later are still in flight
        _ => DeliveryState::Pending,
    }
}
