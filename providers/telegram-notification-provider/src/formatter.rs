use notification_common::{AlertState, OutboundMessage};

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format an outbound alert message as Telegram HTML
pub fn format_telegram_message(message: &OutboundMessage) -> String {
    let header = match message.state {
        Some(AlertState::Firing) => "🚨 <b>Firing</b> 🚨",
        Some(AlertState::Resolved) => "✅ <b>Resolved</b> ✅",
        None => return escape_html(&message.body),
    };

    let mut parts = vec![header.to_string()];
    if !message.subject.is_empty() {
        parts.push(format!("<b>{}</b>", escape_html(&message.subject)));
    }
    parts.push(escape_html(&message.body));
    if let Some(time) = message.time {
        parts.push(format!("<i>{}</i>", time.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn alert(state: Option<AlertState>) -> OutboundMessage {
        OutboundMessage {
            subject: "DiskFull".to_string(),
            body: "usage > 95% on <db-1>".to_string(),
            state,
            time: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single(),
            receptors: vec!["42".to_string()],
        }
    }

    #[test]
    fn test_firing_message_has_header_and_escaped_body() {
        let formatted = format_telegram_message(&alert(Some(AlertState::Firing)));
        assert!(formatted.starts_with("🚨 <b>Firing</b>"));
        assert!(formatted.contains("<b>DiskFull</b>"));
        assert!(formatted.contains("&lt;db-1&gt;"));
        assert!(formatted.contains("2024-01-01 12:00:00 UTC"));
    }

    #[test]
    fn test_resolved_message_header() {
        let formatted = format_telegram_message(&alert(Some(AlertState::Resolved)));
        assert!(formatted.starts_with("✅ <b>Resolved</b>"));
    }

    #[test]
    fn test_resend_is_plain_escaped_text() {
        let formatted = format_telegram_message(&OutboundMessage::resend("firing:a&b:c", "42"));
        assert_eq!(formatted, "firing:a&amp;b:c");
    }
}
