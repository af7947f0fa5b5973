use notification_common::{AlertState, OutboundMessage};

/// Subject used when the message carries none (resends)
pub const FALLBACK_SUBJECT: &str = "Ekko alert";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Rendered email parts for one alert message
#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn format_email(message: &OutboundMessage) -> EmailContent {
    let subject = match (message.state, message.subject.is_empty()) {
        (_, true) => FALLBACK_SUBJECT.to_string(),
        (Some(AlertState::Firing), false) => format!("[FIRING] {}", message.subject),
        (Some(AlertState::Resolved), false) => format!("[RESOLVED] {}", message.subject),
        (None, false) => message.subject.clone(),
    };

    let mut html = String::new();
    if let Some(state) = message.state {
        let color = match state {
            AlertState::Firing => "#c62828",
            AlertState::Resolved => "#2e7d32",
        };
        html.push_str(&format!(
            "<h2 style=\"color:{}\">{}</h2>",
            color,
            escape_html(&subject)
        ));
    }
    for line in message.body.lines() {
        html.push_str(&format!("<p>{}</p>", escape_html(line)));
    }
    if let Some(time) = message.time {
        html.push_str(&format!(
            "<p><small>{}</small></p>",
            time.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    EmailContent {
        subject,
        text: message.plain_text(),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(state: Option<AlertState>) -> OutboundMessage {
        OutboundMessage {
            subject: "DiskFull".to_string(),
            body: "usage > 95% on <db-1>".to_string(),
            state,
            time: None,
            receptors: vec!["ops@example.com".to_string()],
        }
    }

    #[test]
    fn test_firing_subject_and_escaped_html() {
        let content = format_email(&alert(Some(AlertState::Firing)));
        assert_eq!(content.subject, "[FIRING] DiskFull");
        assert!(content.html.contains("&lt;db-1&gt;"));
        assert!(content.html.contains("#c62828"));
        assert!(content.text.starts_with("[FIRING] DiskFull"));
    }

    #[test]
    fn test_resend_uses_fallback_subject() {
        let content = format_email(&OutboundMessage::resend("firing:a:b", "ops@example.com"));
        assert_eq!(content.subject, FALLBACK_SUBJECT);
        assert_eq!(content.text, "firing:a:b");
        assert_eq!(content.html, "<p>firing:a:b</p>");
    }
}
