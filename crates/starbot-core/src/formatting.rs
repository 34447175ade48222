//! Small HTML/text helpers for Telegram-bound messages.

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Format an integer amount with thousands separators ("125 000").
pub fn format_amount(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    let len = digits.len();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

/// Display form for a possibly missing username.
pub fn display_name(username: Option<&str>, user_id: i64) -> String {
    match username {
        Some(u) if !u.trim().is_empty() => u.to_string(),
        _ => format!("id:{user_id}"),
    }
}
