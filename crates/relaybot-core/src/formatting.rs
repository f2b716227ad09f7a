//! Small text helpers for Telegram HTML output.

use crate::domain::UserProfile;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Truncate to `max_len` characters, appending `...` when cut.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Substitute `{name}` and `{username}` placeholders of a welcome template.
///
/// The template is operator-authored HTML; substituted values are escaped.
pub fn render_template(template: &str, profile: &UserProfile) -> String {
    let username = profile
        .username
        .as_deref()
        .map(|u| format!("@{u}"))
        .unwrap_or_default();
    template
        .replace("{name}", &escape_html(profile.display_name()))
        .replace("{username}", &escape_html(&username))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::UserId;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<b>&\"</b>"), "&lt;b&gt;&amp;&quot;&lt;/b&gt;");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("héllo", 10), "héllo");
        assert_eq!(truncate_text("héllo", 2), "hé...");
    }

    #[test]
    fn template_substitutes_and_escapes() {
        let mut p = UserProfile::placeholder(UserId(5), Utc::now());
        p.first_name = "<Ann>".to_string();
        p.username = Some("ann".to_string());
        assert_eq!(
            render_template("Hi {name} ({username})", &p),
            "Hi &lt;Ann&gt; (@ann)"
        );
    }
}
