//! Self-routing relay cards.
//!
//! The card the operator receives carries the sender's numeric id as a
//! visible `ID: <digits>` line. A reply to that card is routed by scanning the
//! replied-to text for the first such line; no lookup table is kept.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    domain::{UserId, UserProfile},
    formatting::{escape_html, truncate_text},
};

const CARD_MAX_MESSAGE: usize = 1000;

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Tolerates the `<code>` wrapper and Markdown backticks around the digits.
    RE.get_or_init(|| Regex::new(r"\bID:\s*(?:<code>|`)?(\d+)").expect("valid regex"))
}

/// Identity block for `profile` (Telegram HTML).
///
/// The `ID:` line comes first: the decoder takes the first match, so no
/// user-controlled field may precede it.
pub fn encode(profile: &UserProfile) -> String {
    let id = profile.id.0;
    let link = match profile.username.as_deref() {
        Some(u) if !u.is_empty() => format!("@{}", escape_html(u)),
        _ => format!("<a href=\"tg://user?id={id}\">Click Here</a>"),
    };
    format!(
        "🆔 ID: <code>{id}</code>\n📛 Name: {}\n🔗 Profile: {link}",
        escape_html(profile.display_name())
    )
}

/// Full card attached to a forwarded message.
pub fn relay_card(profile: &UserProfile, message_summary: &str) -> String {
    format!(
        "👤 <b>New Message</b>\n\n{}\n💬 Message: {}",
        encode(profile),
        escape_html(&truncate_text(message_summary, CARD_MAX_MESSAGE))
    )
}

/// Recover the sender identity from a card's delivered text.
///
/// First match wins. A first match whose digits do not fit an id yields
/// `None` rather than falling through to a later match.
pub fn decode(text: &str) -> Option<UserId> {
    let caps = id_pattern().captures(text)?;
    caps.get(1)?.as_str().parse::<i64>().ok().map(UserId)
}
