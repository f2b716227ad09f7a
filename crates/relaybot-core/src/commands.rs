//! Operator command parsing.

use crate::{
    domain::UserId, errors::Error, formatting::escape_html, registry::Credential, Result,
};

pub const HELP_TEXT: &str = "<b>Operator commands</b>\n\
/ban &lt;id&gt; - block a user\n\
/unban &lt;id&gt; - unblock a user\n\
/broadcast &lt;text&gt; - message every user\n\
/clone &lt;token&gt; - start a clone bot\n\
/unclone &lt;token&gt; - stop a clone bot\n\
/clones - list running bots\n\
/stats - user and session counts\n\
/setwelcome &lt;text&gt; - welcome message ({name}, {username})\n\
/setdaily [text] - scheduled broadcast text, empty to reset\n\
\n\
Reply to a relayed message to answer its sender.";

#[derive(Debug)]
pub enum Command {
    Start,
    Help,
    Ban(UserId),
    Unban(UserId),
    Broadcast(String),
    Clone(Credential),
    Unclone(Credential),
    Clones,
    Stats,
    SetWelcome(String),
    SetDaily(Option<String>),
}

impl Command {
    /// Parse an operator message starting with `/`.
    pub fn parse(text: &str) -> Result<Self> {
        let (cmd, rest) = split_command(text);
        let arg = (!rest.is_empty()).then_some(rest);

        let cmd = match (cmd.as_str(), arg) {
            ("start", _) => Command::Start,
            ("help", _) => Command::Help,
            ("ban", arg) => Command::Ban(user_arg(arg, "/ban USER_ID")?),
            ("unban", arg) => Command::Unban(user_arg(arg, "/unban USER_ID")?),
            ("broadcast", Some(text)) => Command::Broadcast(text),
            ("broadcast", None) => return Err(usage("/broadcast Your message here")),
            ("clone", Some(token)) => Command::Clone(token_arg(&token, "/clone BOT_TOKEN")?),
            ("clone", None) => return Err(usage("/clone BOT_TOKEN")),
            ("unclone", Some(token)) => Command::Unclone(token_arg(&token, "/unclone BOT_TOKEN")?),
            ("unclone", None) => return Err(usage("/unclone BOT_TOKEN")),
            ("clones", _) => Command::Clones,
            ("stats", _) => Command::Stats,
            ("setwelcome", Some(text)) => Command::SetWelcome(text),
            ("setwelcome", None) => return Err(usage("/setwelcome Hello {name}!")),
            ("setdaily", arg) => Command::SetDaily(arg),
            (other, _) => {
                return Err(Error::InvalidCommandArgument(format!(
                    "❓ Unknown command /{}. Send /help for the list.",
                    escape_html(other)
                )))
            }
        };
        Ok(cmd)
    }
}

/// Split `/cmd@botname rest` into a lowercased `cmd` and the trimmed rest.
fn split_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn usage(line: &str) -> Error {
    Error::InvalidCommandArgument(format!("⚡ Usage: {line}"))
}

fn user_arg(arg: Option<String>, usage_line: &str) -> Result<UserId> {
    arg.as_deref()
        .and_then(|a| a.split_whitespace().next())
        .and_then(|a| a.parse::<i64>().ok())
        .map(UserId)
        .ok_or_else(|| usage(usage_line))
}

fn token_arg(arg: &str, usage_line: &str) -> Result<Credential> {
    let mut words = arg.split_whitespace();
    match (words.next(), words.next()) {
        (Some(token), None) => Ok(Credential::new(token)),
        _ => Err(usage(usage_line)),
    }
}
