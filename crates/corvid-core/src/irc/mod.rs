//! The slice of the IRC wire protocol the bot speaks.
//!
//! Parsing is lenient: a malformed line degrades to fewer params rather
//! than an error, because nothing useful can be done with the error.

pub mod codec;

pub use codec::IrcCodec;

/// CTCP framing byte.
const CTCP_DELIM: char = '\x01';

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw `nick!user@host` or server name, without the leading `:`.
    pub prefix: Option<String>,
    /// Command word or three-digit numeric, upper-cased.
    pub command: String,
    /// Middle params followed by the trailing param, if any.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a single line (without CRLF). Returns `None` for a line with
    /// no command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        // IRCv3 tags are not used by the bot.
        if rest.starts_with('@') {
            rest = rest.split_once(' ').map_or("", |(_, r)| r);
        }
        rest = rest.trim_start_matches(' ');

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = r.trim_start_matches(' ');
            Some(prefix.to_owned())
        } else {
            None
        };

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            let (middle, r) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(middle.to_owned());
            rest = r;
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// The param at `idx`, if present.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }
}

/// Extract the body of a CTCP `ACTION` (`\x01ACTION waves\x01`).
pub fn ctcp_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    inner
        .strip_prefix("ACTION")
        .map(|body| body.strip_prefix(' ').unwrap_or(body))
}

// ── Outgoing commands ───────────────────────────────────────────────

pub fn pass(password: &str) -> String {
    format!("PASS {password}")
}

pub fn nick(nick: &str) -> String {
    format!("NICK {nick}")
}

pub fn user(username: &str, realname: &str) -> String {
    format!("USER {username} 0 * :{realname}")
}

pub fn join(channel: &str) -> String {
    format!("JOIN {channel}")
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{text}")
}

pub fn action(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{CTCP_DELIM}ACTION {text}{CTCP_DELIM}")
}

pub fn pong(token: &str) -> String {
    format!("PONG :{token}")
}

pub fn quit(reason: &str) -> String {
    format!("QUIT :{reason}")
}
