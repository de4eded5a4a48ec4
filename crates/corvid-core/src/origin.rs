//! Who sent a message, and where the bot should answer.

/// Sender identity plus reply target for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Origin {
    pub nick: String,
    pub user: String,
    pub host: String,
    /// Reply target: the sender's nick for a private message, the channel
    /// otherwise. `None` when the message carried no target.
    pub sender: Option<String>,
}

impl Origin {
    /// Build an origin from the raw `nick!user@host` source and the
    /// argument list `[command, target, ...]` of the inbound line.
    ///
    /// Missing segments become empty strings; this never fails.
    pub fn new(bot_nick: &str, source: Option<&str>, args: &[String]) -> Self {
        let (nick, user, host) = split_source(source.unwrap_or(""));

        let sender = args.get(1).map(|target| {
            if target.eq_ignore_ascii_case(bot_nick) {
                nick.clone()
            } else {
                target.clone()
            }
        });

        Self {
            nick,
            user,
            host,
            sender,
        }
    }

    /// Whether the message was addressed to the bot directly.
    pub fn is_private(&self) -> bool {
        self.sender.as_deref() == Some(self.nick.as_str()) && !self.nick.is_empty()
    }
}

/// Split `nick[!user][@host]`. The first `!` ends the nick, the first
/// following `@` starts the host.
fn split_source(source: &str) -> (String, String, String) {
    #[derive(Copy, Clone, PartialEq, Eq)]
    enum Part {
        Nick,
        User,
        Host,
    }

    let mut nick = String::new();
    let mut user = String::new();
    let mut host = String::new();
    let mut part = Part::Nick;

    for c in source.chars() {
        match c {
            '!' if part == Part::Nick => part = Part::User,
            '@' if part != Part::Host => part = Part::Host,
            _ => match part {
                Part::Nick => nick.push(c),
                Part::User => user.push(c),
                Part::Host => host.push(c),
            },
        }
    }

    (nick, user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_channel_message() {
        let origin = Origin::new("corvid", Some("nick!user@host"), &args(&["PRIVMSG", "#chan"]));
        assert_eq!(origin.nick, "nick");
        assert_eq!(origin.user, "user");
        assert_eq!(origin.host, "host");
        assert_eq!(origin.sender.as_deref(), Some("#chan"));
        assert!(!origin.is_private());
    }

    #[test]
    fn test_private_message_replies_to_nick() {
        let origin = Origin::new("corvid", Some("nick!user@host"), &args(&["PRIVMSG", "corvid"]));
        assert_eq!(origin.sender.as_deref(), Some("nick"));
        assert!(origin.is_private());
    }

    #[test]
    fn test_bot_nick_compared_case_insensitively() {
        let origin = Origin::new("Corvid", Some("nick!u@h"), &args(&["PRIVMSG", "corvid"]));
        assert_eq!(origin.sender.as_deref(), Some("nick"));
    }

    #[test]
    fn test_missing_segments() {
        let origin = Origin::new("corvid", Some("nick"), &args(&["PRIVMSG", "#c"]));
        assert_eq!((origin.nick.as_str(), origin.user.as_str(), origin.host.as_str()), ("nick", "", ""));

        let origin = Origin::new("corvid", Some("nick@host"), &args(&["PRIVMSG", "#c"]));
        assert_eq!(origin.nick, "nick");
        assert_eq!(origin.user, "");
        assert_eq!(origin.host, "host");
    }

    #[test]
    fn test_no_source_and_no_target() {
        let origin = Origin::new("corvid", None, &args(&["PRIVMSG"]));
        assert_eq!(origin.nick, "");
        assert!(origin.sender.is_none());

        let origin = Origin::new("corvid", Some("!@"), &[]);
        assert_eq!(origin, Origin::default());
    }
}
