//! Configuration module for corvid.
//!
//! Loads typed configuration from `~/.corvid/config.json`.
//! All fields use `serde` for zero-boilerplate deserialization.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub irc: IrcConfig,
}

impl Config {
    /// Load configuration from the default path (`~/.corvid/config.json`).
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the default config directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".corvid")
    }

    /// Write the default config template to disk.
    pub fn write_default_template() -> anyhow::Result<PathBuf> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = serde_json::json!({
            "irc": {
                "host": "irc.libera.chat",
                "port": 6697,
                "ssl": true,
                "nick": "corvid",
                "name": "corvid IRC bot",
                "channels": ["#corvid-test"],
                "prefix": ".",
                "delay": 20
            }
        });

        std::fs::write(&path, serde_json::to_string_pretty(&template)?)?;
        Ok(path)
    }

    /// Validate the configuration, collecting every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let irc = &self.irc;

        if irc.host.trim().is_empty() {
            errors.push("irc.host is empty. Set the server hostname.".into());
        }
        if irc.port == 0 {
            errors.push("irc.port must be between 1 and 65535.".into());
        }
        if !is_valid_nick(&irc.nick) {
            errors.push(format!(
                "irc.nick '{}' is not a valid nickname (no spaces, must not start with a digit, '-', '#' or ':').",
                irc.nick
            ));
        }
        for channel in &irc.channels {
            if !channel.starts_with(['#', '&', '+', '!']) || channel.contains([' ', ',', '\x07']) {
                errors.push(format!("irc.channels entry '{}' is not a channel name.", channel));
            }
        }
        if irc.prefix.is_empty() {
            errors.push("irc.prefix is empty. Commands need a prefix such as '.'.".into());
        }
        if irc.connect_timeout_secs == 0 {
            errors.push("irc.connectTimeoutSecs must be at least 1.".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_valid_nick(nick: &str) -> bool {
    !nick.is_empty()
        && !nick.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '#' | ':'))
        && !nick.contains([' ', '!', '@', ',', '*', '?', '\0', '\r', '\n'])
}

// ── IRC Configuration ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IrcConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub nick: String,
    /// Username; defaults to the nick when unset.
    pub user: Option<String>,
    pub name: String,
    /// Server password, sent as `PASS` during registration.
    pub password: Option<String>,
    /// NickServ password, sent once the server has welcomed us.
    pub identify_password: Option<String>,
    pub channels: Vec<String>,
    pub prefix: String,
    pub delay: ReconnectDelay,
    pub max_retries: Option<u32>,
    pub connect_timeout_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            host: "irc.libera.chat".into(),
            port: 6667,
            ssl: false,
            nick: "corvid".into(),
            user: None,
            name: "corvid IRC bot".into(),
            password: None,
            identify_password: None,
            channels: Vec::new(),
            prefix: ".".into(),
            delay: ReconnectDelay::default(),
            max_retries: None,
            connect_timeout_secs: 30,
        }
    }
}

impl IrcConfig {
    /// The immutable per-session view of this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(
            &self.nick,
            self.user.as_deref().unwrap_or(&self.nick),
            &self.name,
            self.password.clone(),
            self.identify_password.clone(),
            self.channels.iter().cloned(),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How long to wait before reconnecting.
///
/// Any integer number of seconds enables reconnects; any other JSON value
/// (`false`, `null`, `"off"`, `2.5`) disables them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDelay {
    Seconds(u64),
    Disabled,
}

impl Default for ReconnectDelay {
    fn default() -> Self {
        ReconnectDelay::Seconds(20)
    }
}

impl<'de> Deserialize<'de> for ReconnectDelay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value.as_u64() {
            Some(secs) => ReconnectDelay::Seconds(secs),
            None => ReconnectDelay::Disabled,
        })
    }
}

// ── Session Configuration ───────────────────────────────────────────

/// Identity and channel set for one connection. Fixed for the lifetime
/// of a session; reconnects reuse the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub password: Option<String>,
    pub identify_password: Option<String>,
    channels: Vec<String>,
}

impl SessionConfig {
    /// Channels keep their first-seen order; repeats are dropped.
    pub fn new(
        nickname: &str,
        username: &str,
        realname: &str,
        password: Option<String>,
        identify_password: Option<String>,
        channels: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut ordered: Vec<String> = Vec::new();
        for channel in channels {
            if !ordered.iter().any(|c| c.eq_ignore_ascii_case(&channel)) {
                ordered.push(channel);
            }
        }

        Self {
            nickname: nickname.to_owned(),
            username: username.to_owned(),
            realname: realname.to_owned(),
            password: password.filter(|p| !p.is_empty()),
            identify_password: identify_password.filter(|p| !p.is_empty()),
            channels: ordered,
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}
