//! Handler trait, registration records and the registry that holds them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::BotHandle;
use crate::error::Result;
use crate::origin::Origin;

/// Capture groups of whatever made a handler fire.
///
/// Group 0 is the whole message. For a command match, group 1 is the
/// command name and group 2 the rest of the line (if any); for a pattern
/// match the groups are the regex's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    groups: Vec<Option<String>>,
}

impl MatchResult {
    pub fn new(groups: Vec<Option<String>>) -> Self {
        Self { groups }
    }

    /// Group `idx`, or `None` if it did not participate in the match.
    pub fn group(&self, idx: usize) -> Option<&str> {
        self.groups.get(idx).and_then(|g| g.as_deref())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// A pluggable unit of bot behavior.
///
/// Returning `Err` (or panicking) is reported back to the sender as a
/// one-line diagnostic; it never affects the connection.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        bot: &BotHandle,
        origin: &Origin,
        matched: &MatchResult,
        args: &[String],
    ) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F>(F);

/// Wrap a closure `(bot, matched, args) -> Future<Output = anyhow::Result<()>>`.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(BotHandle, MatchResult, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(BotHandle, MatchResult, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        bot: &BotHandle,
        _origin: &Origin,
        matched: &MatchResult,
        args: &[String],
    ) -> anyhow::Result<()> {
        (self.0)(bot.clone(), matched.clone(), args.to_vec()).await
    }
}

/// One registered handler: what triggers it and what it runs.
pub struct HandlerEntry {
    name: String,
    pattern: Option<Regex>,
    commands: Vec<String>,
    handler: Arc<dyn Handler>,
}

impl HandlerEntry {
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            name: name.into(),
            pattern: None,
            commands: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Fire when `pattern` matches the message text.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Fire when the message is `<prefix><command> ...` for one of these.
    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_names(&self) -> &[String] {
        &self.commands
    }

    pub(crate) fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    /// Test `text` against this entry. Commands take precedence over the
    /// pattern so a handler fires at most once per message.
    pub fn matches(&self, prefix: &str, text: &str) -> Option<MatchResult> {
        if let Some(found) = self.match_command(prefix, text) {
            return Some(found);
        }

        let caps = self.pattern.as_ref()?.captures(text)?;
        Some(MatchResult::new(
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_owned()))
                .collect(),
        ))
    }

    fn match_command(&self, prefix: &str, text: &str) -> Option<MatchResult> {
        if self.commands.is_empty() || prefix.is_empty() {
            return None;
        }
        let rest = text.strip_prefix(prefix)?;
        let (command, argument) = match rest.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, Some(argument.trim())),
            None => (rest, None),
        };
        if !self.commands.iter().any(|c| c == command) {
            return None;
        }

        Some(MatchResult::new(vec![
            Some(text.to_owned()),
            Some(command.to_owned()),
            argument.filter(|a| !a.is_empty()).map(str::to_owned),
        ]))
    }
}

/// Ordered collection of handlers, built once at startup.
pub struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a handler. Dispatch follows registration order.
    pub fn register(&mut self, entry: HandlerEntry) {
        debug!(handler = entry.name(), commands = ?entry.command_names(), "Registered handler");
        self.entries.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerEntry> {
        self.entries.iter()
    }

    /// Names of all registered handlers, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
