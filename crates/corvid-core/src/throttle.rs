//! Outbound throttle: spacing, loop suppression and sanitization.
//!
//! Every line the bot writes goes through one [`Throttle`]. Messages
//! (`PRIVMSG`) are spaced out and checked against a short send history;
//! protocol commands go through [`Throttle::send_raw`] under the same lock
//! so lines never interleave.
//!
//! The spacing wait happens while the caller awaits `msg`, with the lock
//! held. A handler that sends therefore stalls the read loop for that long,
//! which keeps replies in the order they were produced.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::IrcError;
use crate::irc;

/// Entries kept in the send history.
pub const HISTORY_LIMIT: usize = 10;
/// Text sent in place of a message that is looping.
pub const PLACEHOLDER: &str = "...";
/// Longest message body written to the wire, in bytes.
pub const MAX_TEXT_BYTES: usize = 512;

const LOOP_WINDOW: usize = 8;
const LOOP_REPEATS: usize = 5;
const PLACEHOLDER_REPEATS: usize = 3;

const IDLE_RESET: Duration = Duration::from_secs(3);
const BASE_SPACING_SECS: f64 = 0.8;
const FREE_BYTES: usize = 50;
const PENALTY_BYTES_PER_SEC: f64 = 70.0;

type LineSink = Pin<Box<dyn Sink<String, Error = IrcError> + Send>>;

/// What happened to a message handed to the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written as given.
    Sent,
    /// Written, but replaced by [`PLACEHOLDER`] because it was looping.
    Suppressed,
    /// Nothing written: bad recipient or the placeholder itself looped.
    Dropped,
    /// The transport refused the write.
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum OutputKind {
    Privmsg,
    Action,
}

impl OutputKind {
    fn render(self, recipient: &str, text: &str) -> String {
        match self {
            OutputKind::Privmsg => irc::privmsg(recipient, text),
            OutputKind::Action => irc::action(recipient, text),
        }
    }
}

struct Outbox {
    sink: LineSink,
    history: VecDeque<(Instant, String)>,
}

impl Outbox {
    /// How long to hold a message of `len` bytes before writing it.
    fn pending_wait(&self, len: usize, now: Instant) -> Option<Duration> {
        let (last, _) = self.history.back()?;
        let elapsed = now.saturating_duration_since(*last);
        if elapsed >= IDLE_RESET {
            return None;
        }
        spacing_for(len)
            .checked_sub(elapsed)
            .filter(|d| !d.is_zero())
    }

    fn recent_count(&self, text: &str) -> usize {
        self.history
            .iter()
            .rev()
            .take(LOOP_WINDOW)
            .filter(|(_, t)| t == text)
            .count()
    }

    fn record(&mut self, at: Instant, text: String) {
        self.history.push_back((at, text));
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}

/// Minimum spacing after the previous message for a body of `len` bytes:
/// 0.8s plus 1s for every 70 bytes beyond the first 50.
pub fn spacing_for(len: usize) -> Duration {
    let penalty = len.saturating_sub(FREE_BYTES) as f64 / PENALTY_BYTES_PER_SEC;
    Duration::from_secs_f64(BASE_SPACING_SECS + penalty)
}

/// Serializing, rate-limited writer owned by one session.
pub struct Throttle {
    outbox: Mutex<Outbox>,
}

impl Throttle {
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<String, Error = IrcError> + Send + 'static,
    {
        Self {
            outbox: Mutex::new(Outbox {
                sink: Box::pin(sink),
                history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
            }),
        }
    }

    /// Send a `PRIVMSG` to `recipient`.
    pub async fn msg(&self, recipient: &str, text: &str) -> Delivery {
        self.channel_output(OutputKind::Privmsg, recipient, text).await
    }

    /// Send a CTCP `ACTION` ("/me") to `recipient`.
    pub async fn action(&self, recipient: &str, text: &str) -> Delivery {
        self.channel_output(OutputKind::Action, recipient, text).await
    }

    /// Write a protocol command, bypassing spacing and loop checks.
    pub async fn send_raw(&self, line: &str) -> Delivery {
        let mut outbox = self.outbox.lock().await;
        match outbox.sink.send(sanitize(line).into_owned()).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!(error = %e, "Failed to write protocol line");
                Delivery::Failed
            }
        }
    }

    /// Best-effort `QUIT`.
    pub async fn quit(&self, reason: &str) -> Delivery {
        self.send_raw(&irc::quit(reason)).await
    }

    /// Flush and close the underlying sink. Errors are ignored.
    pub async fn close(&self) {
        let mut outbox = self.outbox.lock().await;
        if let Err(e) = outbox.sink.close().await {
            debug!(error = %e, "Closing outbound sink failed");
        }
    }

    /// Snapshot of the send history, oldest first.
    pub async fn history(&self) -> Vec<(Instant, String)> {
        self.outbox.lock().await.history.iter().cloned().collect()
    }

    async fn channel_output(&self, kind: OutputKind, recipient: &str, text: &str) -> Delivery {
        let mut outbox = self.outbox.lock().await;

        let mut text: Cow<'_, str> = if wire_safe(text) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(format!(
                "EncodingError: message contains a NUL byte ({} bytes)",
                text.len()
            ))
        };
        let recipient = sanitize(recipient);
        if recipient.is_empty() || recipient.contains(' ') || !wire_safe(&recipient) {
            debug!(recipient = %recipient, "Dropping message to unusable recipient");
            return Delivery::Dropped;
        }

        if let Some(wait) = outbox.pending_wait(text.len(), Instant::now()) {
            tokio::time::sleep(wait).await;
        }

        let mut delivery = Delivery::Sent;
        if outbox.recent_count(&text) >= LOOP_REPEATS {
            if outbox.recent_count(PLACEHOLDER) >= PLACEHOLDER_REPEATS {
                debug!(recipient = %recipient, "Dropping looping message");
                return Delivery::Dropped;
            }
            warn!(recipient = %recipient, "Suppressing repeated message");
            text = Cow::Borrowed(PLACEHOLDER);
            delivery = Delivery::Suppressed;
        }

        let body = sanitize(&text);
        let line = kind.render(&recipient, truncate_bytes(&body, MAX_TEXT_BYTES));
        if let Err(e) = outbox.sink.send(line).await {
            warn!(error = %e, recipient = %recipient, "Failed to write message");
            return Delivery::Failed;
        }

        outbox.record(Instant::now(), text.into_owned());
        delivery
    }
}

/// The wire encoding is UTF-8 without NUL.
fn wire_safe(s: &str) -> bool {
    !s.contains('\0')
}

/// Remove CR and LF so one call can never produce two protocol lines.
fn sanitize(s: &str) -> Cow<'_, str> {
    if s.contains(['\r', '\n']) {
        Cow::Owned(s.replace(['\r', '\n'], ""))
    } else {
        Cow::Borrowed(s)
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
