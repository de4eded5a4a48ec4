//! `.ping [seconds]`: liveness check.
//!
//! With an argument the reply is held back for that many seconds, capped
//! at [`MAX_DELAY`]. The reply names the delay actually waited, so
//! `.ping 600` answers `pong (10s)`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::dispatch::{BotHandle, Handler, HandlerEntry, MatchResult};
use crate::origin::Origin;

/// Longest delay `.ping N` will honor.
pub const MAX_DELAY: Duration = Duration::from_secs(10);

pub struct Ping;

/// Registration record for [`Ping`].
pub fn entry() -> HandlerEntry {
    HandlerEntry::new("ping", Ping).commands(["ping"])
}

#[async_trait]
impl Handler for Ping {
    async fn handle(
        &self,
        bot: &BotHandle,
        _origin: &Origin,
        matched: &MatchResult,
        _args: &[String],
    ) -> anyhow::Result<()> {
        let Some(arg) = matched.group(2) else {
            bot.reply("pong").await;
            return Ok(());
        };

        let secs: u64 = arg
            .parse()
            .with_context(|| format!("parsing delay '{arg}'"))?;
        let delay = Duration::from_secs(secs).min(MAX_DELAY);
        tokio::time::sleep(delay).await;
        bot.reply(&format!("pong ({}s)", delay.as_secs())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatch, Dispatcher, HandlerRegistry};
    use crate::error::IrcError;
    use crate::throttle::Throttle;
    use futures::channel::mpsc;
    use futures::SinkExt;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn setup() -> (Dispatcher, Arc<Throttle>, mpsc::UnboundedReceiver<String>) {
        let mut registry = HandlerRegistry::new();
        registry.register(entry());
        let (tx, rx) = mpsc::unbounded::<String>();
        let throttle = Arc::new(Throttle::new(tx.sink_map_err(|_| IrcError::Closed)));
        (Dispatcher::new(registry, "."), throttle, rx)
    }

    async fn send(dispatcher: &Dispatcher, throttle: &Arc<Throttle>, text: &str) {
        let args: Vec<String> = vec![text.into(), "PRIVMSG".into(), "#c".into()];
        let origin = Origin::new("corvid", Some("alice!a@host"), &args[1..]);
        let bot = BotHandle::new(Arc::clone(throttle), "corvid", origin);
        dispatcher.dispatch(&bot, &args).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_ping() {
        let (dispatcher, throttle, mut rx) = setup();
        send(&dispatcher, &throttle, ".ping").await;
        assert_eq!(rx.try_recv().ok().as_deref(), Some("PRIVMSG #c :alice: pong"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_ping_is_capped() {
        let (dispatcher, throttle, mut rx) = setup();

        let start = Instant::now();
        send(&dispatcher, &throttle, ".ping 2").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(rx.try_recv().ok().as_deref(), Some("PRIVMSG #c :alice: pong (2s)"));

        let start = Instant::now();
        send(&dispatcher, &throttle, ".ping 600").await;
        assert!(start.elapsed() >= MAX_DELAY);
        assert!(start.elapsed() < MAX_DELAY + Duration::from_secs(1));
        assert_eq!(rx.try_recv().ok().as_deref(), Some("PRIVMSG #c :alice: pong (10s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_delay_is_reported() {
        let (dispatcher, throttle, mut rx) = setup();
        send(&dispatcher, &throttle, ".ping soon").await;
        assert_eq!(
            rx.try_recv().ok().as_deref(),
            Some("PRIVMSG #c :invalid digit found in string (ping: parsing delay 'soon')")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_commands_ignored() {
        let (dispatcher, throttle, mut rx) = setup();
        send(&dispatcher, &throttle, ".pingpong").await;
        send(&dispatcher, &throttle, "ping").await;
        assert!(rx.try_recv().is_err());
    }
}
