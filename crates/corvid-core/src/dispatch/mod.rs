//! Routing inbound messages to handlers.
//!
//! The session hands every `PRIVMSG` to a [`Dispatch`] implementation.
//! [`Dispatcher`] is the usual one: it walks a [`HandlerRegistry`] in
//! registration order, runs every handler that matches, and turns handler
//! failures into a one-line reply instead of letting them escape.

pub mod registry;
pub mod report;

pub use registry::{handler_fn, FnHandler, Handler, HandlerEntry, HandlerRegistry, MatchResult};
pub use report::{Fault, FALLBACK_REPORT};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error};

use crate::origin::Origin;
use crate::throttle::{Delivery, Throttle};

/// What a handler gets to talk back with, bound to one inbound message.
#[derive(Clone)]
pub struct BotHandle {
    throttle: Arc<Throttle>,
    nick: String,
    origin: Origin,
}

impl BotHandle {
    pub fn new(throttle: Arc<Throttle>, nick: impl Into<String>, origin: Origin) -> Self {
        Self {
            throttle,
            nick: nick.into(),
            origin,
        }
    }

    /// The bot's current nick.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Say `text` wherever the message came from.
    pub async fn say(&self, text: &str) -> Delivery {
        match self.origin.sender.as_deref() {
            Some(target) => self.throttle.msg(target, text).await,
            None => Delivery::Dropped,
        }
    }

    /// Like [`say`](Self::say), addressed to the sender by nick.
    pub async fn reply(&self, text: &str) -> Delivery {
        self.say(&format!("{}: {}", self.origin.nick, text)).await
    }

    /// CTCP `ACTION` to wherever the message came from.
    pub async fn action(&self, text: &str) -> Delivery {
        match self.origin.sender.as_deref() {
            Some(target) => self.throttle.action(target, text).await,
            None => Delivery::Dropped,
        }
    }

    /// Message an arbitrary recipient.
    pub async fn msg(&self, recipient: &str, text: &str) -> Delivery {
        self.throttle.msg(recipient, text).await
    }
}

/// Hook the session calls for every message.
///
/// `args` is `[text, command, target]`, where command is `PRIVMSG` or
/// `ACTION`.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, bot: &BotHandle, args: &[String]);
}

/// Ignores everything.
pub struct NoopDispatch;

#[async_trait]
impl Dispatch for NoopDispatch {
    async fn dispatch(&self, _bot: &BotHandle, _args: &[String]) {}
}

/// Registry-driven dispatcher.
pub struct Dispatcher {
    registry: HandlerRegistry,
    prefix: String,
}

impl Dispatcher {
    /// `prefix` introduces commands, e.g. `"."` for `.ping`.
    pub fn new(registry: HandlerRegistry, prefix: impl Into<String>) -> Self {
        report::install_location_hook();
        Self {
            registry,
            prefix: prefix.into(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    async fn report(&self, bot: &BotHandle, handler: &str, fault: Fault) {
        let report = fault.report(handler);
        error!(handler, fault = ?fault, "Handler failed");

        let Some(target) = bot.origin().sender.as_deref() else {
            return;
        };
        let text = report.as_deref().unwrap_or(FALLBACK_REPORT);
        bot.msg(target, text).await;
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, bot: &BotHandle, args: &[String]) {
        let Some(text) = args.first() else {
            return;
        };

        for entry in self.registry.iter() {
            let Some(matched) = entry.matches(&self.prefix, text) else {
                continue;
            };
            debug!(handler = entry.name(), nick = %bot.origin().nick, "Invoking handler");

            report::take_panic_location();
            let call = entry.handler().handle(bot, bot.origin(), &matched, args);
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.report(bot, entry.name(), Fault::Error(err)).await,
                Err(payload) => {
                    let fault = Fault::from_panic(payload, report::take_panic_location());
                    self.report(bot, entry.name(), fault).await
                }
            }
        }
    }
}
