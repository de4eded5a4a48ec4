//! One connection: handshake, join, and the inbound read loop.
//!
//! A [`Session`] lives for exactly one connection attempt. It owns the
//! read half of the transport and a fresh [`Throttle`] wrapping the write
//! half, so nothing (send history included) survives a reconnect.
//!
//! Lines are handled strictly one at a time: the dispatcher (and every
//! handler it runs) finishes before the next line is read.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::dispatch::{BotHandle, Dispatch};
use crate::error::{IrcError, Result};
use crate::irc::{self, IrcCodec, Message};
use crate::origin::Origin;
use crate::throttle::Throttle;
use crate::transport::TransportFactory;

/// How long a goodbye may take once we decided to leave.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const RPL_WELCOME: &str = "001";
const ERR_NICKNAMEINUSE: &str = "433";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registering,
    Joining,
    Active,
}

pub struct Session {
    config: Arc<SessionConfig>,
    dispatcher: Arc<dyn Dispatch>,
    nick: String,
    state: SessionState,
    was_active: bool,
}

impl Session {
    pub fn new(config: Arc<SessionConfig>, dispatcher: Arc<dyn Dispatch>) -> Self {
        let nick = config.nickname.clone();
        Self {
            config,
            dispatcher,
            nick,
            state: SessionState::Disconnected,
            was_active: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The nick the server currently knows us by.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Whether this session ever finished joining its channels.
    pub fn was_active(&self) -> bool {
        self.was_active
    }

    /// Connect, register and process lines until the transport closes.
    ///
    /// Returns `Ok(())` when the server closed the connection,
    /// `Err(Interrupted)` when `cancel` fired, and any other error for a
    /// transport fault. The session ends `Disconnected` in every case.
    pub async fn run(
        &mut self,
        factory: &dyn TransportFactory,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.state = SessionState::Connecting;
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IrcError::Interrupted),
            result = factory.connect() => result,
        };
        let transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        let (sink, mut lines) = Framed::new(transport, IrcCodec::new()).split();
        let throttle = Arc::new(Throttle::new(sink));
        self.state = SessionState::Registering;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IrcError::Interrupted),
            result = self.drive(&throttle, &mut lines) => result,
        };

        let goodbye = async {
            if matches!(outcome, Err(IrcError::Interrupted)) {
                throttle.quit("Interrupted").await;
            }
            throttle.close().await;
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, goodbye).await.is_err() {
            debug!("Transport did not close within the grace period");
        }

        self.state = SessionState::Disconnected;
        outcome
    }

    async fn drive<S>(&mut self, out: &Arc<Throttle>, lines: &mut S) -> Result<()>
    where
        S: Stream<Item = Result<String>> + Unpin,
    {
        self.register(out).await;

        while let Some(line) = lines.next().await {
            let line = line?;
            self.on_line(out, &line).await;
        }

        info!(state = ?self.state, "Server closed the connection");
        Ok(())
    }

    async fn register(&mut self, out: &Throttle) {
        if let Some(password) = &self.config.password {
            out.send_raw(&irc::pass(password)).await;
        }
        out.send_raw(&irc::nick(&self.nick)).await;
        out.send_raw(&irc::user(&self.config.username, &self.config.realname))
            .await;
        debug!(nick = %self.nick, "Registration sent");
    }

    /// Handle one inbound protocol line.
    pub async fn on_line(&mut self, out: &Arc<Throttle>, line: &str) {
        let Some(msg) = Message::parse(line) else {
            debug!(line, "Ignoring unparseable line");
            return;
        };

        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.last().map(String::as_str).unwrap_or("");
                out.send_raw(&irc::pong(token)).await;
            }
            RPL_WELCOME => self.signed_on(out, &msg).await,
            ERR_NICKNAMEINUSE if self.state == SessionState::Registering => {
                self.nick.push('_');
                warn!(nick = %self.nick, "Nickname in use, retrying");
                out.send_raw(&irc::nick(&self.nick)).await;
            }
            "NICK" => {
                let origin = Origin::new(&self.nick, msg.prefix.as_deref(), &[]);
                match msg.param(0) {
                    Some(new_nick) if origin.nick.eq_ignore_ascii_case(&self.nick) => {
                        info!(old = %self.nick, new = new_nick, "Nick changed");
                        self.nick = new_nick.to_owned();
                    }
                    _ => {}
                }
            }
            "PRIVMSG" => self.on_privmsg(out, &msg).await,
            "ERROR" => {
                warn!(reason = msg.param(0).unwrap_or(""), "Server sent ERROR");
            }
            _ => {}
        }
    }

    async fn signed_on(&mut self, out: &Throttle, msg: &Message) {
        if let Some(nick) = msg.param(0).filter(|n| !n.is_empty() && *n != "*") {
            self.nick = nick.to_owned();
        }
        self.state = SessionState::Joining;
        info!(nick = %self.nick, "Registered with server");

        if let Some(password) = &self.config.identify_password {
            out.send_raw(&irc::privmsg("NickServ", &format!("IDENTIFY {password}")))
                .await;
        }
        for channel in self.config.channels() {
            out.send_raw(&irc::join(channel)).await;
        }

        self.state = SessionState::Active;
        self.was_active = true;
        info!(channels = ?self.config.channels(), "Session active");
    }

    async fn on_privmsg(&mut self, out: &Arc<Throttle>, msg: &Message) {
        let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
            debug!("PRIVMSG without target or text");
            return;
        };

        let (text, command) = match irc::ctcp_action(text) {
            Some(body) => (body, "ACTION"),
            // Other CTCP requests are not answered.
            None if text.starts_with('\x01') => return,
            None => (text, "PRIVMSG"),
        };

        let args = vec![text.to_owned(), command.to_owned(), target.to_owned()];
        let origin = Origin::new(&self.nick, msg.prefix.as_deref(), &args[1..]);
        let bot = BotHandle::new(Arc::clone(out), self.nick.clone(), origin);
        self.dispatcher.dispatch(&bot, &args).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{handler_fn, Dispatcher, HandlerEntry, HandlerRegistry};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use futures::SinkExt;
    use tokio::io::DuplexStream;

    struct DuplexFactory(std::sync::Mutex<Option<DuplexStream>>);

    impl DuplexFactory {
        fn pair() -> (Self, Framed<DuplexStream, IrcCodec>) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            (
                Self(std::sync::Mutex::new(Some(client))),
                Framed::new(server, IrcCodec::new()),
            )
        }
    }

    #[async_trait]
    impl TransportFactory for DuplexFactory {
        async fn connect(&self) -> Result<Transport> {
            let stream = self.0.lock().unwrap().take().ok_or(IrcError::Closed)?;
            Ok(Box::new(stream))
        }

        fn describe(&self) -> String {
            "duplex".into()
        }
    }

    fn test_dispatcher() -> Arc<dyn Dispatch> {
        let mut registry = HandlerRegistry::new();
        registry.register(
            HandlerEntry::new(
                "fail",
                handler_fn(|_bot, _m, _a| async { anyhow::bail!("boom") }),
            )
            .commands(["fail"]),
        );
        registry.register(
            HandlerEntry::new(
                "echo",
                handler_fn(|bot, m, _a| async move {
                    bot.say(m.group(2).unwrap_or("")).await;
                    Ok(())
                }),
            )
            .commands(["echo"]),
        );
        Arc::new(Dispatcher::new(registry, "."))
    }

    fn config(password: Option<&str>, identify: Option<&str>) -> Arc<SessionConfig> {
        Arc::new(SessionConfig::new(
            "corvid",
            "corvid",
            "Corvid",
            password.map(String::from),
            identify.map(String::from),
            ["#a".to_string(), "#b".to_string()],
        ))
    }

    async fn expect(server: &mut Framed<DuplexStream, IrcCodec>, line: &str) {
        let got = server.next().await.expect("stream ended").expect("decode failed");
        assert_eq!(got, line);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session_lifecycle() {
        let (factory, mut server) = DuplexFactory::pair();
        let mut session = Session::new(config(Some("pw"), Some("secret")), test_dispatcher());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(async move {
            let result = session.run(&factory, &cancel).await;
            (session, result)
        });

        expect(&mut server, "PASS pw").await;
        expect(&mut server, "NICK corvid").await;
        expect(&mut server, "USER corvid 0 * :Corvid").await;

        server.send(":srv 001 corvid :Welcome".to_string()).await.unwrap();
        expect(&mut server, "PRIVMSG NickServ :IDENTIFY secret").await;
        expect(&mut server, "JOIN #a").await;
        expect(&mut server, "JOIN #b").await;

        server.send(":alice!a@h PRIVMSG #a :.fail".to_string()).await.unwrap();
        expect(&mut server, "PRIVMSG #a :boom (fail)").await;

        server.send(":alice!a@h PRIVMSG #a :.echo still alive".to_string()).await.unwrap();
        expect(&mut server, "PRIVMSG #a :still alive").await;

        server.send("PING :tok".to_string()).await.unwrap();
        expect(&mut server, "PONG :tok").await;

        drop(server);
        let (session, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert!(session.was_active());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nick_collision_and_private_reply() {
        let (factory, mut server) = DuplexFactory::pair();
        let mut session = Session::new(config(None, None), test_dispatcher());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(async move {
            let result = session.run(&factory, &cancel).await;
            (session, result)
        });

        expect(&mut server, "NICK corvid").await;
        expect(&mut server, "USER corvid 0 * :Corvid").await;

        server.send(":srv 433 * corvid :Nickname is already in use".to_string()).await.unwrap();
        expect(&mut server, "NICK corvid_").await;

        server.send(":srv 001 corvid_ :Welcome".to_string()).await.unwrap();
        expect(&mut server, "JOIN #a").await;
        expect(&mut server, "JOIN #b").await;

        server.send(":bob!b@h PRIVMSG corvid_ :.echo psst".to_string()).await.unwrap();
        expect(&mut server, "PRIVMSG bob :psst").await;

        drop(server);
        let (session, _) = task.await.unwrap();
        assert_eq!(session.nick(), "corvid_");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_sends_quit() {
        let (factory, mut server) = DuplexFactory::pair();
        let mut session = Session::new(config(None, None), test_dispatcher());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let task = tokio::spawn(async move { session.run(&factory, &cancel).await });

        expect(&mut server, "NICK corvid").await;
        expect(&mut server, "USER corvid 0 * :Corvid").await;

        trigger.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(IrcError::Interrupted)));
        expect(&mut server, "QUIT :Interrupted").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_before_welcome() {
        let (factory, mut server) = DuplexFactory::pair();
        let mut session = Session::new(config(None, None), test_dispatcher());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(async move {
            let result = session.run(&factory, &cancel).await;
            (session, result)
        });

        expect(&mut server, "NICK corvid").await;
        expect(&mut server, "USER corvid 0 * :Corvid").await;
        server.send("NOTICE * :*** Looking up your hostname".to_string()).await.unwrap();
        drop(server);

        let (session, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.was_active());
        assert_eq!(session.nick(), "corvid");
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_session_disconnected() {
        let factory = DuplexFactory(std::sync::Mutex::new(None));
        let mut session = Session::new(config(None, None), test_dispatcher());

        let result = session.run(&factory, &CancellationToken::new()).await;
        assert!(matches!(result, Err(IrcError::Closed)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.was_active());
    }

    struct Recorder(std::sync::Mutex<Vec<(Vec<String>, Option<String>)>>);

    #[async_trait]
    impl Dispatch for Recorder {
        async fn dispatch(&self, bot: &BotHandle, args: &[String]) {
            self.0
                .lock()
                .unwrap()
                .push((args.to_vec(), bot.origin().sender.clone()));
        }
    }

    #[tokio::test]
    async fn test_on_line_routing() {
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        let mut session = Session::new(config(None, None), recorder.clone());
        let (tx, _rx) = mpsc::unbounded::<String>();
        let out = Arc::new(Throttle::new(tx.sink_map_err(|_| IrcError::Closed)));

        session.on_line(&out, ":a!u@h PRIVMSG #a :hello").await;
        session.on_line(&out, ":a!u@h PRIVMSG #a :\x01ACTION waves\x01").await;
        session.on_line(&out, ":a!u@h PRIVMSG corvid :\x01VERSION\x01").await;
        session.on_line(&out, ":a!u@h PRIVMSG #a").await;
        session.on_line(&out, "garbage-without-anything-else").await;
        session.on_line(&out, "").await;
        session.on_line(&out, ":corvid!c@h NICK corvid2").await;
        session.on_line(&out, ":a!u@h PRIVMSG corvid2 :hi").await;

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, vec!["hello", "PRIVMSG", "#a"]);
        assert_eq!(seen[0].1.as_deref(), Some("#a"));
        assert_eq!(seen[1].0, vec!["waves", "ACTION", "#a"]);
        assert_eq!(seen[2].1.as_deref(), Some("a"));
        assert_eq!(session.nick(), "corvid2");
    }
}
