//! corvid-core: the connection engine behind the corvid IRC bot.
//!
//! - [`config`]: Typed configuration loading from JSON
//! - [`irc`]: Line codec, message parsing and command builders
//! - [`origin`]: Who sent a message and where to answer
//! - [`throttle`]: Outbound spacing, loop suppression and sanitizing
//! - [`transport`]: Plain TCP and TLS connections
//! - [`session`]: Handshake, channel joins and the read loop
//! - [`reconnect`]: Restarting sessions after transport loss
//! - [`dispatch`]: Handler registry and fault reporting
//! - [`handlers`]: Built-in handlers
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use corvid_core::config::Config;
//! use corvid_core::dispatch::Dispatcher;
//! use corvid_core::handlers::builtin_registry;
//! use corvid_core::reconnect::Reconnector;
//! use corvid_core::transport::TcpConnector;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let irc = &config.irc;
//!
//! let connector = TcpConnector::new(&irc.host, irc.port, irc.ssl, irc.connect_timeout())?;
//! let dispatcher = Arc::new(Dispatcher::new(builtin_registry(), &irc.prefix));
//!
//! Reconnector::from_config(irc)
//!     .supervise(&connector, dispatcher, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod irc;
pub mod origin;
pub mod reconnect;
pub mod session;
pub mod throttle;
pub mod transport;

pub use error::{IrcError, Result};
