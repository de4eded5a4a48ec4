//! Keeps a session alive across transport loss.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{IrcConfig, ReconnectDelay, SessionConfig};
use crate::dispatch::Dispatch;
use crate::error::{IrcError, Result};
use crate::session::Session;
use crate::transport::TransportFactory;

/// Restart policy around [`Session::run`].
///
/// Sessions run one after another, never concurrently. Each restart gets
/// a brand-new session (and with it a fresh throttle) built from the same
/// config.
pub struct Reconnector {
    config: Arc<SessionConfig>,
    delay: ReconnectDelay,
    max_retries: Option<u32>,
}

impl Reconnector {
    pub fn new(config: SessionConfig, delay: ReconnectDelay) -> Self {
        Self {
            config: Arc::new(config),
            delay,
            max_retries: None,
        }
    }

    pub fn from_config(irc: &IrcConfig) -> Self {
        Self::new(irc.session_config(), irc.delay).max_retries(irc.max_retries)
    }

    /// Stop after this many restarts. `None` retries forever.
    pub fn max_retries(mut self, max: Option<u32>) -> Self {
        self.max_retries = max;
        self
    }

    /// Run sessions until reconnecting is disabled, the retry budget is
    /// spent, or `cancel` fires.
    ///
    /// Cancellation always wins: it returns `Err(Interrupted)` straight
    /// away, whether a session is running or we are waiting to restart.
    pub async fn supervise(
        &self,
        factory: &dyn TransportFactory,
        dispatcher: Arc<dyn Dispatch>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut restarts: u32 = 0;

        loop {
            let mut session = Session::new(Arc::clone(&self.config), Arc::clone(&dispatcher));
            let result = session.run(factory, cancel).await;

            match result {
                Err(IrcError::Interrupted) => {
                    info!("Interrupted, stopping supervisor");
                    return Err(IrcError::Interrupted);
                }
                Ok(()) => {
                    warn!(addr = %factory.describe(), was_active = session.was_active(), "Disconnected");
                }
                Err(e) => {
                    warn!(
                        addr = %factory.describe(),
                        was_active = session.was_active(),
                        error = %e,
                        "Connection failed"
                    );
                }
            }

            let ReconnectDelay::Seconds(secs) = self.delay else {
                info!("Reconnecting is disabled, stopping supervisor");
                return Ok(());
            };
            if self.max_retries.is_some_and(|max| restarts >= max) {
                warn!(restarts, "Retry budget spent, stopping supervisor");
                return Ok(());
            }
            restarts += 1;

            warn!(delay_secs = secs, attempt = restarts, "Reconnecting in {} seconds...", secs);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Interrupted while waiting to reconnect");
                    return Err(IrcError::Interrupted);
                }
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
    }
}
