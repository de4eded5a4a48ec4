//! One-line diagnostics for handler faults.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Once;

/// Sent when no better report can be formed.
pub const FALLBACK_REPORT: &str = "Got an error.";

/// A caught handler failure.
#[derive(Debug)]
pub enum Fault {
    /// The handler returned `Err`.
    Error(anyhow::Error),
    /// The handler panicked. `message` is the payload if it was a string,
    /// `location` the `file:line` the panic was raised at.
    Panic {
        message: Option<String>,
        location: Option<String>,
    },
}

impl Fault {
    pub fn from_panic(payload: Box<dyn Any + Send>, location: Option<String>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => Some(*s),
            Err(payload) => payload.downcast_ref::<&str>().map(|s| s.to_string()),
        };
        Fault::Panic { message, location }
    }

    /// `"<summary> (<location>)"`, or `None` when there is nothing usable.
    ///
    /// The summary is the innermost error in the chain. The location is the
    /// handler name, qualified by the outermost context when the error was
    /// wrapped on its way up.
    pub fn report(&self, handler: &str) -> Option<String> {
        match self {
            Fault::Error(err) => {
                let summary = first_line(&err.root_cause().to_string())?;
                let location = if err.chain().count() > 1 {
                    format!("{handler}: {}", first_line(&err.to_string())?)
                } else {
                    handler.to_owned()
                };
                Some(format!("{summary} ({location})"))
            }
            Fault::Panic { message, location } => {
                let summary = first_line(message.as_deref()?)?;
                match location {
                    Some(at) => Some(format!("panicked: {summary} ({handler} at {at})")),
                    None => Some(format!("panicked: {summary} ({handler})")),
                }
            }
        }
    }
}

thread_local! {
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

static LOCATION_HOOK: Once = Once::new();

/// Chain a panic hook that remembers where the last panic on this thread
/// happened. The previous hook still runs.
pub(crate) fn install_location_hook() {
    LOCATION_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let at = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()));
            PANIC_LOCATION.with(|slot| *slot.borrow_mut() = at);
            previous(info);
        }));
    });
}

/// Location of the most recent panic on this thread, clearing it.
pub(crate) fn take_panic_location() -> Option<String> {
    PANIC_LOCATION.with(|slot| slot.borrow_mut().take())
}

fn first_line(s: &str) -> Option<String> {
    let line = s.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.to_owned())
}
