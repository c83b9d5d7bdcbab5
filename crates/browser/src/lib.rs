//! Chrome DevTools Protocol driver: the core of the browser MCP server.
//!
//! One WebSocket to Chrome carries command replies and unsolicited events.
//! [`client::CdpClient`] correlates replies by message id; [`state::EventDemux`]
//! routes events into bounded caches (console ring, network log, frame
//! contexts, pending dialog). [`driver::BrowserDriver`] is the verb facade the
//! tool layer calls; it owns the Chrome child process when it launched one.

pub mod client;
pub mod console;
pub mod dialogs;
pub mod driver;
pub mod elements;
pub mod eval;
pub mod frames;
pub mod input;
pub mod launch;
pub mod network;
pub mod page;
pub mod state;
pub mod tabs;
pub mod transport;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{CdpClient, CdpError};
pub use console::{ConsoleQuery, ConsoleQueryResult, CountScope, LevelScope, TimeScope, TimeSync};
pub use driver::{BrowserDriver, OpenBrowserOptions, NO_SESSION_ERROR};
pub use state::{ConsoleEntry, NetworkRequestEntry, PendingDialog, SharedState, TabInfo};
