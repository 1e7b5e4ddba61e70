//! # mcp-transport
//!
//! The transport abstraction (C2): a uniform bidirectional message channel
//! with `start`/`send`/`close` plus an event stream standing in for the
//! spec's three callbacks (`onmessage`, `onclose`, `onerror`) — channels
//! are the idiomatic Rust shape for a push-style callback, so `start()`
//! returns a receiver of [`TransportEvent`] rather than taking closures.
//!
//! Also includes the stdio transport (§4.8): the reference, stateless C2
//! implementation used when no session/SSE machinery is needed.

pub mod error;
pub mod stdio;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use stdio::StdioTransport;
pub use traits::{SendOptions, Transport, TransportEvent};
