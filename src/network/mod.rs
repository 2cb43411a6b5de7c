//! Network layer.
//!
//! Everything below the bot: the transport, the per-connection session
//! state machine, outbound flow control, event dispatch, reconnection and
//! the hot restart handover.

pub mod backoff;
pub mod dispatch;
pub mod restart;
pub mod send_queue;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use backoff::Backoff;
pub use dispatch::{EventDispatcher, HandlerSet, ParamCount};
pub use restart::{SavedNetwork, StateFile};
pub use send_queue::SendQueue;
pub use session::{ConnectionState, NetworkSession};
