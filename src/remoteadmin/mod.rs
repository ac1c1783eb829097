//! Remote administration over WebSocket.
//!
//! Two endpoints share one [`CommandDispatcher`]: the current convention with
//! named parameters, and the legacy positional JSON-RPC convention kept for
//! older clients.
pub mod dispatcher;
pub mod server;
pub mod session;

pub use dispatcher::CommandDispatcher;
pub use server::{AdminServer, Routes};
pub use session::{Convention, FrameReply, Session};
