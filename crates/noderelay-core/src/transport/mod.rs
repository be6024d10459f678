//! Transport between the engine and the runtime process.

mod client;
mod protocol;

pub use client::{HttpTransport, Transport};
pub use protocol::{InvocationReply, InvocationWire, RemoteError};
