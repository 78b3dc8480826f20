//! Wire protocol and network client.

pub mod client;
pub mod protocol;

pub use client::RpcClient;
pub use protocol::{read_frame, write_frame, MessageType, MAX_FRAME_SIZE};
