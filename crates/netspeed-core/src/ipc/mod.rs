//! Unix-socket control channel between the daemon and its clients.

pub mod client;
pub mod server;
pub mod wire;

pub use client::SocketTransport;
pub use server::ControlServer;
pub use wire::{ClientFrame, PROTOCOL_VERSION, ServerFrame};
