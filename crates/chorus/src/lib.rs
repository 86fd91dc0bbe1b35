pub mod client;
pub mod ipc;
pub mod tui;
