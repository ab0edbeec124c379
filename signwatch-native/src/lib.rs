//! Native implementations of the `signwatch` seams.
//!
//! - [WebSocketConnector] opens the detection link over `ws://` or `wss://`.
//! - [ImageFileCamera] serves frames from an image on disk.
//! - [ClientConfig] derives the WebSocket and REST endpoints from one server URL.
//! - [Log] installs the tracing subscriber.
mod camera;
mod client;
mod log;
mod websocket;

pub use camera::*;
pub use client::*;
pub use log::*;
pub use websocket::*;

// Re-export the core crate so binaries only need one dependency.
pub use signwatch;
