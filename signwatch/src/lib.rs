//! # signwatch: live traffic-sign detection sessions
//!
//! `signwatch` drives the client side of a remote traffic-sign detector.
//! A [LiveSession] owns a camera, a duplex link to the detection backend,
//! a fixed-cadence frame scheduler and an overlay renderer.
//!
//! ## Overview
//!
//! - **Capture**: a [CaptureDevice] produces the most recent frame on demand.
//! - **Link**: a [SessionLink] sends encoded frames and yields [LinkEvent]s.
//! - **Scheduler**: a [FrameScheduler] keeps at most one request in flight.
//! - **Overlay**: an [OverlayRenderer] scales fractional boxes onto a [Surface].
//!
//! The wire protocol carries no correlation id, so results are matched to
//! requests purely by arrival order. Everything here exists to keep that sound.
mod error;
mod model;

pub mod capture;
pub mod link;
pub mod message;
pub mod overlay;
pub mod scheduler;
pub mod session;

pub use capture::{Capture, CaptureDevice, CaptureHandle, CaptureState, Constraints, EncodedFrame, Frame};
pub use error::*;
pub use link::{Connector, Incoming, LinkEvent, SessionLink, SessionState, Transport};
pub use message::{ClientMessage, ServerMessage};
pub use model::*;
pub use overlay::{OverlayRenderer, PixelRect, Raster, Surface};
pub use scheduler::{Cycle, FrameScheduler, SchedulerStats};
pub use session::{LiveSession, Notice, SessionConfig};
