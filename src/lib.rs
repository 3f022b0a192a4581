//! Type-safe streaming client for motion-capture servers.
//!
//! A capture server publishes each frame as a sequence of tagged binary
//! blocks. This crate decodes those blocks into typed scene descriptions and
//! per-frame data, arbitrates between redundant servers, and hands callers
//! self-contained [`FrameState`] records in the axis convention they choose.
//!
//! # Features
//!
//! - **Redundant links**: several TCP connections and multicast receivers
//!   feed one cache, and every frame number is delivered once
//! - **Pull or push**: poll, block with a timeout, or subscribe to a
//!   rate-limited async stream
//! - **Axis remapping**: any right-handed axis triple, applied to every
//!   spatial value
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mocap_stream::{Client, Direction, ObjectKind};
//! use std::time::Duration;
//!
//! let client = Client::new()?;
//! client.connect_all(["capture-a", "capture-b:801"])?;
//! client.set_request_type(ObjectKind::Forces, true)?;
//! client.set_axis_mapping(Direction::Forward, Direction::Up, Direction::Right)?;
//!
//! for frame in client.wait_frames(Duration::from_secs(1))? {
//!     println!("frame {}: {} force samples", frame.frame_number, frame.forces.len());
//! }
//! # Ok::<(), mocap_stream::StreamError>(())
//! ```
//!
//! ## Async subscription
//!
//! ```rust,no_run
//! use mocap_stream::{Client, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> mocap_stream::Result<()> {
//!     let client = Client::new()?;
//!     client.connect("localhost", 801)?;
//!
//!     let mut frames = client.subscribe(UpdateRate::Max(30));
//!     while let Some(frame) = frames.next().await {
//!         println!("frame {}", frame.frame_number);
//!     }
//!     Ok(())
//! }
//! ```

// Wire format
pub mod codec;
pub mod objects;
pub mod transport;

// Core types and error handling
pub mod axis;
pub mod config;
mod error;
pub mod frame;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Block sources and connection tasks
pub mod connection;
pub mod source;
pub mod sources;
pub mod stream;

// Caller-facing client
pub mod client;

pub use axis::{AxisMapping, AxisMappingError, Direction};
pub use client::Client;
pub use config::ClientConfig;
pub use error::*;
pub use frame::{FramePair, FrameState};
pub use objects::{
    Block, ControlMessage, DynamicObjects, ObjectKind, RequestSet, StaticObjects, StreamMode,
};
pub use types::UpdateRate;
