//! Block source implementations

pub mod multicast;
pub mod stream;

pub use multicast::MulticastSource;
pub use stream::StreamSource;
