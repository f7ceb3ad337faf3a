//! Data models

pub mod node;
pub mod measurement;
pub mod event;
pub mod channel;
pub mod metrics;

pub use node::*;
pub use measurement::*;
pub use event::*;
pub use channel::*;
pub use metrics::*;
