pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod protocol;
pub mod source;
pub mod stats;

pub use codec::*;
pub use config::*;
pub use error::*;
pub use metrics::*;
pub use payload::*;
pub use protocol::*;
pub use source::*;
pub use stats::*;
