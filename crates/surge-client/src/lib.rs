pub mod client;
pub mod connection;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod subscriber;

pub use client::*;
pub use connection::*;
pub use subscriber::*;
