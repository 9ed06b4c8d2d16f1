pub mod cli;
pub mod coordinator;
pub mod report;
pub mod session;

pub use coordinator::*;
pub use report::*;
pub use session::*;
