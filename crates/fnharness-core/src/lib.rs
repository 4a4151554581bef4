pub mod config;
pub mod error;
pub mod handshake;
pub mod invoke;
pub mod port;
pub mod process;
pub mod report;
pub mod session;

pub use config::HarnessConfig;
pub use error::HarnessError;
pub use session::{FunctionCommand, Interrupt, SessionOutcome, run};
