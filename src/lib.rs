pub mod blob;
pub mod cli;
pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod request;
pub mod session;
pub mod stage;
pub mod wire;

pub use blob::TransferControl;
pub use client::{Connection, Execution};
pub use config::SessionConfig;
pub use cursor::RowCursor;
pub use error::{ClientError, ClientResult, ErrorCategory, TransportStatus};
pub use request::{RequestDescriptor, StatementKind};
pub use session::{Holdability, IsolationLevel, Session};

// Test-only printing helper: expands to tprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
