//! Shared state, clocks and messaging
//!
//! Types passed between the scanner and whatever displays its output.

pub mod clock;
pub mod messages;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use messages::{ScanStatus, ScanUpdate};
pub use state::SharedScanState;
