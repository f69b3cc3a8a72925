//! Process-wide tracing setup shared by every mixledger binary and test harness.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ParseLogFormatError};

/// Initialize process-wide tracing with the given output format.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat) {
    self::tracing::init(format);
}
