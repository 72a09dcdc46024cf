//! The in-page engine: find posts, work out who wrote them, and keep their
//! visibility in line with the blacklist.

pub mod context;
pub mod extractor;
pub mod index;
pub mod locator;
pub mod reconciler;
pub mod selectors;
pub mod stats;

pub use context::{BlacklistContext, ScanSummary};
pub use index::BlacklistIndex;
pub use locator::{locate, PostRecord, ScanRoot};
pub use reconciler::{HiddenCount, Transition, HIDDEN_MARKER, INDICATOR_CLASS};
pub use stats::StatisticsReporter;
