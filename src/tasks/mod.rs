pub mod timer;
pub mod watcher;

pub use timer::SettleTimer;
pub use watcher::{MutationBatch, MutationWatcher};
