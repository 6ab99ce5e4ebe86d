//! Rule Store (§4.2) and File Watcher (§4.3): loads, validates, persists,
//! and hot-reloads the YAML rule document.

mod store;
mod watcher;

pub use store::{RuleStore, RuleStoreEvent};
pub use watcher::FileWatcher;
