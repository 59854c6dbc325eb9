//! Protection loop for docward.
//!
//! A [`PollingWatcher`] reports changed paths to an [`EventSink`]. A bounded
//! pool of workers runs [`ProtectionLoop::protect`] on each path: classify
//! the document, look up its canonical version in the warehouse, and put the
//! canonical bytes back if the file has drifted.
//!
//! Every problem on that path degrades to "no protection this round". Only
//! operator registration returns errors.

mod error;
mod guard;
mod policy;
mod pool;
mod register;
mod scan;
mod watcher;

pub use error::{GuardError, GuardResult};
pub use guard::{Protection, ProtectionLoop, RegistrationHook};
pub use policy::{FilenameFilter, ProtectionPolicy, RegistrationPolicy};
pub use pool::{Dispatch, EventKind, EventSink, GuardHandle};
pub use register::{DirectoryReport, RegistrationReport};
pub use watcher::{PollingWatcher, WatcherHandle};
