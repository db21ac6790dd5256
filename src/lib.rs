pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::core::{
    reconcile, CollisionPolicy, Direction, FileRecord, Selection, SessionState, SessionStore,
    SyncCycle, SyncPlan, SyncReport,
};
pub use error::{CycleError, PersistenceError, RecordError, RemoteError, TransferError};
