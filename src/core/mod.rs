pub mod comparator;
pub mod cycle;
pub mod digest;
pub mod engine;
pub mod pruner;
pub mod record;
pub mod remote_tree;
pub mod resolver;
pub mod scanner;
pub mod session;

pub use comparator::{reconcile, DifferingPair, PlanSummary, SyncPlan};
pub use cycle::{CycleConfig, Selection, SyncCycle};
pub use digest::{calculate_hash, hash_file};
pub use engine::{
    CollisionPolicy, Direction, ExecutorConfig, Operation, Outcome, ReportItem, SyncExecutor,
    SyncReport, SyncTargets,
};
pub use record::{EmbeddedMetadata, FileRecord, Location, RecordKey};
pub use remote_tree::{RemoteTree, RemoteTreeReader};
pub use resolver::{resolve_below, resolve_path, FolderMap};
pub use scanner::{FileScanner, LocalScan, ScanConfig};
pub use session::{SessionState, SessionStore};
