pub mod batch_run;
pub mod checkpoint;
pub mod content_type;
pub mod loaders;
pub mod report;
pub mod work_item;

pub use batch_run::{BatchConfig, BatchCounters, BatchRun, MergeSummary, ResumePolicy, RunState};
pub use checkpoint::Checkpoint;
pub use loaders::{inventory_folder, load_work_list};
pub use report::{FailureRecord, ItemOutcome, Report};
pub use work_item::{InputRef, ItemStatus, WorkItem, WorkRecord};
