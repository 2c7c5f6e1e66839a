//! Service layer: scheduling, merging and run coordination.

pub mod job_scheduler;
pub mod merge_engine;
pub mod output_filter;
pub mod profile_aggregator;
pub mod run_driver;

pub use job_scheduler::{JobScheduler, SchedulerConfig, SchedulerEvent};
pub use merge_engine::{merge_block_pair, merge_blocks, merge_blocks_with_limit, split_budget};
pub use output_filter::OutputFilter;
pub use profile_aggregator::ProfileAggregator;
pub use run_driver::{RunConfig, RunDriver, RunReport, SkippedProfile};
