mod block_walker;
mod parallel_range;
mod spawn;
mod tasks;
mod interleaved;

pub use self::block_walker::{Block, BlockIter, BlockWalker};
pub use self::parallel_range::{split_range, num_windows, padded_workload_count, plan_workloads, row_ranges,
                               RowRange, Workload, WorkloadKind};
pub use self::spawn::SpawnThreads;
pub use self::tasks::{TransformA, PrepareB, MatrixMultiply};
pub use self::interleaved::GemmInterleaved;
