mod strategy;
mod ukernel;
pub mod transforms;
pub mod perf;
mod list;

pub use self::strategy::Strategy;
pub use self::ukernel::{InterleavedRef, KernelFn};
pub use self::perf::{PerformanceParameters, estimate_cycles};
