//! Runtime kernel selection and an interleaved, multi-threaded GEMM pipeline.
//!
//! A registry per operand type lists candidate kernels; `find_implementation`
//! picks one for the problem and CPU at hand, and `GemmInterleaved` drives it,
//! sharing reshaped blocks of B between worker threads.

#[macro_use]
extern crate log;

pub mod error;
pub mod cpu_info;
pub mod args;
pub mod matrix;
pub mod selection;
pub mod blocking;
pub mod thread_comm;
pub mod kern;
pub mod composables;
pub mod util;

pub use crate::error::{GemmError, Result};
pub use crate::cpu_info::{CpuFeatures, CpuInfo, CpuModel};
pub use crate::args::{GemmArgs, GemmConfig, GemmMethod, OutputStage, WeightFormat};
pub use crate::matrix::{Matrix, Scalar};
pub use crate::selection::{find_implementation, get_compatible_kernels, get_gemm_method,
                           GemmImplementation, GemmImplementationList, KernelDescription, Registry};
pub use crate::blocking::{block_sizes_for, BlockSizes};
pub use crate::thread_comm::{BufferManager, BufferManagerMultipleThreads, BufferManagerSingleThread,
                             BufferState, ThreadInfo, NUM_BUFFERS};
pub use crate::composables::GemmInterleaved;
