//! Heuristic cycle counts used to rank registry entries.

use core::mem;

use crate::args::GemmArgs;
use crate::blocking::{self, TileShape};
use crate::cpu_info::CpuModel;
use crate::util::{iceildiv, round_up};

/// Throughput of the three stages of an interleaved GEMM on one core.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PerformanceParameters {
    pub kernel_macs_cycle: f32,
    pub prepare_bytes_cycle: f32,
    pub merge_bytes_cycle: f32,
}

impl PerformanceParameters {
    pub fn new(kernel_macs_cycle: f32, prepare_bytes_cycle: f32, merge_bytes_cycle: f32) -> PerformanceParameters {
        PerformanceParameters {
            kernel_macs_cycle: kernel_macs_cycle,
            prepare_bytes_cycle: prepare_bytes_cycle,
            merge_bytes_cycle: merge_bytes_cycle,
        }
    }

    /// Scale a baseline by how wide the model's vector units are.
    pub fn for_model(self, model: CpuModel) -> PerformanceParameters {
        let scale = match model {
            CpuModel::Generic => 1.0,
            CpuModel::ArmNeon | CpuModel::X86Fma => 2.0,
            CpuModel::ArmDot | CpuModel::ArmSve => 3.0,
            CpuModel::X86Avx512 => 4.0,
        };
        PerformanceParameters {
            kernel_macs_cycle: self.kernel_macs_cycle * scale,
            prepare_bytes_cycle: self.prepare_bytes_cycle * scale.sqrt(),
            merge_bytes_cycle: self.merge_bytes_cycle * scale.sqrt(),
        }
    }
}

/// Estimated cycles for running `args` through the interleaved pipeline with `tile`.
///
/// Never returns 0, which would read as a forced choice.
pub fn estimate_cycles<TIn, TOut>(args: &GemmArgs, tile: TileShape, params: PerformanceParameters) -> u64 {
    let (inner, outer) = match args.cfg {
        Some(ref cfg) => (cfg.inner_block_size, cfg.outer_block_size),
        None => (0, 0),
    };
    let bs = blocking::plan(tile, args.ci.get_l1_cache_size(), args.ci.get_l2_cache_size(),
                            args.m, args.n, args.k, inner, outer);
    let k_blocks = iceildiv(args.k.max(1), bs.k_block) as u64;

    let groups = (args.batches * args.multis) as u64;
    let m_round = round_up(args.m, tile.out_height) as u64;
    let n_round = round_up(args.n, tile.out_width) as u64;
    let k_total = round_up(args.k, tile.k_unroll) as u64;

    let total_macs = groups * m_round * n_round * k_total;
    let prepare_bytes = groups * m_round * k_total * mem::size_of::<TIn>() as u64;
    let merge_bytes = groups * k_blocks * args.m as u64 * n_round * mem::size_of::<TOut>() as u64;

    let mut cycles = total_macs as f32 / params.kernel_macs_cycle
        + prepare_bytes as f32 / params.prepare_bytes_cycle
        + merge_bytes as f32 / params.merge_bytes_cycle;

    //Only row blocks and batches are shared between threads.
    let parallelism = (iceildiv(args.m, tile.out_height) * args.batches) as f32 * 0.9;
    if parallelism < args.max_threads as f32 {
        cycles *= args.max_threads as f32 / parallelism;
    }

    (cycles as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_info::CpuInfo;
    use std::sync::Arc;

    fn args(m: usize, n: usize, k: usize) -> GemmArgs {
        GemmArgs::new(Arc::new(CpuInfo::new(CpuModel::Generic, 32 * 1024, 512 * 1024)), m, n, k)
    }

    fn tile(oh: usize, ow: usize) -> TileShape {
        TileShape { out_height: oh, out_width: ow, k_unroll: 1, element_size: 4 }
    }

    #[test]
    fn bigger_problems_cost_more() {
        let p = PerformanceParameters::new(8.0, 4.0, 2.0);
        let small = estimate_cycles::<f32, f32>(&args(64, 64, 64), tile(8, 12), p);
        let large = estimate_cycles::<f32, f32>(&args(256, 256, 256), tile(8, 12), p);
        assert!(large > small);
    }

    #[test]
    fn short_problems_prefer_short_tiles() {
        let p = PerformanceParameters::new(8.0, 4.0, 2.0);
        let tall = estimate_cycles::<f32, f32>(&args(4, 256, 256), tile(8, 12), p);
        let short = estimate_cycles::<f32, f32>(&args(4, 256, 256), tile(4, 16), p);
        assert!(short < tall);
    }

    #[test]
    fn missing_parallelism_is_penalised() {
        let p = PerformanceParameters::new(8.0, 4.0, 2.0);
        let one = estimate_cycles::<f32, f32>(&args(8, 512, 512), tile(8, 12), p);
        let many = estimate_cycles::<f32, f32>(&args(8, 512, 512).max_threads(8), tile(8, 12), p);
        assert!(many > one);
    }

    #[test]
    fn estimate_is_never_zero() {
        let p = PerformanceParameters::new(1e9, 1e9, 1e9);
        assert_eq!(estimate_cycles::<f32, f32>(&args(1, 1, 1), tile(8, 12), p), 1);
    }
}
