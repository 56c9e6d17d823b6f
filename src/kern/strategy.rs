use crate::args::{GemmArgs, WeightFormat};
use crate::blocking::{self, BlockSizes};
use crate::cpu_info::CpuInfo;
use crate::matrix::{Matrix, RawMatrixMut, Scalar};

use super::transforms;

/// Fixed-shape description of one kernel family.
///
/// Panels follow one convention throughout: an A panel is `k` major with
/// `out_height` rows per step, a B panel is `k` major with `out_width`
/// columns per step, and the kernel writes `out_height x out_width` tiles
/// row major, one tile per B panel.
pub trait Strategy<TIn: Scalar, TOut: Scalar>: Send + Sync {
    fn name(&self) -> &'static str;
    fn out_height(&self) -> usize;
    fn out_width(&self) -> usize;
    fn k_unroll(&self) -> usize;

    fn weight_format(&self) -> WeightFormat {
        WeightFormat::Unspecified
    }

    /// Interleave rows `y0..ymax`, depth `k0..kmax` of one batch of A.
    fn prepare_a(&self, out: &mut [TIn], a: &Matrix<TIn>, multi: usize, batch: usize,
                 y0: usize, ymax: usize, k0: usize, kmax: usize) {
        transforms::interleave_a(out, a, multi, batch, y0, ymax, k0, kmax, self.out_height(), self.k_unroll());
    }

    /// Interleave columns `x0..xmax`, depth `k0..kmax` of B.
    fn prepare_b(&self, out: &mut [TIn], b: &Matrix<TIn>, multi: usize,
                 x0: usize, xmax: usize, k0: usize, kmax: usize) {
        transforms::interleave_b(out, b, multi, x0, xmax, k0, kmax, self.out_width(), self.k_unroll());
    }

    /// One A panel against `bblocks` consecutive B panels. Overwrites `c_panel`.
    fn kernel(&self, a_panel: &[TIn], b_panel: &[TIn], c_panel: &mut [TOut], bblocks: usize, kern_k: usize);

    /// `C = alpha*tile + beta*C` over rows `y0..ymax` and columns `x0..xmax`.
    ///
    /// Unsafe because `c` aliases the caller's output; the rows must be owned by
    /// the calling workload.
    unsafe fn merge(&self, c: &RawMatrixMut<TOut>, tile: &[TOut], multi: usize, batch: usize,
                    y0: usize, ymax: usize, x0: usize, xmax: usize, alpha: TOut, beta: TOut) {
        transforms::merge(c, tile, multi, batch, y0, ymax, x0, xmax, self.out_height(), self.out_width(), alpha, beta);
    }

    fn block_sizes(&self, ci: &CpuInfo, args: &GemmArgs) -> BlockSizes {
        blocking::block_sizes_for::<TIn, TOut, Self>(self, args, ci)
    }
}
