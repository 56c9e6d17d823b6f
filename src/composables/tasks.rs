//! The three stages a workload drives: interleave A, reshape B, multiply.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thread_local::ThreadLocal;

use crate::args::GemmArgs;
use crate::blocking::BlockSizes;
use crate::kern::Strategy;
use crate::matrix::{Matrix, PanelBuffer, RawMatrixMut, Scalar};
use crate::util::round_up;

use super::block_walker::{Block, BlockWalker};
use super::parallel_range::RowRange;

/// Depth of `block` once padded to the kernel's unroll.
#[inline(always)]
fn kern_k(block: &Block, k_unroll: usize) -> usize {
    round_up(block.kmax - block.k0, k_unroll)
}

/// Interleaves the rows a workload owns into its slice of transformed A.
pub struct TransformA<TIn: Scalar, TOut: Scalar> {
    strategy: Arc<dyn Strategy<TIn, TOut>>,
    //k_block padded to the unroll: the depth of every stored panel.
    k_stride: usize,
    m_round: usize,
}
impl<TIn: Scalar, TOut: Scalar> TransformA<TIn, TOut> {
    pub fn new(strategy: Arc<dyn Strategy<TIn, TOut>>, bs: &BlockSizes) -> TransformA<TIn, TOut> {
        let k_stride = round_up(bs.k_block, strategy.k_unroll());
        TransformA { strategy: strategy, k_stride: k_stride, m_round: bs.m_round }
    }

    /// `k_block x m_round x batches`, with `k_block` padded to the unroll.
    pub fn buffer_len(&self, args: &GemmArgs) -> usize {
        self.k_stride * self.m_round * args.batches
    }

    #[inline(always)]
    pub fn offset(&self, rows: &RowRange) -> usize {
        (rows.batch * self.m_round + rows.first) * self.k_stride
    }

    /// Unsafe because `buf` is shared: `rows` must belong to the calling workload.
    pub unsafe fn transform(&self, a: &Matrix<TIn>, buf: &PanelBuffer<TIn>, block: &Block, rows: &RowRange) {
        let oh = self.strategy.out_height();
        let len = round_up(rows.last - rows.first, oh) * kern_k(block, self.strategy.k_unroll());
        let out = buf.slice_mut(self.offset(rows), len);
        self.strategy.prepare_a(out, a, block.multi, rows.batch, rows.first, rows.last, block.k0, block.kmax);
    }
}

/// Reshapes one block of B into a panel buffer.
pub struct PrepareB<TIn: Scalar, TOut: Scalar> {
    strategy: Arc<dyn Strategy<TIn, TOut>>,
    walker: BlockWalker,
    x_block: usize,
    k_block: usize,
}
impl<TIn: Scalar, TOut: Scalar> PrepareB<TIn, TOut> {
    pub fn new(strategy: Arc<dyn Strategy<TIn, TOut>>, walker: BlockWalker, bs: &BlockSizes) -> PrepareB<TIn, TOut> {
        PrepareB { strategy: strategy, walker: walker, x_block: bs.x_block, k_block: bs.k_block }
    }

    /// Size of one ring slot: the largest block, in whole panels.
    pub fn slot_len(&self) -> usize {
        round_up(self.x_block, self.strategy.out_width()) * round_up(self.k_block, self.strategy.k_unroll())
    }

    /// Size of `block` once reshaped.
    pub fn block_len(&self, block: &Block) -> usize {
        round_up(block.xmax - block.x0, self.strategy.out_width()) * kern_k(block, self.strategy.k_unroll())
    }

    /// Size of the whole of B reshaped, every multi included.
    pub fn pretransposed_len(&self) -> usize {
        self.walker.iter().map(|b| self.block_len(&b)).sum()
    }

    pub fn transform(&self, b: &Matrix<TIn>, out: &mut [TIn], block: &Block) {
        self.strategy.prepare_b(out, b, block.multi, block.x0, block.xmax, block.k0, block.kmax);
    }

    /// Reshape every block back to back, in walk order.
    pub fn transform_all(&self, b: &Matrix<TIn>, out: &mut [TIn]) {
        let mut off = 0;
        for block in self.walker.iter() {
            let len = self.block_len(&block);
            self.transform(b, &mut out[off..off + len], &block);
            off += len;
        }
    }
}

/// Runs the kernel over a workload's rows for one block and merges into C.
pub struct MatrixMultiply<TIn: Scalar, TOut: Scalar> {
    strategy: Arc<dyn Strategy<TIn, TOut>>,
    bs: BlockSizes,
    alpha: TOut,
    beta: TOut,
    tmp_c: ThreadLocal<RefCell<Vec<TOut>>>,
    kernel_calls: AtomicUsize,
}
impl<TIn: Scalar, TOut: Scalar> MatrixMultiply<TIn, TOut> {
    pub fn new(strategy: Arc<dyn Strategy<TIn, TOut>>, bs: &BlockSizes, alpha: TOut, beta: TOut,
               num_threads: usize) -> MatrixMultiply<TIn, TOut> {
        MatrixMultiply {
            strategy: strategy,
            bs: *bs,
            alpha: alpha,
            beta: beta,
            tmp_c: ThreadLocal::with_capacity(num_threads),
            kernel_calls: AtomicUsize::new(0),
        }
    }

    /// One row of output tiles for a full x-block.
    pub fn tmp_c_len(&self) -> usize {
        round_up(self.bs.x_block, self.strategy.out_width()) * self.strategy.out_height()
    }

    /// Kernel invocations since construction, summed over all threads.
    pub fn kernel_calls(&self) -> usize {
        self.kernel_calls.load(Ordering::Relaxed)
    }

    /// Multiply the workload's interleaved rows by one reshaped B block.
    ///
    /// Unsafe because `a_buf` and `c` are shared: `rows` must belong to the
    /// calling workload and `b_panel` must stay untouched until this returns.
    pub unsafe fn multiply(&self, a_buf: &PanelBuffer<TIn>, a_offset: usize, b_panel: &[TIn],
                           c: &RawMatrixMut<TOut>, block: &Block, rows: &RowRange) {
        let oh = self.strategy.out_height();
        let ow = self.strategy.out_width();
        let kk = kern_k(block, self.strategy.k_unroll());
        let bblocks = round_up(block.xmax - block.x0, ow) / ow;
        let beta = if block.k0 == 0 { self.beta } else { TOut::one() };

        let len = self.tmp_c_len();
        let cell = self.tmp_c.get_or(|| RefCell::new(vec![TOut::zero(); len]));
        let mut tmp = cell.borrow_mut();

        let mut a_off = a_offset;
        let mut y = rows.first;
        while y < rows.last {
            let ymax = ::core::cmp::min(y + oh, rows.last);
            let a_panel = a_buf.slice(a_off, oh * kk);
            self.strategy.kernel(a_panel, b_panel, &mut tmp[..bblocks * oh * ow], bblocks, kk);
            self.kernel_calls.fetch_add(1, Ordering::Relaxed);
            self.strategy.merge(c, &tmp[..], block.multi, rows.batch, y, ymax, block.x0, block.xmax,
                                self.alpha, beta);
            a_off += oh * kk;
            y += oh;
        }
    }
}
