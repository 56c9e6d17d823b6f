//! Interleaved GEMM pipeline: configure once, run as often as needed.

use core::any::type_name;
use std::sync::Arc;

use crate::args::GemmArgs;
use crate::blocking::BlockSizes;
use crate::error::{GemmError, Result};
use crate::kern::Strategy;
use crate::matrix::{Matrix, PanelBuffer, RawMatrixMut, Scalar};
use crate::selection::{find_implementation, GemmImplementationList, Registry};
use crate::thread_comm::{BufferManager, BufferManagerMultipleThreads, BufferManagerSingleThread, ThreadInfo};

use super::block_walker::{Block, BlockWalker};
use super::parallel_range::{num_windows, padded_workload_count, plan_workloads, row_ranges, RowRange, Workload,
                             WorkloadKind};
use super::spawn::SpawnThreads;
use super::tasks::{MatrixMultiply, PrepareB, TransformA};

/// Everything a workload reads while it runs.
struct PipelineState<TIn: Scalar, TOut: Scalar> {
    m: usize,
    bs: BlockSizes,
    walker: BlockWalker,
    transform_a: TransformA<TIn, TOut>,
    prepare_b: PrepareB<TIn, TOut>,
    matrix_multiply: MatrixMultiply<TIn, TOut>,
    transformed_a: PanelBuffer<TIn>,
    transformed_b: PanelBuffer<TIn>,
    buffer_manager: Box<dyn BufferManager>,
}

impl<TIn: Scalar, TOut: Scalar> PipelineState<TIn, TOut> {
    #[inline(always)]
    fn blocks_per_batch(&self) -> usize {
        self.bs.m_round / self.bs.strategy_out_height
    }

    #[inline(always)]
    fn slot_offset(&self, block: &Block) -> usize {
        (block.index % self.buffer_manager.num_buffers()) * self.prepare_b.slot_len()
    }

    //Caller holds the slot in BeingReshaped.
    unsafe fn reshape(&self, b: &Matrix<TIn>, block: &Block) {
        let out = self.transformed_b.slice_mut(self.slot_offset(block), self.prepare_b.block_len(block));
        self.prepare_b.transform(b, out, block);
    }

    unsafe fn transform_rows(&self, a: &Matrix<TIn>, block: &Block, rows: &[RowRange]) {
        for r in rows {
            self.transform_a.transform(a, &self.transformed_a, block, r);
        }
    }

    unsafe fn multiply_rows(&self, b_panel: &[TIn], c: &RawMatrixMut<TOut>, block: &Block, rows: &[RowRange]) {
        for r in rows {
            self.matrix_multiply.multiply(&self.transformed_a, self.transform_a.offset(r), b_panel, c, block, r);
        }
    }

    fn execute(&self, w: &Workload, a: &Matrix<TIn>, b: &Matrix<TIn>, c: &RawMatrixMut<TOut>, info: &ThreadInfo) {
        let rows = row_ranges(w.start, w.end, self.blocks_per_batch(), self.bs.strategy_out_height, self.m);
        trace!("workload {}/{}: {:?} over iterations {}..{}, {} row ranges",
               info.thread_id(), info.num_threads(), w.kind, w.start, w.end, rows.len());
        unsafe {
            match w.kind {
                WorkloadKind::Pretransposed => self.execute_pretransposed(a, c, &rows),
                WorkloadKind::OnTheFly => self.execute_on_the_fly(a, b, c, &rows, true),
                WorkloadKind::BOnly => self.execute_on_the_fly(a, b, c, &rows, false),
            }
        }
    }

    //B is immutable for the whole run, so no handshake.
    unsafe fn execute_pretransposed(&self, a: &Matrix<TIn>, c: &RawMatrixMut<TOut>, rows: &[RowRange]) {
        let mut b_off = 0;
        for block in self.walker.iter() {
            if block.new_kblock() {
                self.transform_rows(a, &block, rows);
            }
            let len = self.prepare_b.block_len(&block);
            self.multiply_rows(self.transformed_b.slice(b_off, len), c, &block, rows);
            b_off += len;
        }
    }

    unsafe fn execute_on_the_fly(&self, a: &Matrix<TIn>, b: &Matrix<TIn>, c: &RawMatrixMut<TOut>,
                                 rows: &[RowRange], multiply: bool) {
        let bm = &*self.buffer_manager;
        let nb = self.walker.num_blocks();
        //With a single slot there is nothing to reshape ahead into.
        let mut b_next = if bm.num_buffers() == 1 { nb } else { 1 };

        for block in self.walker.iter() {
            if multiply && block.new_kblock() {
                self.transform_rows(a, &block, rows);
            }

            if b_next < nb {
                if bm.try_lock_to_reshape(b_next) {
                    self.reshape(b, &self.walker.block(b_next));
                    bm.mark_as_reshaped(b_next);
                }
                b_next += 1;
            }

            if bm.lock_to_reshape_if_needed(block.index) {
                self.reshape(b, &block);
                bm.mark_as_reshaped(block.index);
            }
            bm.wait_for_reshaping(block.index);

            if multiply {
                let panel = self.transformed_b.slice(self.slot_offset(&block), self.prepare_b.block_len(&block));
                self.multiply_rows(panel, c, &block, rows);
            }
            bm.mark_as_unused(block.index);
        }
    }
}

/// `C = alpha * A * B + beta * C` through interleaved panels.
///
/// A and C carry `batches` batches and `multis` multis; B has one batch per
/// multi, shared by all batches.
pub struct GemmInterleaved<'a, TIn: Scalar, TOut: Scalar> {
    a: &'a Matrix<TIn>,
    b: &'a Matrix<TIn>,
    c: &'a mut Matrix<TOut>,
    args: GemmArgs,
    kernel_name: &'static str,
    pretranspose_b: bool,
    is_prepared: bool,
    state: PipelineState<TIn, TOut>,
    num_iterations: usize,
    num_workloads: usize,
    workloads: Vec<Workload>,
    pool: SpawnThreads,
}

impl<'a, TIn: Scalar, TOut: Scalar> GemmInterleaved<'a, TIn, TOut> {
    /// Select a kernel from the registry of `TIn` and size the pipeline.
    pub fn configure(args: GemmArgs, a: &'a Matrix<TIn>, b: &'a Matrix<TIn>, c: &'a mut Matrix<TOut>,
                     alpha: TOut, beta: TOut, pretranspose_b: bool) -> Result<GemmInterleaved<'a, TIn, TOut>>
        where TIn: GemmImplementationList<TOut>
    {
        GemmInterleaved::configure_with_registry(TIn::implementation_list(), args, a, b, c, alpha, beta, pretranspose_b)
    }

    /// Like `configure`, selecting from an explicit registry.
    pub fn configure_with_registry(registry: &Registry<TIn, TOut>, args: GemmArgs,
                                   a: &'a Matrix<TIn>, b: &'a Matrix<TIn>, c: &'a mut Matrix<TOut>,
                                   alpha: TOut, beta: TOut, pretranspose_b: bool)
        -> Result<GemmInterleaved<'a, TIn, TOut>>
    {
        validate(&args, a, b, c)?;

        let no_implementation = || GemmError::NoImplementation {
            types: type_name::<TIn>(),
            m: args.m, n: args.n, k: args.k,
            batches: args.batches, multis: args.multis,
        };
        let implementation = find_implementation(&args, registry).ok_or_else(&no_implementation)?;
        let strategy: Arc<dyn Strategy<TIn, TOut>> =
            Arc::from(implementation.do_instantiate(&args).ok_or_else(&no_implementation)?);

        let bs = strategy.block_sizes(&args.ci, &args);
        debug!("{}: m_round={} k_block={} x_block={} out_height={}",
               strategy.name(), bs.m_round, bs.k_block, bs.x_block, bs.strategy_out_height);

        let pool = SpawnThreads::new(args.max_threads);
        let num_threads = pool.n_threads();
        let num_iterations = (bs.m_round / bs.strategy_out_height) * args.batches;
        let num_workloads = padded_workload_count(num_windows(num_threads, num_iterations), num_threads, pretranspose_b);

        let buffer_manager: Box<dyn BufferManager> = if pretranspose_b || num_threads == 1 || num_iterations == 1 {
            Box::new(BufferManagerSingleThread::new())
        } else {
            //Every workload visits every block once, so each block has that many users.
            Box::new(BufferManagerMultipleThreads::new(num_workloads))
        };
        debug!("{} workloads over {} iterations, {} threads, {} B buffers",
               num_workloads, num_iterations, num_threads, buffer_manager.num_buffers());

        let walker = BlockWalker::new(args.n, args.k, args.multis, bs.x_block, bs.k_block);
        let transform_a = TransformA::new(strategy.clone(), &bs);
        let prepare_b = PrepareB::new(strategy.clone(), walker, &bs);
        let matrix_multiply = MatrixMultiply::new(strategy.clone(), &bs, alpha, beta, num_threads);

        let transformed_a = PanelBuffer::new(transform_a.buffer_len(&args));
        let transformed_b = if pretranspose_b {
            PanelBuffer::new(prepare_b.pretransposed_len())
        } else {
            PanelBuffer::new(prepare_b.slot_len() * buffer_manager.num_buffers())
        };

        Ok(GemmInterleaved {
            a: a,
            b: b,
            c: c,
            kernel_name: strategy.name(),
            pretranspose_b: pretranspose_b,
            is_prepared: false,
            state: PipelineState {
                m: args.m,
                bs: bs,
                walker: walker,
                transform_a: transform_a,
                prepare_b: prepare_b,
                matrix_multiply: matrix_multiply,
                transformed_a: transformed_a,
                transformed_b: transformed_b,
                buffer_manager: buffer_manager,
            },
            args: args,
            num_iterations: num_iterations,
            num_workloads: num_workloads,
            workloads: Vec::new(),
            pool: pool,
        })
    }

    /// One-time setup before the first run: reshape B if it is pretransposed and
    /// lay out the workloads. Repeated calls do nothing.
    pub fn prepare(&mut self) {
        if self.is_prepared {
            return;
        }
        if self.pretranspose_b {
            let state = &mut self.state;
            state.prepare_b.transform_all(self.b, state.transformed_b.as_mut_slice());
            debug!("{}: B pretransposed into {} elements", self.kernel_name, state.transformed_b.len());
        }
        self.workloads = plan_workloads(self.pool.n_threads(), self.num_iterations, self.pretranspose_b);
        debug_assert_eq!(self.workloads.len(), self.num_workloads);
        self.is_prepared = true;
    }

    pub fn run(&mut self) {
        self.prepare();

        let c = self.c.raw_mut();
        let a = self.a;
        let b = self.b;
        let state = &self.state;
        self.pool.run(&self.workloads, |w, info| state.execute(w, a, b, &c, info));
    }

    #[inline] pub fn kernel_name(&self) -> &'static str { self.kernel_name }
    #[inline] pub fn block_sizes(&self) -> BlockSizes { self.state.bs }
    #[inline] pub fn args(&self) -> &GemmArgs { &self.args }
    /// Empty until `prepare` has run.
    #[inline] pub fn workloads(&self) -> &[Workload] { &self.workloads }
    #[inline] pub fn is_prepared(&self) -> bool { self.is_prepared }
    #[inline] pub fn num_buffers(&self) -> usize { self.state.buffer_manager.num_buffers() }

    /// Releases every B block waits for; 1 when no ring is shared.
    #[inline] pub fn buffer_users(&self) -> usize { self.state.buffer_manager.max_users() }

    /// Micro-kernel invocations over every run so far.
    pub fn kernel_calls(&self) -> usize {
        self.state.matrix_multiply.kernel_calls()
    }
}

fn validate<TIn: Scalar, TOut: Scalar>(args: &GemmArgs, a: &Matrix<TIn>, b: &Matrix<TIn>, c: &Matrix<TOut>) -> Result<()> {
    if args.m == 0 || args.n == 0 || args.k == 0 {
        return Err(GemmError::EmptyProblem { m: args.m, n: args.n, k: args.k });
    }
    if args.batches == 0 || args.multis == 0 || args.max_threads == 0 {
        return Err(GemmError::InvalidConfig(format!(
            "batches={} multis={} max_threads={} must all be at least one",
            args.batches, args.multis, args.max_threads)));
    }
    if (a.height(), a.width(), a.batches(), a.multis()) != (args.m, args.k, args.batches, args.multis) {
        return Err(GemmError::DimensionMismatch(format!(
            "A is {}x{} ({} batches, {} multis), expected {}x{} ({} batches, {} multis)",
            a.height(), a.width(), a.batches(), a.multis(), args.m, args.k, args.batches, args.multis)));
    }
    if (b.height(), b.width(), b.multis()) != (args.k, args.n, args.multis) {
        return Err(GemmError::DimensionMismatch(format!(
            "B is {}x{} ({} multis), expected {}x{} ({} multis)",
            b.height(), b.width(), b.multis(), args.k, args.n, args.multis)));
    }
    if (c.height(), c.width(), c.batches(), c.multis()) != (args.m, args.n, args.batches, args.multis) {
        return Err(GemmError::DimensionMismatch(format!(
            "C is {}x{} ({} batches, {} multis), expected {}x{} ({} batches, {} multis)",
            c.height(), c.width(), c.batches(), c.multis(), args.m, args.n, args.batches, args.multis)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_info::{CpuInfo, CpuModel};

    fn ci() -> Arc<CpuInfo> {
        Arc::new(CpuInfo::new(CpuModel::Generic, 32 * 1024, 512 * 1024))
    }

    #[test]
    fn shapes_are_checked_before_selection() {
        let a: Matrix<f32> = Matrix::new(4, 5);
        let b: Matrix<f32> = Matrix::new(6, 3);
        let mut c: Matrix<f32> = Matrix::new(4, 3);
        let args = GemmArgs::new(ci(), 4, 3, 5);
        match GemmInterleaved::configure(args, &a, &b, &mut c, 1.0, 0.0, false) {
            Err(GemmError::DimensionMismatch(msg)) => assert!(msg.starts_with("B is 6x3")),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("mismatched B accepted"),
        }
    }

    #[test]
    fn empty_problems_are_rejected() {
        let a: Matrix<f32> = Matrix::new(4, 0);
        let b: Matrix<f32> = Matrix::new(0, 3);
        let mut c: Matrix<f32> = Matrix::new(4, 3);
        let args = GemmArgs::new(ci(), 4, 3, 0);
        assert!(matches!(GemmInterleaved::configure(args, &a, &b, &mut c, 1.0, 0.0, false),
                         Err(GemmError::EmptyProblem { k: 0, .. })));
    }

    #[test]
    fn prepare_is_idempotent() {
        let mut a: Matrix<f32> = Matrix::new(9, 7);
        let mut b: Matrix<f32> = Matrix::new(7, 13);
        let mut c: Matrix<f32> = Matrix::new(9, 13);
        a.fill_with(|_, _, y, x| (y + x) as f32);
        b.fill_with(|_, _, y, x| (y * x) as f32);
        let args = GemmArgs::new(ci(), 9, 13, 7);
        let mut gemm = GemmInterleaved::configure(args, &a, &b, &mut c, 1.0, 0.0, true).unwrap();
        assert!(!gemm.is_prepared());
        gemm.prepare();
        gemm.prepare();
        assert!(gemm.is_prepared());
        gemm.run();
        gemm.run();
        let rb = gemm.block_sizes().m_round / gemm.block_sizes().strategy_out_height;
        let expected_per_run = rb * iceil(13, gemm.block_sizes().x_block) * iceil(7, gemm.block_sizes().k_block);
        assert_eq!(gemm.kernel_calls(), 2 * expected_per_run);
    }

    fn iceil(a: usize, b: usize) -> usize {
        (a + b - 1) / b
    }
}
