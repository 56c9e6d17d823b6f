//! Process-wide registries of the reference kernels, one per type pair.

use once_cell::sync::Lazy;
use typenum::{U1, U4, U8, U12, U16};

use crate::args::{GemmArgs, GemmMethod, OutputStage, WeightFormat};
use crate::blocking::TileShape;
use crate::selection::{GemmImplementation, GemmImplementationList, Registry};

use super::perf::{estimate_cycles, PerformanceParameters};
use super::strategy::Strategy;
use super::ukernel::InterleavedRef;

fn plain_output(args: &GemmArgs) -> bool {
    args.output_stage == OutputStage::None
}

fn tile<TIn>(out_height: usize, out_width: usize, k_unroll: usize) -> TileShape {
    TileShape {
        out_height: out_height,
        out_width: out_width,
        k_unroll: k_unroll,
        element_size: ::core::mem::size_of::<TIn>(),
    }
}

static SGEMM_METHODS: Lazy<Registry<f32, f32>> = Lazy::new(|| {
    Registry::new(vec![
        GemmImplementation::new(GemmMethod::GemvBatched, "gemv_batched_ref_1x12", |args: &GemmArgs| {
            Box::new(InterleavedRef::<f32, f32, U1, U12, U1>::new("gemv_batched_ref_1x12", &args.ci))
                as Box<dyn Strategy<f32, f32>>
        }).supported_if(|args: &GemmArgs| plain_output(args) && args.m == 1 && args.batches > 1),

        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_8x12", |args: &GemmArgs| {
            Box::new(InterleavedRef::<f32, f32, U8, U12, U1>::new("interleaved_ref_8x12", &args.ci))
                as Box<dyn Strategy<f32, f32>>
        }).supported_if(plain_output)
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(6.0, 4.0, 2.0).for_model(args.ci.model());
              estimate_cycles::<f32, f32>(args, tile::<f32>(8, 12, 1), perf)
          }),

        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_4x16", |args: &GemmArgs| {
            Box::new(InterleavedRef::<f32, f32, U4, U16, U1>::new("interleaved_ref_4x16", &args.ci))
                as Box<dyn Strategy<f32, f32>>
        }).supported_if(plain_output)
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(5.0, 4.0, 2.0).for_model(args.ci.model());
              estimate_cycles::<f32, f32>(args, tile::<f32>(4, 16, 1), perf)
          }),

        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_8x12_fixed", |args: &GemmArgs| {
            Box::new(InterleavedRef::<f32, f32, U8, U12, U1>::new("interleaved_ref_8x12_fixed", &args.ci)
                .with_weight_format(WeightFormat::Interleaved { interleave_by: 12, block_by: 1 }))
                as Box<dyn Strategy<f32, f32>>
        }).weight_format(WeightFormat::Interleaved { interleave_by: 12, block_by: 1 })
          .supported_if(plain_output)
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(6.0, 4.0, 2.0).for_model(args.ci.model());
              estimate_cycles::<f32, f32>(args, tile::<f32>(8, 12, 1), perf)
          }),

        GemmImplementation::sentinel(),
    ])
});

static GEMM_S8_METHODS: Lazy<Registry<i8, i32>> = Lazy::new(|| {
    Registry::new(vec![
        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_dot_8x12", |args: &GemmArgs| {
            Box::new(InterleavedRef::<i8, i32, U8, U12, U4>::new("interleaved_ref_dot_8x12", &args.ci))
                as Box<dyn Strategy<i8, i32>>
        }).supported_if(|args: &GemmArgs| plain_output(args) && args.ci.has_dotprod())
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(24.0, 8.0, 4.0).for_model(args.ci.model());
              estimate_cycles::<i8, i32>(args, tile::<i8>(8, 12, 4), perf)
          }),

        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_4x4", |args: &GemmArgs| {
            Box::new(InterleavedRef::<i8, i32, U4, U4, U1>::new("interleaved_ref_4x4", &args.ci))
                as Box<dyn Strategy<i8, i32>>
        }).supported_if(plain_output)
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(4.0, 4.0, 2.0).for_model(args.ci.model());
              estimate_cycles::<i8, i32>(args, tile::<i8>(4, 4, 1), perf)
          }),

        GemmImplementation::sentinel(),
    ])
});

static GEMM_U8_METHODS: Lazy<Registry<u8, u32>> = Lazy::new(|| {
    Registry::new(vec![
        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_dot_8x12", |args: &GemmArgs| {
            Box::new(InterleavedRef::<u8, u32, U8, U12, U4>::new("interleaved_ref_dot_8x12", &args.ci))
                as Box<dyn Strategy<u8, u32>>
        }).supported_if(|args: &GemmArgs| plain_output(args) && args.ci.has_dotprod())
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(24.0, 8.0, 4.0).for_model(args.ci.model());
              estimate_cycles::<u8, u32>(args, tile::<u8>(8, 12, 4), perf)
          }),

        GemmImplementation::new(GemmMethod::GemmInterleaved, "interleaved_ref_4x4", |args: &GemmArgs| {
            Box::new(InterleavedRef::<u8, u32, U4, U4, U1>::new("interleaved_ref_4x4", &args.ci))
                as Box<dyn Strategy<u8, u32>>
        }).supported_if(plain_output)
          .cycle_estimate(|args: &GemmArgs| {
              let perf = PerformanceParameters::new(4.0, 4.0, 2.0).for_model(args.ci.model());
              estimate_cycles::<u8, u32>(args, tile::<u8>(4, 4, 1), perf)
          }),

        GemmImplementation::sentinel(),
    ])
});

impl GemmImplementationList<f32> for f32 {
    fn implementation_list() -> &'static Registry<f32, f32> {
        &SGEMM_METHODS
    }
}

impl GemmImplementationList<i32> for i8 {
    fn implementation_list() -> &'static Registry<i8, i32> {
        &GEMM_S8_METHODS
    }
}

impl GemmImplementationList<u32> for u8 {
    fn implementation_list() -> &'static Registry<u8, u32> {
        &GEMM_U8_METHODS
    }
}
