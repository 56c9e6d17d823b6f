//! Problem description handed to kernel selection and to the pipeline.

use std::fmt;
use std::sync::Arc;

use crate::cpu_info::CpuInfo;

/// Family of GEMM driver an implementation belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GemmMethod {
    /// No preference. Also marks the end of a registry.
    Default,
    GemmInterleaved,
    GemmHybrid,
    GemmInterleaved2d,
    GemvBatched,
}

impl Default for GemmMethod {
    fn default() -> GemmMethod {
        GemmMethod::Default
    }
}

impl fmt::Display for GemmMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            GemmMethod::Default => "default",
            GemmMethod::GemmInterleaved => "gemm_interleaved",
            GemmMethod::GemmHybrid => "gemm_hybrid",
            GemmMethod::GemmInterleaved2d => "gemm_interleaved_2d",
            GemmMethod::GemvBatched => "gemv_batched",
        };
        f.write_str(name)
    }
}

/// Memory layout convention for pre-reshaped weights (the B operand).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WeightFormat {
    /// The kernel reshapes B itself; not a fixed format.
    Unspecified,
    /// Caller accepts whatever fixed format the chosen kernel uses.
    Any,
    Ohwi,
    /// Columns interleaved by `interleave_by`, K grouped by `block_by`.
    Interleaved { interleave_by: u32, block_by: u32 },
    /// Like `Interleaved`, with the interleave given in vector lengths.
    VlInterleaved { vl_multiple: u32, block_by: u32 },
}

impl Default for WeightFormat {
    fn default() -> WeightFormat {
        WeightFormat::Unspecified
    }
}

impl WeightFormat {
    pub fn is_fixed(&self) -> bool {
        match *self {
            WeightFormat::Unspecified | WeightFormat::Any => false,
            _ => true,
        }
    }

    /// Turn a vector-length relative format into a concrete one.
    pub fn resolve(self, vector_length_bytes: usize, element_size: usize) -> WeightFormat {
        match self {
            WeightFormat::VlInterleaved { vl_multiple, block_by } => {
                let lanes = (vector_length_bytes / element_size.max(1)).max(1) as u32;
                WeightFormat::Interleaved { interleave_by: vl_multiple * lanes, block_by: block_by }
            }
            other => other,
        }
    }
}

/// What happens to the accumulators on their way into C.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutputStage {
    None,
    DequantizeFloat { scale: f32 },
    Requantize32 {
        c_offset: i32,
        multiplier: i32,
        shift: i32,
        minval: i32,
        maxval: i32,
    },
}

impl Default for OutputStage {
    fn default() -> OutputStage {
        OutputStage::None
    }
}

/// User overrides for kernel selection and blocking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GemmConfig {
    pub method: GemmMethod,
    /// Only consider kernels whose name contains this.
    pub filter: String,
    pub weight_format: WeightFormat,
    /// Forces `k_block` when non-zero.
    pub inner_block_size: usize,
    /// Forces `x_block` when non-zero.
    pub outer_block_size: usize,
}

impl GemmConfig {
    pub fn new() -> GemmConfig {
        GemmConfig::default()
    }

    pub fn method(mut self, method: GemmMethod) -> GemmConfig {
        self.method = method;
        self
    }

    pub fn filter<S: Into<String>>(mut self, filter: S) -> GemmConfig {
        self.filter = filter.into();
        self
    }

    pub fn weight_format(mut self, weight_format: WeightFormat) -> GemmConfig {
        self.weight_format = weight_format;
        self
    }

    pub fn inner_block_size(mut self, k_block: usize) -> GemmConfig {
        self.inner_block_size = k_block;
        self
    }

    pub fn outer_block_size(mut self, x_block: usize) -> GemmConfig {
        self.outer_block_size = x_block;
        self
    }
}

/// Shape of one GEMM call plus everything selection needs to know about it.
#[derive(Clone, Debug)]
pub struct GemmArgs {
    pub ci: Arc<CpuInfo>,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batches: usize,
    pub multis: usize,
    pub max_threads: usize,
    pub fixed_format: bool,
    pub output_stage: OutputStage,
    pub cfg: Option<GemmConfig>,
}

impl GemmArgs {
    pub fn new(ci: Arc<CpuInfo>, m: usize, n: usize, k: usize) -> GemmArgs {
        GemmArgs {
            ci: ci,
            m: m,
            n: n,
            k: k,
            batches: 1,
            multis: 1,
            max_threads: 1,
            fixed_format: false,
            output_stage: OutputStage::None,
            cfg: None,
        }
    }

    pub fn batches(mut self, batches: usize) -> GemmArgs {
        self.batches = batches;
        self
    }

    pub fn multis(mut self, multis: usize) -> GemmArgs {
        self.multis = multis;
        self
    }

    pub fn max_threads(mut self, max_threads: usize) -> GemmArgs {
        self.max_threads = max_threads;
        self
    }

    pub fn fixed_format(mut self, fixed_format: bool) -> GemmArgs {
        self.fixed_format = fixed_format;
        self
    }

    pub fn output_stage(mut self, output_stage: OutputStage) -> GemmArgs {
        self.output_stage = output_stage;
        self
    }

    pub fn config(mut self, cfg: GemmConfig) -> GemmArgs {
        self.cfg = Some(cfg);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vl_formats_resolve_by_element_size() {
        let wf = WeightFormat::VlInterleaved { vl_multiple: 2, block_by: 1 };
        assert_eq!(wf.resolve(16, 4), WeightFormat::Interleaved { interleave_by: 8, block_by: 1 });
        assert_eq!(wf.resolve(16, 1), WeightFormat::Interleaved { interleave_by: 32, block_by: 1 });
        assert_eq!(WeightFormat::Ohwi.resolve(16, 4), WeightFormat::Ohwi);
    }

    #[test]
    fn any_and_unspecified_are_not_fixed() {
        assert!(!WeightFormat::Any.is_fixed());
        assert!(!WeightFormat::Unspecified.is_fixed());
        assert!(WeightFormat::Interleaved { interleave_by: 12, block_by: 1 }.is_fixed());
    }
}
