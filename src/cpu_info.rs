//! Description of the CPU the kernels run on.
//!
//! Block sizing and kernel selection only ever look at a `CpuInfo`, never at
//! the host directly, so tests can describe any machine they like.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

const DEFAULT_L1_SIZE: usize = 32 * 1024;
const DEFAULT_L2_SIZE: usize = 512 * 1024;

/// Broad core families the reference kernels specialise for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CpuModel {
    Generic,
    X86Fma,
    X86Avx512,
    ArmNeon,
    ArmDot,
    ArmSve,
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            CpuModel::Generic => "generic",
            CpuModel::X86Fma => "x86-fma",
            CpuModel::X86Avx512 => "x86-avx512",
            CpuModel::ArmNeon => "arm-neon",
            CpuModel::ArmDot => "arm-dotprod",
            CpuModel::ArmSve => "arm-sve",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    pub fma: bool,
    pub avx2: bool,
    pub avx512f: bool,
    pub neon: bool,
    pub dotprod: bool,
    pub i8mm: bool,
    pub sve: bool,
    pub bf16: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuInfo {
    model: CpuModel,
    features: CpuFeatures,
    l1_cache_size: usize,
    l2_cache_size: usize,
    num_cpus: usize,
    vector_length_bytes: usize,
}

static DETECTED: Lazy<Arc<CpuInfo>> = Lazy::new(|| {
    let ci = CpuInfo::detect();
    info!(
        "detected cpu: model={} l1={}B l2={}B cpus={} vl={}B",
        ci.model, ci.l1_cache_size, ci.l2_cache_size, ci.num_cpus, ci.vector_length_bytes
    );
    Arc::new(ci)
});

impl CpuInfo {
    /// A synthetic description with no optional features.
    pub fn new(model: CpuModel, l1_cache_size: usize, l2_cache_size: usize) -> CpuInfo {
        CpuInfo {
            model: model,
            features: CpuFeatures::default(),
            l1_cache_size: l1_cache_size,
            l2_cache_size: l2_cache_size,
            num_cpus: 1,
            vector_length_bytes: 16,
        }
    }

    pub fn with_features(mut self, features: CpuFeatures) -> CpuInfo {
        self.features = features;
        self
    }

    pub fn with_vector_length(mut self, bytes: usize) -> CpuInfo {
        self.vector_length_bytes = bytes.max(1);
        self
    }

    /// The host CPU, probed once per process.
    pub fn get() -> Arc<CpuInfo> {
        DETECTED.clone()
    }

    /// Probe the host CPU.
    pub fn detect() -> CpuInfo {
        let features = detect_features();
        let model = if features.avx512f {
            CpuModel::X86Avx512
        } else if features.fma && features.avx2 {
            CpuModel::X86Fma
        } else if features.sve {
            CpuModel::ArmSve
        } else if features.dotprod {
            CpuModel::ArmDot
        } else if features.neon {
            CpuModel::ArmNeon
        } else {
            CpuModel::Generic
        };
        let vector_length_bytes = if features.avx512f {
            64
        } else if features.avx2 {
            32
        } else {
            16
        };
        let (l1, l2) = detect_cache_sizes();

        CpuInfo {
            model: model,
            features: features,
            l1_cache_size: l1,
            l2_cache_size: l2,
            num_cpus: num_cpus::get().max(1),
            vector_length_bytes: vector_length_bytes,
        }
    }

    #[inline(always)] pub fn model(&self) -> CpuModel { self.model }
    #[inline(always)] pub fn features(&self) -> &CpuFeatures { &self.features }
    #[inline(always)] pub fn get_l1_cache_size(&self) -> usize { self.l1_cache_size }
    #[inline(always)] pub fn get_l2_cache_size(&self) -> usize { self.l2_cache_size }
    #[inline(always)] pub fn num_cpus(&self) -> usize { self.num_cpus }
    #[inline(always)] pub fn vector_length_bytes(&self) -> usize { self.vector_length_bytes }

    pub fn has_dotprod(&self) -> bool {
        self.features.dotprod || self.features.i8mm || self.features.avx512f
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_features() -> CpuFeatures {
    CpuFeatures {
        fma: is_x86_feature_detected!("fma"),
        avx2: is_x86_feature_detected!("avx2"),
        avx512f: is_x86_feature_detected!("avx512f"),
        ..CpuFeatures::default()
    }
}

#[cfg(target_arch = "aarch64")]
fn detect_features() -> CpuFeatures {
    use std::arch::is_aarch64_feature_detected;
    CpuFeatures {
        neon: is_aarch64_feature_detected!("neon"),
        dotprod: is_aarch64_feature_detected!("dotprod"),
        i8mm: is_aarch64_feature_detected!("i8mm"),
        sve: is_aarch64_feature_detected!("sve"),
        bf16: is_aarch64_feature_detected!("bf16"),
        ..CpuFeatures::default()
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn detect_features() -> CpuFeatures {
    CpuFeatures::default()
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn detect_cache_sizes() -> (usize, usize) {
    fn sysconf(name: libc::c_int) -> Option<usize> {
        let v = unsafe { libc::sysconf(name) };
        if v > 0 { Some(v as usize) } else { None }
    }
    let l1 = sysconf(libc::_SC_LEVEL1_DCACHE_SIZE).unwrap_or(DEFAULT_L1_SIZE);
    let l2 = sysconf(libc::_SC_LEVEL2_CACHE_SIZE).unwrap_or(DEFAULT_L2_SIZE);
    (l1, l2)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn detect_cache_sizes() -> (usize, usize) {
    (DEFAULT_L1_SIZE, DEFAULT_L2_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_cpu_is_sane() {
        let ci = CpuInfo::get();
        assert!(ci.get_l1_cache_size() > 0);
        assert!(ci.get_l2_cache_size() > 0);
        assert!(ci.num_cpus() >= 1);
        assert!(ci.vector_length_bytes() >= 16);
    }

    #[test]
    fn dotprod_follows_features() {
        let plain = CpuInfo::new(CpuModel::ArmNeon, 32 * 1024, 256 * 1024);
        assert!(!plain.has_dotprod());
        let dot = plain.with_features(CpuFeatures { dotprod: true, ..CpuFeatures::default() });
        assert!(dot.has_dotprod());
    }
}
