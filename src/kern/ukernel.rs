use core::marker::PhantomData;

use typenum::Unsigned;

use crate::args::WeightFormat;
use crate::cpu_info::{CpuInfo, CpuModel};
use crate::matrix::Scalar;

use super::strategy::Strategy;

pub type KernelFn<TIn, TOut> = fn(&[TIn], &[TIn], &mut [TOut], usize, usize);

/// Portable interleaved strategy with an `Mr x Nr` tile and depth unroll `Ku`.
///
/// The micro-kernel is resolved once, from the CPU model, when the strategy is built.
pub struct InterleavedRef<TIn: Scalar, TOut: Scalar, Mr: Unsigned, Nr: Unsigned, Ku: Unsigned> {
    name: &'static str,
    weight_format: WeightFormat,
    kern: KernelFn<TIn, TOut>,
    _mr: PhantomData<Mr>,
    _nr: PhantomData<Nr>,
    _ku: PhantomData<Ku>,
}

impl<TIn, TOut, Mr, Nr, Ku> InterleavedRef<TIn, TOut, Mr, Nr, Ku>
    where TIn: Scalar + Into<TOut>, TOut: Scalar, Mr: Unsigned, Nr: Unsigned, Ku: Unsigned
{
    pub fn new(name: &'static str, ci: &CpuInfo) -> InterleavedRef<TIn, TOut, Mr, Nr, Ku> {
        let kern: KernelFn<TIn, TOut> = match ci.model() {
            CpuModel::Generic => kernel_generic::<TIn, TOut, Mr, Nr>,
            _ => kernel_unrolled::<TIn, TOut, Mr, Nr>,
        };
        InterleavedRef {
            name: name,
            weight_format: WeightFormat::Unspecified,
            kern: kern,
            _mr: PhantomData,
            _nr: PhantomData,
            _ku: PhantomData,
        }
    }

    /// Tag the strategy as consuming pre-reshaped weights.
    pub fn with_weight_format(mut self, wf: WeightFormat) -> InterleavedRef<TIn, TOut, Mr, Nr, Ku> {
        self.weight_format = wf;
        self
    }
}

impl<TIn, TOut, Mr, Nr, Ku> Strategy<TIn, TOut> for InterleavedRef<TIn, TOut, Mr, Nr, Ku>
    where TIn: Scalar + Into<TOut>, TOut: Scalar, Mr: Unsigned + Send + Sync, Nr: Unsigned + Send + Sync,
          Ku: Unsigned + Send + Sync
{
    fn name(&self) -> &'static str { self.name }
    fn out_height(&self) -> usize { Mr::to_usize() }
    fn out_width(&self) -> usize { Nr::to_usize() }
    fn k_unroll(&self) -> usize { Ku::to_usize() }
    fn weight_format(&self) -> WeightFormat { self.weight_format }

    #[inline(always)]
    fn kernel(&self, a_panel: &[TIn], b_panel: &[TIn], c_panel: &mut [TOut], bblocks: usize, kern_k: usize) {
        (self.kern)(a_panel, b_panel, c_panel, bblocks, kern_k)
    }
}

#[inline(always)]
fn widen_mul<TIn: Into<TOut>, TOut: Scalar>(x: TIn, y: TIn) -> TOut {
    let x: TOut = x.into();
    let y: TOut = y.into();
    x * y
}

fn kernel_generic<TIn, TOut, Mr, Nr>(a: &[TIn], b: &[TIn], c: &mut [TOut], bblocks: usize, kern_k: usize)
    where TIn: Scalar + Into<TOut>, TOut: Scalar, Mr: Unsigned, Nr: Unsigned
{
    let mr = Mr::to_usize();
    let nr = Nr::to_usize();
    for bb in 0..bblocks {
        let bp = &b[bb * nr * kern_k..(bb + 1) * nr * kern_k];
        let cp = &mut c[bb * mr * nr..(bb + 1) * mr * nr];
        for v in cp.iter_mut() {
            *v = TOut::zero();
        }
        for z in 0..kern_k {
            let ak = &a[z * mr..(z + 1) * mr];
            let bk = &bp[z * nr..(z + 1) * nr];
            for i in 0..mr {
                let alpha: TOut = ak[i].into();
                for j in 0..nr {
                    let beta: TOut = bk[j].into();
                    cp[i * nr + j] += alpha * beta;
                }
            }
        }
    }
}

//Same arithmetic, four steps of depth per pass over the tile.
fn kernel_unrolled<TIn, TOut, Mr, Nr>(a: &[TIn], b: &[TIn], c: &mut [TOut], bblocks: usize, kern_k: usize)
    where TIn: Scalar + Into<TOut>, TOut: Scalar, Mr: Unsigned, Nr: Unsigned
{
    let mr = Mr::to_usize();
    let nr = Nr::to_usize();
    let k4 = kern_k - kern_k % 4;
    for bb in 0..bblocks {
        let bp = &b[bb * nr * kern_k..(bb + 1) * nr * kern_k];
        let cp = &mut c[bb * mr * nr..(bb + 1) * mr * nr];
        for i in 0..mr {
            for j in 0..nr {
                let mut acc = TOut::zero();
                let mut z = 0;
                while z < k4 {
                    acc += widen_mul::<TIn, TOut>(a[z * mr + i], bp[z * nr + j]);
                    acc += widen_mul::<TIn, TOut>(a[(z + 1) * mr + i], bp[(z + 1) * nr + j]);
                    acc += widen_mul::<TIn, TOut>(a[(z + 2) * mr + i], bp[(z + 2) * nr + j]);
                    acc += widen_mul::<TIn, TOut>(a[(z + 3) * mr + i], bp[(z + 3) * nr + j]);
                    z += 4;
                }
                while z < kern_k {
                    acc += widen_mul::<TIn, TOut>(a[z * mr + i], bp[z * nr + j]);
                    z += 1;
                }
                cp[i * nr + j] = acc;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typenum::{U1, U2, U3, U4};

    fn panels() -> (Vec<i8>, Vec<i8>) {
        // A is 2x5, B is 5x6 (two 3-wide panels), both [k][lane].
        let a: Vec<i8> = (0..10).map(|v| v as i8 - 4).collect();
        let b: Vec<i8> = (0..30).map(|v| (v % 7) as i8 - 3).collect();
        (a, b)
    }

    fn expected(a: &[i8], b: &[i8]) -> Vec<i32> {
        let mut c = vec![0i32; 12];
        for bb in 0..2 {
            for i in 0..2 {
                for j in 0..3 {
                    for z in 0..5 {
                        c[bb * 6 + i * 3 + j] += a[z * 2 + i] as i32 * b[bb * 15 + z * 3 + j] as i32;
                    }
                }
            }
        }
        c
    }

    #[test]
    fn both_kernels_agree_with_the_loop_nest() {
        let (a, b) = panels();
        let want = expected(&a, &b);

        let generic = InterleavedRef::<i8, i32, U2, U3, U1>::new("g", &CpuInfo::new(CpuModel::Generic, 1024, 4096));
        let mut c = vec![99i32; 12];
        generic.kernel(&a, &b, &mut c, 2, 5);
        assert_eq!(c, want);

        let unrolled = InterleavedRef::<i8, i32, U2, U3, U1>::new("u", &CpuInfo::new(CpuModel::ArmDot, 1024, 4096));
        let mut c = vec![99i32; 12];
        unrolled.kernel(&a, &b, &mut c, 2, 5);
        assert_eq!(c, want);
    }

    #[test]
    fn shape_comes_from_type_parameters() {
        let s = InterleavedRef::<u8, u32, U4, U4, U4>::new("ref", &CpuInfo::new(CpuModel::Generic, 1024, 4096));
        assert_eq!((s.out_height(), s.out_width(), s.k_unroll()), (4, 4, 4));
        assert_eq!(s.weight_format(), WeightFormat::Unspecified);
    }
}
