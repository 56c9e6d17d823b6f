//! Cache blocking for the interleaved pipeline.

use core::cmp;
use core::mem;

use crate::args::GemmArgs;
use crate::cpu_info::CpuInfo;
use crate::kern::Strategy;
use crate::matrix::Scalar;
use crate::util::{iceildiv, round_up};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockSizes {
    /// M rounded up to a whole number of output tiles.
    pub m_round: usize,
    pub k_block: usize,
    pub x_block: usize,
    pub strategy_out_height: usize,
}

/// Shape of the kernel a plan is made for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileShape {
    pub out_height: usize,
    pub out_width: usize,
    pub k_unroll: usize,
    pub element_size: usize,
}

impl TileShape {
    pub fn of<TIn: Scalar, TOut: Scalar, S: Strategy<TIn, TOut> + ?Sized>(strategy: &S) -> TileShape {
        TileShape {
            out_height: strategy.out_height(),
            out_width: strategy.out_width(),
            k_unroll: strategy.k_unroll(),
            element_size: mem::size_of::<TIn>(),
        }
    }
}

/// Block sizes for `strategy` on `ci`, honouring any overrides in the args' config.
pub fn block_sizes_for<TIn, TOut, S>(strategy: &S, args: &GemmArgs, ci: &CpuInfo) -> BlockSizes
    where TIn: Scalar, TOut: Scalar, S: Strategy<TIn, TOut> + ?Sized
{
    let (inner, outer) = match args.cfg {
        Some(ref cfg) => (cfg.inner_block_size, cfg.outer_block_size),
        None => (0, 0),
    };
    plan(TileShape::of::<TIn, TOut, S>(strategy), ci.get_l1_cache_size(), ci.get_l2_cache_size(),
         args.m, args.n, args.k, inner, outer)
}

/// Pure sizing: one A block in half of L1, A and B blocks in 90% of L2.
///
/// `inner_override` and `outer_override` replace `k_block` and `x_block` when
/// non-zero; they are still rounded up to the kernel's granularity.
///
/// Neither block exceeds its dimension. A block that covers the whole of K or N
/// may therefore be a partial panel; buffers round it back up to whole panels.
pub fn plan(tile: TileShape, l1_size: usize, l2_size: usize,
            m: usize, n: usize, k: usize,
            inner_override: usize, outer_override: usize) -> BlockSizes
{
    let oh = cmp::max(tile.out_height, 1);
    let ow = cmp::max(tile.out_width, 1);
    let ku = cmp::max(tile.k_unroll, 1);
    let es = cmp::max(tile.element_size, 1);

    let k_block = if inner_override != 0 {
        round_up(inner_override, ku)
    } else {
        let mut kb = (l1_size / 2) / (es * cmp::max(ow, oh));
        kb = cmp::max((kb / ku) * ku, ku);
        if k == 0 {
            ku
        } else {
            let num_k_blocks = iceildiv(k, kb);
            round_up(iceildiv(k, num_k_blocks), ku)
        }
    };

    let x_block = if outer_override != 0 {
        round_up(outer_override, ow)
    } else {
        let budget = (l2_size * 9) / 10;
        let used = k_block * es * (ow + oh);
        let mut xb = budget.saturating_sub(used) / (es * k_block);
        xb = cmp::max((xb / ow) * ow, ow);
        if n == 0 {
            ow
        } else {
            let num_x_blocks = iceildiv(n, xb);
            round_up(iceildiv(n, num_x_blocks), ow)
        }
    };

    let k_block = if k > 0 { cmp::min(k_block, k) } else { k_block };
    let x_block = if n > 0 { cmp::min(x_block, n) } else { x_block };

    BlockSizes {
        m_round: round_up(m, oh),
        k_block: k_block,
        x_block: x_block,
        strategy_out_height: oh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L1: usize = 32 * 1024;
    const L2: usize = 512 * 1024;

    fn tile(oh: usize, ow: usize, ku: usize, es: usize) -> TileShape {
        TileShape { out_height: oh, out_width: ow, k_unroll: ku, element_size: es }
    }

    #[test]
    fn m_round_is_whole_tiles() {
        let bs = plan(tile(8, 12, 1, 4), L1, L2, 37, 40, 17, 0, 0);
        assert_eq!(bs.m_round, 40);
        assert_eq!(bs.strategy_out_height, 8);
    }

    #[test]
    fn small_problems_get_one_block() {
        let bs = plan(tile(8, 12, 1, 4), L1, L2, 37, 40, 17, 0, 0);
        assert_eq!(bs.k_block, 17);
        assert_eq!(bs.x_block, 40);
    }

    #[test]
    fn blocks_never_exceed_the_problem() {
        // 17 would round up to 20 and 40 to 48 with these granularities.
        let bs = plan(tile(8, 12, 4, 1), L1, L2, 37, 40, 17, 0, 0);
        assert_eq!((bs.k_block, bs.x_block), (17, 40));

        let bs = plan(tile(8, 12, 4, 1), L1, L2, 37, 40, 17, 30, 50);
        assert_eq!((bs.k_block, bs.x_block), (17, 40));

        for &(n, k) in [(1, 1), (11, 3), (13, 5), (25, 9), (100, 101)].iter() {
            let bs = plan(tile(8, 12, 4, 4), L1, L2, 9, n, k, 0, 0);
            assert!(bs.k_block > 0 && bs.k_block <= k, "k_block {} for K={}", bs.k_block, k);
            assert!(bs.x_block > 0 && bs.x_block <= n, "x_block {} for N={}", bs.x_block, n);
        }
    }

    #[test]
    fn k_blocks_are_balanced() {
        // L1/2 over 4 bytes times 12 is 341, which rounds to 340 with k_unroll 4.
        let bs = plan(tile(8, 12, 4, 4), L1, L2, 64, 64, 1000, 0, 0);
        assert_eq!(bs.k_block % 4, 0);
        let nk = iceildiv(1000, bs.k_block);
        assert_eq!(nk, 3);
        assert_eq!(bs.k_block, round_up(iceildiv(1000, 3), 4));
    }

    #[test]
    fn x_block_fits_in_l2() {
        let t = tile(8, 12, 1, 4);
        let bs = plan(t, L1, L2, 512, 100_000, 4096, 0, 0);
        assert_eq!(bs.x_block % 12, 0);
        let footprint = bs.k_block * 4 * (bs.x_block + 12 + 8);
        // Rebalancing can only shrink, plus at most one panel of rounding.
        assert!(footprint <= (L2 * 9) / 10 + bs.k_block * 4 * 12);
    }

    #[test]
    fn overrides_win_but_keep_granularity() {
        let bs = plan(tile(8, 12, 4, 1), L1, L2, 16, 500, 500, 30, 50);
        assert_eq!(bs.k_block, 32);
        assert_eq!(bs.x_block, 60);
    }

    #[test]
    fn degenerate_shapes_are_single_blocks() {
        let bs = plan(tile(4, 4, 4, 1), L1, L2, 1, 0, 0, 0, 0);
        assert_eq!(bs.k_block, 4);
        assert_eq!(bs.x_block, 4);
        assert_eq!(bs.m_round, 4);
    }

    #[test]
    fn tiny_caches_still_make_progress() {
        let bs = plan(tile(8, 12, 1, 4), 16, 16, 8, 24, 24, 0, 0);
        assert_eq!(bs.k_block, 1);
        assert_eq!(bs.x_block, 12);
    }
}
