use core::cmp;

use crate::util::iceildiv;

/// One `(multi, k-block, x-block)` step of the walk over B.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    pub multi: usize,
    pub k0: usize,
    pub kmax: usize,
    pub x0: usize,
    pub xmax: usize,
}
impl Block {
    /// First x-block of a k-block: A has to be interleaved again.
    #[inline(always)]
    pub fn new_kblock(&self) -> bool {
        self.x0 == 0
    }
}

/// Partitions B into blocks: x innermost, then k, then multi.
///
/// Every workload visits the blocks in this order, which is what lets
/// the logical index double as the transformed-B ring index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockWalker {
    n: usize,
    k: usize,
    multis: usize,
    x_block: usize,
    k_block: usize,
}
impl BlockWalker {
    pub fn new(n: usize, k: usize, multis: usize, x_block: usize, k_block: usize) -> BlockWalker {
        debug_assert!(x_block > 0 && k_block > 0);
        BlockWalker { n: n, k: k, multis: multis, x_block: x_block, k_block: k_block }
    }

    #[inline(always)] pub fn num_x_blocks(&self) -> usize { cmp::max(iceildiv(self.n, self.x_block), 1) }
    #[inline(always)] pub fn num_k_blocks(&self) -> usize { cmp::max(iceildiv(self.k, self.k_block), 1) }
    #[inline(always)] pub fn num_blocks(&self) -> usize { self.num_x_blocks() * self.num_k_blocks() * self.multis }

    pub fn block(&self, index: usize) -> Block {
        debug_assert!(index < self.num_blocks());
        let nx = self.num_x_blocks();
        let per_multi = nx * self.num_k_blocks();
        let multi = index / per_multi;
        let rem = index % per_multi;
        let k0 = (rem / nx) * self.k_block;
        let x0 = (rem % nx) * self.x_block;
        Block {
            index: index,
            multi: multi,
            k0: k0,
            kmax: cmp::min(k0 + self.k_block, self.k),
            x0: x0,
            xmax: cmp::min(x0 + self.x_block, self.n),
        }
    }

    pub fn iter(&self) -> BlockIter {
        BlockIter { walker: *self, next: 0 }
    }
}

pub struct BlockIter {
    walker: BlockWalker,
    next: usize,
}
impl Iterator for BlockIter {
    type Item = Block;
    fn next(&mut self) -> Option<Block> {
        if self.next >= self.walker.num_blocks() {
            return None;
        }
        let b = self.walker.block(self.next);
        self.next += 1;
        Some(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_order_is_x_then_k_then_multi() {
        let w = BlockWalker::new(30, 20, 2, 12, 8);
        assert_eq!(w.num_blocks(), 3 * 3 * 2);
        let blocks: Vec<Block> = w.iter().collect();
        assert_eq!(blocks.len(), 18);
        assert_eq!((blocks[0].multi, blocks[0].k0, blocks[0].x0), (0, 0, 0));
        assert_eq!((blocks[1].k0, blocks[1].x0, blocks[1].xmax), (0, 12, 24));
        assert_eq!((blocks[2].x0, blocks[2].xmax), (24, 30));
        assert_eq!((blocks[3].k0, blocks[3].kmax, blocks[3].x0), (8, 16, 0));
        assert_eq!((blocks[8].k0, blocks[8].kmax), (16, 20));
        assert_eq!(blocks[9].multi, 1);
        assert!(blocks[9].new_kblock());
        assert!(!blocks[10].new_kblock());
        for (i, b) in blocks.iter().enumerate() {
            assert_eq!(b.index, i);
        }
    }
}
