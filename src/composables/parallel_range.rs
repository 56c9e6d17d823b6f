use core::cmp;
use core::ops::Range;

/// Piece `id` of `0..n` split into `ways` contiguous parts; the first `n % ways` get one extra.
pub fn split_range(n: usize, ways: usize, id: usize) -> Range<usize> {
    debug_assert!(ways > 0 && id < ways);
    let base = n / ways;
    let rem = n % ways;
    let start = base * id + cmp::min(id, rem);
    let len = base + if id < rem { 1 } else { 0 };
    start..start + len
}

/// Windows the flattened iteration space is cut into: never more than the threads.
pub fn num_windows(num_threads: usize, num_iterations: usize) -> usize {
    cmp::max(cmp::min(num_threads, num_iterations), 1)
}

/// Total workload count once B-only items are appended.
///
/// Only on-the-fly B needs them: every workload has to release every shared
/// block, so the count is rounded up to a multiple of the threads.
pub fn padded_workload_count(windows: usize, num_threads: usize, pretransposed: bool) -> usize {
    if !pretransposed && windows > 1 && windows % num_threads != 0 {
        windows + num_threads - windows % num_threads
    } else {
        windows
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    /// B was reshaped up front; multiply only.
    Pretransposed,
    /// Reshape B blocks through the buffer manager, then multiply.
    OnTheFly,
    /// Takes part in the buffer handshake without owning any rows.
    BOnly,
}

/// Immutable slice `[start, end)` of the flattened (batch, row block) space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub start: usize,
    pub end: usize,
}

/// Every workload of one run. The buffer manager's user count is the length of this list.
pub fn plan_workloads(num_threads: usize, num_iterations: usize, pretransposed: bool) -> Vec<Workload> {
    let windows = num_windows(num_threads, num_iterations);
    let total = padded_workload_count(windows, num_threads, pretransposed);
    let kind = if pretransposed { WorkloadKind::Pretransposed } else { WorkloadKind::OnTheFly };

    let mut workloads = Vec::with_capacity(total);
    for w in 0..windows {
        let r = split_range(num_iterations, windows, w);
        workloads.push(Workload { kind: kind, start: r.start, end: r.end });
    }
    for _ in windows..total {
        workloads.push(Workload { kind: WorkloadKind::BOnly, start: 0, end: 0 });
    }
    workloads
}

/// Rows `first..last` of one batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowRange {
    pub batch: usize,
    pub first: usize,
    pub last: usize,
}

/// Translate a window of the flattened space into per-batch row ranges.
///
/// `blocks_per_batch` is `m_round / out_height`; rows are clamped to `m`.
pub fn row_ranges(start: usize, end: usize, blocks_per_batch: usize, out_height: usize, m: usize) -> Vec<RowRange> {
    let mut ranges = Vec::new();
    if start >= end {
        return ranges;
    }
    let batch_0 = start / blocks_per_batch;
    let batch_end = (end - 1) / blocks_per_batch;
    let m_0 = (start % blocks_per_batch) * out_height;
    let m_max = ((end - 1) % blocks_per_batch + 1) * out_height;

    for batch in batch_0..batch_end + 1 {
        let first = if batch == batch_0 { m_0 } else { 0 };
        let last = if batch == batch_end { cmp::min(m_max, m) } else { m };
        if first >= last {
            continue;
        }
        ranges.push(RowRange { batch: batch, first: first, last: last });
    }
    ranges
}
