use scoped_threadpool::Pool;

use crate::thread_comm::ThreadInfo;
use crate::util::pin_to_core;

use super::parallel_range::Workload;

/// Fork-join pool that runs one closure per workload and joins them all.
pub struct SpawnThreads {
    n_threads: usize,
    pool: Pool,
}
impl SpawnThreads {
    pub fn new(n_threads: usize) -> SpawnThreads {
        let n_threads = n_threads.max(1);
        let mut spawn = SpawnThreads { n_threads: n_threads, pool: Pool::new(n_threads as u32) };
        spawn.bind_threads();
        spawn
    }

    #[inline(always)]
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    //Pinning is best effort and a no-op without the hwloc feature.
    fn bind_threads(&mut self) {
        if !cfg!(feature = "hwloc") || self.n_threads == 1 {
            return;
        }
        let nthr = self.n_threads;
        self.pool.scoped(|scope| {
            for id in 0..nthr {
                scope.execute(move || pin_to_core(id));
            }
        });
    }

    /// Run `f` once for every workload and block until all of them return.
    ///
    /// Callers that synchronise workloads with each other must not hand in
    /// more workloads than there are threads.
    pub fn run<F>(&mut self, workloads: &[Workload], f: F)
        where F: Fn(&Workload, &ThreadInfo) + Sync
    {
        let total = workloads.len();
        if total == 1 {
            f(&workloads[0], &ThreadInfo::single_thread());
            return;
        }
        let f = &f;
        self.pool.scoped(|scope| {
            for (id, w) in workloads.iter().enumerate() {
                scope.execute(move || {
                    let info = ThreadInfo::new(id, total);
                    f(w, &info);
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composables::parallel_range::{plan_workloads, WorkloadKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_workload_runs_once() {
        let mut spawn = SpawnThreads::new(3);
        let workloads = plan_workloads(3, 10, false);
        let rows = AtomicUsize::new(0);
        let calls = AtomicUsize::new(0);
        spawn.run(&workloads, |w, info| {
            assert!(info.thread_id() < info.num_threads());
            calls.fetch_add(1, Ordering::SeqCst);
            if w.kind != WorkloadKind::BOnly {
                rows.fetch_add(w.end - w.start, Ordering::SeqCst);
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), workloads.len());
        assert_eq!(rows.load(Ordering::SeqCst), 10);
    }
}
