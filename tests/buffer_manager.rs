extern crate interleave;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use interleave::{BufferManager, BufferManagerMultipleThreads, BufferManagerSingleThread, BufferState, NUM_BUFFERS};

const EMPTY: usize = usize::max_value();

/// Stand-in for the transformed-B ring: each slot remembers which block it holds.
struct Ring {
    contents: Vec<AtomicUsize>,
    reshapes: Vec<AtomicUsize>,
}

impl Ring {
    fn new(num_blocks: usize) -> Ring {
        Ring {
            contents: (0..NUM_BUFFERS).map(|_| AtomicUsize::new(EMPTY)).collect(),
            reshapes: (0..num_blocks).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn reshape(&self, index: usize) {
        self.contents[index % NUM_BUFFERS].store(index, Ordering::SeqCst);
        self.reshapes[index].fetch_add(1, Ordering::SeqCst);
    }

    fn holds(&self, index: usize) -> bool {
        self.contents[index % NUM_BUFFERS].load(Ordering::SeqCst) == index
    }
}

//The same walk a pipeline worker does, look-ahead included.
fn worker(bm: &BufferManagerMultipleThreads, ring: &Ring, num_blocks: usize) -> usize {
    let mut bad_reads = 0;
    let mut b_next = 1;
    for index in 0..num_blocks {
        if b_next < num_blocks {
            if bm.try_lock_to_reshape(b_next) {
                ring.reshape(b_next);
                bm.mark_as_reshaped(b_next);
            }
            b_next += 1;
        }
        if bm.lock_to_reshape_if_needed(index) {
            ring.reshape(index);
            bm.mark_as_reshaped(index);
        }
        bm.wait_for_reshaping(index);
        if !ring.holds(index) {
            bad_reads += 1;
        }
        thread::yield_now();
        if !ring.holds(index) {
            bad_reads += 1;
        }
        bm.mark_as_unused(index);
    }
    bad_reads
}

#[test]
fn every_block_is_reshaped_once_and_never_overwritten_in_use() {
    for &users in [2, 3, 5, 8].iter() {
        for _ in 0..20 {
            let num_blocks = 17;
            let bm = Arc::new(BufferManagerMultipleThreads::new(users));
            let ring = Arc::new(Ring::new(num_blocks));
            let start = Arc::new(Barrier::new(users));

            let handles: Vec<_> = (0..users).map(|_| {
                let bm = bm.clone();
                let ring = ring.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    worker(&bm, &ring, num_blocks)
                })
            }).collect();

            let bad_reads: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(bad_reads, 0);
            for (index, count) in ring.reshapes.iter().enumerate() {
                assert_eq!(count.load(Ordering::SeqCst), 1, "block {} with {} users", index, users);
            }
            for slot in 0..NUM_BUFFERS {
                assert_eq!(bm.slot_state(slot).1, BufferState::Free);
            }
        }
    }
}

#[test]
fn slot_is_reused_only_after_every_user_released_it() {
    let users = 4;
    let bm = Arc::new(BufferManagerMultipleThreads::new(users));
    assert_eq!(bm.max_users(), users);
    assert!(bm.lock_to_reshape_if_needed(2));
    bm.mark_as_reshaped(2);

    let next = 2 + NUM_BUFFERS;
    let claimed = Arc::new(AtomicUsize::new(0));
    let waiter = {
        let bm = bm.clone();
        let claimed = claimed.clone();
        thread::spawn(move || {
            let won = bm.lock_to_reshape_if_needed(next);
            claimed.store(1, Ordering::SeqCst);
            won
        })
    };

    for released in 1..users {
        bm.mark_as_unused(2);
        thread::sleep(::std::time::Duration::from_millis(5));
        assert_eq!(claimed.load(Ordering::SeqCst), 0, "claimed after {} releases", released);
        assert_eq!(bm.slot_state(2), (Some(2), BufferState::InUse, users - released));
    }
    bm.mark_as_unused(2);
    assert!(waiter.join().unwrap());
    assert_eq!(bm.slot_state(next), (Some(next), BufferState::BeingReshaped, 0));
}

#[test]
fn single_thread_manager_always_reshapes() {
    let bm: Box<dyn BufferManager> = Box::new(BufferManagerSingleThread::new());
    assert_eq!(bm.num_buffers(), 1);
    assert_eq!(bm.max_users(), 1);
    for index in 0..4 {
        assert!(bm.try_lock_to_reshape(index));
        assert!(bm.lock_to_reshape_if_needed(index));
        bm.mark_as_reshaped(index);
        bm.wait_for_reshaping(index);
        bm.mark_as_unused(index);
    }
}
