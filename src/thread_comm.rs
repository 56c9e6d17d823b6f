use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identity of a worker inside one `run()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    thread_id: usize,
    num_threads: usize,
}
impl ThreadInfo {
    pub fn new(thread_id: usize, num_threads: usize) -> ThreadInfo {
        ThreadInfo { thread_id: thread_id, num_threads: num_threads }
    }
    pub fn single_thread() -> ThreadInfo {
        ThreadInfo::new(0, 1)
    }
    #[inline(always)] pub fn thread_id(&self) -> usize { self.thread_id }
    #[inline(always)] pub fn num_threads(&self) -> usize { self.num_threads }
}

/// Lifecycle of one transformed-B slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferState {
    Free,
    BeingReshaped,
    InUse,
}

/// Coordinates reuse of the transformed-B ring between workers.
///
/// Every method takes the logical block index; which physical slot it lands
/// in is up to the implementation.
pub trait BufferManager: Send + Sync {
    fn num_buffers(&self) -> usize;

    /// Releases each logical index waits for before its slot is free again.
    fn max_users(&self) -> usize;

    /// True for exactly one caller per logical index: the one that must reshape it.
    /// Blocks while the slot still serves a different index.
    fn lock_to_reshape_if_needed(&self, index: usize) -> bool;

    /// Like `lock_to_reshape_if_needed`, but gives up instead of blocking.
    fn try_lock_to_reshape(&self, index: usize) -> bool;

    fn mark_as_reshaped(&self, index: usize);

    fn wait_for_reshaping(&self, index: usize);

    fn mark_as_unused(&self, index: usize);
}

pub const NUM_BUFFERS: usize = 3;

struct SlotState {
    index: Option<usize>,
    state: BufferState,
}

struct Buffer {
    slot: Mutex<SlotState>,
    //Consumers that still have to release the slot.
    //Only meaningful while the slot is InUse.
    users: AtomicUsize,
    sem: Condvar,
}
impl Buffer {
    fn new() -> Buffer {
        Buffer {
            slot: Mutex::new(SlotState { index: None, state: BufferState::Free }),
            users: AtomicUsize::new(0),
            sem: Condvar::new(),
        }
    }

    //A panicking worker must not wedge the others; the state is plain data.
    fn lock(&self) -> MutexGuard<SlotState> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SlotState>) -> MutexGuard<'a, SlotState> {
        self.sem.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ring of `NUM_BUFFERS` slots shared by `max_users` workloads.
pub struct BufferManagerMultipleThreads {
    buffers: [Buffer; NUM_BUFFERS],
    max_users: usize,
}

impl BufferManagerMultipleThreads {
    /// `max_users` is the number of workloads that visit every logical index.
    pub fn new(max_users: usize) -> BufferManagerMultipleThreads {
        debug_assert!(max_users > 0);
        BufferManagerMultipleThreads {
            buffers: [Buffer::new(), Buffer::new(), Buffer::new()],
            max_users: max_users,
        }
    }

    #[inline(always)]
    fn buffer(&self, index: usize) -> &Buffer {
        &self.buffers[index % NUM_BUFFERS]
    }

    /// Current `(index, state, users)` of the slot `index` maps to.
    pub fn slot_state(&self, index: usize) -> (Option<usize>, BufferState, usize) {
        let buf = self.buffer(index);
        let s = buf.lock();
        (s.index, s.state, buf.users.load(Ordering::Acquire))
    }

    //Decides under the slot lock. None means "busy with another index".
    fn claim(s: &mut SlotState, index: usize) -> Option<bool> {
        if s.state == BufferState::Free {
            s.index = Some(index);
            s.state = BufferState::BeingReshaped;
            return Some(true);
        }
        if s.index == Some(index) {
            return Some(false);
        }
        None
    }
}

impl BufferManager for BufferManagerMultipleThreads {
    fn num_buffers(&self) -> usize {
        NUM_BUFFERS
    }

    fn max_users(&self) -> usize {
        self.max_users
    }

    fn lock_to_reshape_if_needed(&self, index: usize) -> bool {
        let buf = self.buffer(index);
        let mut s = buf.lock();
        loop {
            match BufferManagerMultipleThreads::claim(&mut s, index) {
                Some(won) => {
                    if won {
                        trace!("slot {}: claimed for block {}", index % NUM_BUFFERS, index);
                    }
                    return won;
                }
                None => s = buf.wait(s),
            }
        }
    }

    fn try_lock_to_reshape(&self, index: usize) -> bool {
        let buf = self.buffer(index);
        let mut s = match buf.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let won = BufferManagerMultipleThreads::claim(&mut s, index) == Some(true);
        if won {
            trace!("slot {}: claimed ahead for block {}", index % NUM_BUFFERS, index);
        }
        won
    }

    fn mark_as_reshaped(&self, index: usize) {
        let buf = self.buffer(index);
        {
            let mut s = buf.lock();
            debug_assert_eq!(s.index, Some(index));
            debug_assert_eq!(s.state, BufferState::BeingReshaped);
            buf.users.store(self.max_users, Ordering::Release);
            s.state = BufferState::InUse;
        }
        trace!("slot {}: block {} ready for {} users", index % NUM_BUFFERS, index, self.max_users);
        buf.sem.notify_all();
    }

    fn wait_for_reshaping(&self, index: usize) {
        let buf = self.buffer(index);
        let mut s = buf.lock();
        //Our own release is still pending, so the slot cannot move on to another index.
        debug_assert_eq!(s.index, Some(index));
        while !(s.state == BufferState::InUse && s.index == Some(index)) {
            s = buf.wait(s);
        }
    }

    fn mark_as_unused(&self, index: usize) {
        let buf = self.buffer(index);
        let prev = buf.users.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "block {} released more often than it was handed out", index);
        if prev == 1 {
            {
                let mut s = buf.lock();
                debug_assert_eq!(s.index, Some(index));
                s.state = BufferState::Free;
            }
            trace!("slot {}: block {} released", index % NUM_BUFFERS, index);
            buf.sem.notify_all();
        }
    }
}

/// Used when a single worker touches every block: nothing to coordinate.
#[derive(Default)]
pub struct BufferManagerSingleThread;

impl BufferManagerSingleThread {
    pub fn new() -> BufferManagerSingleThread {
        BufferManagerSingleThread
    }
}

impl BufferManager for BufferManagerSingleThread {
    fn num_buffers(&self) -> usize { 1 }
    fn max_users(&self) -> usize { 1 }
    fn lock_to_reshape_if_needed(&self, _index: usize) -> bool { true }
    fn try_lock_to_reshape(&self, _index: usize) -> bool { true }
    fn mark_as_reshaped(&self, _index: usize) {}
    fn wait_for_reshaping(&self, _index: usize) {}
    fn mark_as_unused(&self, _index: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn exactly_one_thread_reshapes() {
        for index in 0..6 {
            let bm = Arc::new(BufferManagerMultipleThreads::new(8));
            let winners = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..8).map(|_| {
                let bm = bm.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    if bm.lock_to_reshape_if_needed(index) {
                        winners.fetch_add(1, Ordering::SeqCst);
                        bm.mark_as_reshaped(index);
                    }
                    bm.wait_for_reshaping(index);
                    bm.mark_as_unused(index);
                })
            }).collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert_eq!(bm.slot_state(index).1, BufferState::Free);
        }
    }

    #[test]
    fn slot_frees_after_last_release() {
        let bm = BufferManagerMultipleThreads::new(3);
        assert_eq!(bm.max_users(), 3);
        assert!(bm.lock_to_reshape_if_needed(4));
        assert!(!bm.lock_to_reshape_if_needed(4));
        bm.mark_as_reshaped(4);
        assert_eq!(bm.slot_state(4), (Some(4), BufferState::InUse, 3));

        bm.mark_as_unused(4);
        assert_eq!(bm.slot_state(4).1, BufferState::InUse);
        bm.mark_as_unused(4);
        assert_eq!(bm.slot_state(4), (Some(4), BufferState::InUse, 1));
        bm.mark_as_unused(4);
        assert_eq!(bm.slot_state(4).1, BufferState::Free);
    }

    #[test]
    fn try_lock_never_steals_a_busy_slot() {
        let bm = BufferManagerMultipleThreads::new(1);
        assert!(bm.try_lock_to_reshape(1));
        // Same slot, different logical block.
        assert!(!bm.try_lock_to_reshape(1 + NUM_BUFFERS));
        // Same block, already claimed.
        assert!(!bm.try_lock_to_reshape(1));
        bm.mark_as_reshaped(1);
        bm.mark_as_unused(1);
        assert!(bm.try_lock_to_reshape(1 + NUM_BUFFERS));
    }

    #[test]
    fn waiting_for_a_different_index_blocks_until_free() {
        let bm = Arc::new(BufferManagerMultipleThreads::new(1));
        assert!(bm.lock_to_reshape_if_needed(0));
        bm.mark_as_reshaped(0);

        let waiter = {
            let bm = bm.clone();
            thread::spawn(move || bm.lock_to_reshape_if_needed(NUM_BUFFERS))
        };
        thread::sleep(::std::time::Duration::from_millis(20));
        assert_eq!(bm.slot_state(0).0, Some(0));
        bm.mark_as_unused(0);
        assert!(waiter.join().unwrap());
        assert_eq!(bm.slot_state(NUM_BUFFERS), (Some(NUM_BUFFERS), BufferState::BeingReshaped, 0));
    }

    #[test]
    fn single_thread_manager_is_inert() {
        let bm = BufferManagerSingleThread::new();
        assert_eq!(bm.num_buffers(), 1);
        assert_eq!(bm.max_users(), 1);
        assert!(bm.lock_to_reshape_if_needed(7));
        assert!(bm.lock_to_reshape_if_needed(7));
        bm.mark_as_reshaped(7);
        bm.wait_for_reshaping(7);
        bm.mark_as_unused(7);
    }
}
