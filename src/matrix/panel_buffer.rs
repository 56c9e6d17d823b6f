use core::cell::UnsafeCell;
use core::slice;

use crate::matrix::Scalar;

/// Scratch storage for interleaved panels, shared by every worker of a run.
///
/// Workers carve disjoint windows out of it: transformed A is split by row
/// range, transformed B slots are handed out by a `BufferManager`. The buffer
/// itself does no bookkeeping.
pub struct PanelBuffer<T: Scalar> {
    buffer: Box<[UnsafeCell<T>]>,
}
unsafe impl<T: Scalar> Sync for PanelBuffer<T> {}

impl<T: Scalar> PanelBuffer<T> {
    pub fn new(len: usize) -> PanelBuffer<T> {
        let buffer: Vec<UnsafeCell<T>> = (0..len).map(|_| UnsafeCell::new(T::zero())).collect();
        PanelBuffer{ buffer: buffer.into_boxed_slice() }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Read-only window. The caller guarantees nobody writes it meanwhile.
    #[inline(always)]
    pub unsafe fn slice(&self, offset: usize, len: usize) -> &[T] {
        assert!(offset + len <= self.buffer.len(), "panel window out of bounds");
        slice::from_raw_parts(self.buffer.as_ptr().add(offset) as *const T, len)
    }

    /// Writable window. The caller guarantees exclusive access to it.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, offset: usize, len: usize) -> &mut [T] {
        assert!(offset + len <= self.buffer.len(), "panel window out of bounds");
        slice::from_raw_parts_mut(UnsafeCell::raw_get(self.buffer.as_ptr().add(offset)), len)
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.buffer.len();
        unsafe { self.slice_mut(0, len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_are_disjoint_views() {
        let buf: PanelBuffer<f32> = PanelBuffer::new(8);
        unsafe {
            buf.slice_mut(0, 4).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
            buf.slice_mut(4, 4).copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
            assert_eq!(buf.slice(2, 4), &[3.0, 4.0, 5.0, 6.0]);
        }
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_window_panics() {
        let buf: PanelBuffer<u8> = PanelBuffer::new(4);
        unsafe {
            buf.slice(2, 4);
        }
    }
}
