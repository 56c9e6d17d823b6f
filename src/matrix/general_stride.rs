use crate::matrix::Scalar;

/// A general stride matrix with `batches` and `multis` stacked behind it.
///
/// Batches share B; multis are fully independent problems. The default
/// layout is column major, like BLAS.
pub struct Matrix<T: Scalar> {
    height: usize,
    width: usize,
    batches: usize,
    multis: usize,

    row_stride: usize,
    column_stride: usize,
    batch_stride: usize,
    multi_stride: usize,

    buffer: Vec<T>,
}
impl<T: Scalar> Matrix<T> {
    pub fn new(h: usize, w: usize) -> Matrix<T> {
        Matrix::new_batched(h, w, 1, 1)
    }

    pub fn new_batched(h: usize, w: usize, batches: usize, multis: usize) -> Matrix<T> {
        let batch_stride = h * w;
        let multi_stride = batch_stride * batches;
        Matrix{ height: h, width: w,
                batches: batches, multis: multis,
                row_stride: 1, column_stride: h,
                batch_stride: batch_stride, multi_stride: multi_stride,
                buffer: vec![T::zero(); multi_stride * multis] }
    }

    /// Same shape, but rows are contiguous.
    pub fn new_row_major(h: usize, w: usize, batches: usize, multis: usize) -> Matrix<T> {
        let mut m = Matrix::new_batched(h, w, batches, multis);
        m.row_stride = w;
        m.column_stride = 1;
        m
    }

    #[inline(always)] pub fn height(&self) -> usize { self.height }
    #[inline(always)] pub fn width(&self) -> usize { self.width }
    #[inline(always)] pub fn batches(&self) -> usize { self.batches }
    #[inline(always)] pub fn multis(&self) -> usize { self.multis }
    #[inline(always)] pub fn get_row_stride(&self) -> usize { self.row_stride }
    #[inline(always)] pub fn get_column_stride(&self) -> usize { self.column_stride }

    /// Swap the roles of rows and columns without moving any data.
    pub fn transpose(&mut self) {
        ::core::mem::swap(&mut self.height, &mut self.width);
        ::core::mem::swap(&mut self.row_stride, &mut self.column_stride);
    }

    #[inline(always)]
    fn offset(&self, multi: usize, batch: usize, y: usize, x: usize) -> usize {
        debug_assert!(multi < self.multis && batch < self.batches);
        debug_assert!(y < self.height && x < self.width);
        multi * self.multi_stride + batch * self.batch_stride + y * self.row_stride + x * self.column_stride
    }

    #[inline(always)]
    pub fn get(&self, y: usize, x: usize) -> T {
        self.buffer[self.offset(0, 0, y, x)]
    }
    #[inline(always)]
    pub fn set(&mut self, y: usize, x: usize, alpha: T) {
        let off = self.offset(0, 0, y, x);
        self.buffer[off] = alpha;
    }
    #[inline(always)]
    pub fn get_at(&self, multi: usize, batch: usize, y: usize, x: usize) -> T {
        self.buffer[self.offset(multi, batch, y, x)]
    }
    #[inline(always)]
    pub fn set_at(&mut self, multi: usize, batch: usize, y: usize, x: usize, alpha: T) {
        let off = self.offset(multi, batch, y, x);
        self.buffer[off] = alpha;
    }

    pub fn fill_rand(&mut self) {
        for v in self.buffer.iter_mut() {
            *v = rand::random::<T>();
        }
    }

    pub fn fill_zero(&mut self) {
        for v in self.buffer.iter_mut() {
            *v = T::zero();
        }
    }

    pub fn fill_with<F: FnMut(usize, usize, usize, usize) -> T>(&mut self, mut f: F) {
        for multi in 0..self.multis {
            for batch in 0..self.batches {
                for x in 0..self.width {
                    for y in 0..self.height {
                        let off = self.offset(multi, batch, y, x);
                        self.buffer[off] = f(multi, batch, y, x);
                    }
                }
            }
        }
    }

    /// Raw, shareable handle used to write disjoint regions from several threads.
    pub fn raw_mut(&mut self) -> RawMatrixMut<T> {
        RawMatrixMut{ buffer: self.buffer.as_mut_ptr(),
                      height: self.height, width: self.width,
                      batches: self.batches, multis: self.multis,
                      row_stride: self.row_stride, column_stride: self.column_stride,
                      batch_stride: self.batch_stride, multi_stride: self.multi_stride }
    }
}

/// Unchecked alias of a `Matrix` buffer.
///
/// Only valid while the `Matrix` it came from is mutably borrowed; every
/// writer must own a disjoint set of rows.
pub struct RawMatrixMut<T: Scalar> {
    buffer: *mut T,
    height: usize,
    width: usize,
    batches: usize,
    multis: usize,
    row_stride: usize,
    column_stride: usize,
    batch_stride: usize,
    multi_stride: usize,
}
unsafe impl<T: Scalar> Send for RawMatrixMut<T> {}
unsafe impl<T: Scalar> Sync for RawMatrixMut<T> {}

impl<T: Scalar> RawMatrixMut<T> {
    #[inline(always)] pub fn height(&self) -> usize { self.height }
    #[inline(always)] pub fn width(&self) -> usize { self.width }

    #[inline(always)]
    fn offset(&self, multi: usize, batch: usize, y: usize, x: usize) -> isize {
        debug_assert!(multi < self.multis && batch < self.batches);
        debug_assert!(y < self.height && x < self.width);
        (multi * self.multi_stride + batch * self.batch_stride + y * self.row_stride + x * self.column_stride) as isize
    }

    #[inline(always)]
    pub unsafe fn get_at(&self, multi: usize, batch: usize, y: usize, x: usize) -> T {
        ::core::ptr::read(self.buffer.offset(self.offset(multi, batch, y, x)))
    }

    #[inline(always)]
    pub unsafe fn set_at(&self, multi: usize, batch: usize, y: usize, x: usize, alpha: T) {
        ::core::ptr::write(self.buffer.offset(self.offset(multi, batch, y, x)), alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_agree() {
        let mut cm: Matrix<f32> = Matrix::new_batched(3, 5, 2, 2);
        let mut rm: Matrix<f32> = Matrix::new_row_major(3, 5, 2, 2);
        let f = |m: usize, b: usize, y: usize, x: usize| (m * 1000 + b * 100 + y * 10 + x) as f32;
        cm.fill_with(f);
        rm.fill_with(f);
        for m in 0..2 {
            for b in 0..2 {
                for y in 0..3 {
                    for x in 0..5 {
                        assert_eq!(cm.get_at(m, b, y, x), rm.get_at(m, b, y, x));
                    }
                }
            }
        }
        assert_eq!(cm.get_column_stride(), 3);
        assert_eq!(rm.get_row_stride(), 5);
    }

    #[test]
    fn transpose_swaps_view() {
        let mut a: Matrix<i32> = Matrix::new(2, 4);
        a.fill_with(|_, _, y, x| (y * 4 + x) as i32);
        a.transpose();
        assert_eq!(a.height(), 4);
        assert_eq!(a.width(), 2);
        assert_eq!(a.get(3, 1), 7);
    }

    #[test]
    fn raw_alias_writes_through() {
        let mut c: Matrix<u32> = Matrix::new_batched(2, 2, 2, 1);
        {
            let raw = c.raw_mut();
            unsafe {
                raw.set_at(0, 1, 1, 0, 9);
                assert_eq!(raw.get_at(0, 1, 1, 0), 9);
            }
        }
        assert_eq!(c.get_at(0, 1, 1, 0), 9);
    }
}
