//! Panel interleaving and the write-back of finished tiles.

use crate::matrix::{Matrix, RawMatrixMut, Scalar};
use crate::util::round_up;

/// Pack `A[y0..ymax][k0..kmax]` into panels of `height` rows.
///
/// Each panel holds `kern_k * height` values laid out `[k][row]`, where
/// `kern_k` is the depth rounded up to `k_unroll`. Rows past `ymax` and depth
/// past `kmax` are zero.
pub fn interleave_a<T: Scalar>(out: &mut [T], a: &Matrix<T>, multi: usize, batch: usize,
                               y0: usize, ymax: usize, k0: usize, kmax: usize,
                               height: usize, k_unroll: usize) {
    let kern_k = round_up(kmax - k0, k_unroll);
    let panels = round_up(ymax - y0, height) / height;
    debug_assert!(out.len() >= panels * height * kern_k);

    for panel in 0..panels {
        let p = &mut out[panel * height * kern_k..(panel + 1) * height * kern_k];
        let row0 = y0 + panel * height;
        for kk in 0..kern_k {
            for i in 0..height {
                let y = row0 + i;
                let k = k0 + kk;
                p[kk * height + i] = if y < ymax && k < kmax {
                    a.get_at(multi, batch, y, k)
                } else {
                    T::zero()
                };
            }
        }
    }
}

/// Pack `B[k0..kmax][x0..xmax]` into panels of `width` columns, `[k][column]`.
pub fn interleave_b<T: Scalar>(out: &mut [T], b: &Matrix<T>, multi: usize,
                               x0: usize, xmax: usize, k0: usize, kmax: usize,
                               width: usize, k_unroll: usize) {
    let kern_k = round_up(kmax - k0, k_unroll);
    let panels = round_up(xmax - x0, width) / width;
    debug_assert!(out.len() >= panels * width * kern_k);

    for panel in 0..panels {
        let p = &mut out[panel * width * kern_k..(panel + 1) * width * kern_k];
        let col0 = x0 + panel * width;
        for kk in 0..kern_k {
            for j in 0..width {
                let x = col0 + j;
                let k = k0 + kk;
                p[kk * width + j] = if x < xmax && k < kmax {
                    b.get_at(multi, 0, k, x)
                } else {
                    T::zero()
                };
            }
        }
    }
}

/// Write a row of tiles back into C.
///
/// `tile` holds one `height x width` row-major tile per B panel. When `beta`
/// is zero C is never read.
pub unsafe fn merge<T: Scalar>(c: &RawMatrixMut<T>, tile: &[T], multi: usize, batch: usize,
                               y0: usize, ymax: usize, x0: usize, xmax: usize,
                               height: usize, width: usize, alpha: T, beta: T) {
    debug_assert!(ymax - y0 <= height);
    let read_c = beta != T::zero();
    for col in 0..xmax - x0 {
        let (panel, j) = (col / width, col % width);
        for i in 0..ymax - y0 {
            let acc = tile[panel * height * width + i * width + j];
            let (y, x) = (y0 + i, x0 + col);
            let v = if read_c {
                alpha * acc + beta * c.get_at(multi, batch, y, x)
            } else {
                alpha * acc
            };
            c.set_at(multi, batch, y, x, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_panels_pad_rows_and_depth() {
        let mut a: Matrix<i32> = Matrix::new(3, 3);
        a.fill_with(|_, _, y, x| (10 * y + x) as i32);
        let mut out = vec![-1; 2 * 4];
        interleave_a(&mut out, &a, 0, 0, 1, 3, 1, 3, 2, 4);
        // rows 1,2 and k 1,2, padded to k_unroll 4.
        assert_eq!(out, vec![11, 21, 12, 22, 0, 0, 0, 0]);
    }

    #[test]
    fn b_panels_pad_columns() {
        let mut b: Matrix<i32> = Matrix::new(2, 3);
        b.fill_with(|_, _, y, x| (10 * y + x) as i32);
        let mut out = vec![-1; 2 * 2 * 2];
        interleave_b(&mut out, &b, 0, 0, 3, 0, 2, 2, 1);
        assert_eq!(out, vec![0, 1, 10, 11, 2, 0, 12, 0]);
    }

    #[test]
    fn merge_applies_alpha_and_beta() {
        let mut c: Matrix<f32> = Matrix::new(2, 3);
        c.fill_with(|_, _, _, _| 1.0);
        let tile = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        unsafe {
            merge(&c.raw_mut(), &tile, 0, 0, 0, 2, 0, 3, 2, 2, 2.0, 0.5);
        }
        assert_eq!(c.get(0, 0), 2.5);
        assert_eq!(c.get(1, 1), 8.5);
        assert_eq!(c.get(0, 2), 10.5);
        assert_eq!(c.get(1, 2), 14.5);
    }

    #[test]
    fn zero_beta_ignores_old_c() {
        let mut c: Matrix<f32> = Matrix::new(1, 1);
        c.set(0, 0, ::std::f32::NAN);
        unsafe {
            merge(&c.raw_mut(), &[3.0], 0, 0, 0, 1, 0, 1, 1, 1, 1.0, 0.0);
        }
        assert_eq!(c.get(0, 0), 3.0);
    }
}
