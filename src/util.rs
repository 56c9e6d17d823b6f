use std::time::Instant;

use crate::matrix::{Matrix, Scalar};

#[inline(always)]
pub fn iceildiv(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

#[inline(always)]
pub fn round_up(a: usize, b: usize) -> usize {
    iceildiv(a, b) * b
}

/// Naive `C = alpha*A*B + beta*C` over every multi and batch. B is shared by batches.
pub fn reference_gemm<TIn, TOut>(a: &Matrix<TIn>, b: &Matrix<TIn>, c: &mut Matrix<TOut>, alpha: TOut, beta: TOut)
    where TIn: Scalar + Into<TOut>, TOut: Scalar
{
    for multi in 0..c.multis() {
        for batch in 0..c.batches() {
            for x in 0..c.width() {
                for y in 0..c.height() {
                    let mut acc = TOut::zero();
                    for z in 0..a.width() {
                        let av: TOut = a.get_at(multi, batch, y, z).into();
                        let bv: TOut = b.get_at(multi, 0, z, x).into();
                        acc += av * bv;
                    }
                    let t = if beta == TOut::zero() {
                        alpha * acc
                    } else {
                        alpha * acc + beta * c.get_at(multi, batch, y, x)
                    };
                    c.set_at(multi, batch, y, x, t);
                }
            }
        }
    }
}

/// Largest absolute elementwise difference between two f32 matrices of the same shape.
pub fn max_abs_diff(x: &Matrix<f32>, y: &Matrix<f32>) -> f32 {
    assert!(x.height() == y.height() && x.width() == y.width(), "Cannot compare nonconformal matrices!");
    let mut worst = 0.0f32;
    for multi in 0..x.multis() {
        for batch in 0..x.batches() {
            for col in 0..x.width() {
                for row in 0..x.height() {
                    let d = (x.get_at(multi, batch, row, col) - y.get_at(multi, batch, row, col)).abs();
                    worst = worst.max(d);
                }
            }
        }
    }
    worst
}

pub fn dur_seconds(start: Instant) -> f64 {
    let dur = start.elapsed();
    let time_secs = dur.as_secs() as f64;
    let time_nanos = dur.subsec_nanos() as f64;
    time_nanos / 1E9 + time_secs
}

pub fn gflops(m: usize, n: usize, k: usize, seconds: f64) -> f64 {
    let nflops = (m * n * k) as f64;
    2.0 * nflops / seconds / 1E9
}

#[cfg(feature = "hwloc")]
pub fn pin_to_core(core: usize) {
    use hwloc::{Topology, CPUBIND_THREAD, ObjectType};
    let mut topo = Topology::new();
    let tid = unsafe { libc::pthread_self() };

    let bind_to = {
        let cores = match topo.objects_with_type(&ObjectType::Core) {
            Ok(cores) => cores,
            Err(_) => return,
        };
        match cores.get(core) {
            Some(val) => match val.cpuset() {
                Some(set) => set,
                None => return,
            },
            None => {
                warn!("no core found with id {}", core);
                return;
            }
        }
    };
    if topo.set_cpubind_for_thread(tid, bind_to, CPUBIND_THREAD).is_err() {
        warn!("could not bind thread to core {}", core);
    }
}

#[cfg(not(feature = "hwloc"))]
pub fn pin_to_core(_core: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_helpers() {
        assert_eq!(iceildiv(37, 8), 5);
        assert_eq!(iceildiv(40, 8), 5);
        assert_eq!(round_up(37, 8), 40);
        assert_eq!(round_up(0, 8), 0);
    }

    #[test]
    fn reference_gemm_small() {
        let mut a: Matrix<i8> = Matrix::new(2, 3);
        let mut b: Matrix<i8> = Matrix::new(3, 2);
        let mut c: Matrix<i32> = Matrix::new(2, 2);
        a.fill_with(|_, _, y, x| (y * 3 + x) as i8);
        b.fill_with(|_, _, y, x| (y * 2 + x) as i8);
        reference_gemm(&a, &b, &mut c, 1, 0);
        // [[0,1,2],[3,4,5]] * [[0,1],[2,3],[4,5]]
        assert_eq!(c.get(0, 0), 10);
        assert_eq!(c.get(0, 1), 13);
        assert_eq!(c.get(1, 0), 28);
        assert_eq!(c.get(1, 1), 40);
    }
}
