extern crate interleave;

use std::time::Instant;

use interleave::{CpuInfo, GemmArgs, GemmInterleaved, Matrix, get_compatible_kernels};
use interleave::util;

fn test_shape(m: usize, n: usize, k: usize, n_threads: usize, pretranspose_b: bool,
              flusher: &mut Vec<f64>, n_reps: usize) -> (f64, f32, &'static str)
{
    let mut best_time: f64 = 9999999999.0;
    let mut worst_err: f32 = 0.0;
    let mut name = "";

    for _ in 0..n_reps {
        let mut a: Matrix<f32> = Matrix::new(m, k);
        let mut b: Matrix<f32> = Matrix::new(k, n);
        let mut c: Matrix<f32> = Matrix::new(m, n);
        let mut c_ref: Matrix<f32> = Matrix::new(m, n);
        a.fill_rand(); b.fill_rand(); c.fill_zero(); c_ref.fill_zero();

        //Read a buffer so that A, B, and C are cold in cache.
        for i in flusher.iter_mut() { *i += 1.0; }

        let args = GemmArgs::new(CpuInfo::get(), m, n, k).max_threads(n_threads);
        let start = Instant::now();
        {
            let mut gemm = match GemmInterleaved::configure(args, &a, &b, &mut c, 1.0, 0.0, pretranspose_b) {
                Ok(gemm) => gemm,
                Err(e) => {
                    eprintln!("{}x{}x{}: {}", m, n, k, e);
                    return (0.0, 0.0, "none");
                }
            };
            gemm.run();
            name = gemm.kernel_name();
        }
        best_time = best_time.min(util::dur_seconds(start));

        util::reference_gemm(&a, &b, &mut c_ref, 1.0, 0.0);
        worst_err = worst_err.max(util::max_abs_diff(&c, &c_ref));
    }
    (best_time, worst_err, name)
}

fn main() {
    let n_threads = CpuInfo::get().num_cpus();

    let flusher_len = 2*1024*1024; //16MB
    let mut flusher: Vec<f64> = vec![0.0; flusher_len];

    let probe = GemmArgs::new(CpuInfo::get(), 512, 512, 512).max_threads(n_threads);
    for d in get_compatible_kernels::<f32, f32>(&probe) {
        println!("# {}\t{}\t{}\t{}", d.method, d.name, d.cycle_estimate, if d.is_default { "*" } else { "" });
    }

    for index in 1..17 {
        let size = index*32;
        let shapes = [(size, size, size), (8, size * 4, size), (size * 4, 12, size)];
        for &(m, n, k) in shapes.iter() {
            let n_reps = 4;
            let (otf_time, otf_err, name) = test_shape(m, n, k, n_threads, false, &mut flusher, n_reps);
            let (pre_time, pre_err, _) = test_shape(m, n, k, n_threads, true, &mut flusher, n_reps);

            println!("{}\t{}\t{}\t{}\t{:.3}\t{:.3}\t{:e}\t{:e}",
                     m, n, k, name,
                     util::gflops(m, n, k, otf_time),
                     util::gflops(m, n, k, pre_time),
                     otf_err, pre_err);
        }
    }

    let sum: f64 = flusher.iter().sum();
    println!("Flush value {}", sum);
}
