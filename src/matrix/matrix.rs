use core::fmt::{Debug, Display};
use core::ops::{Add, AddAssign, Mul};

//Trait Definitions
pub trait ScalarConstants {
    fn one() -> Self;
    fn zero() -> Self;
}

/// Element types that can flow through the pipeline, either as operands or as results.
pub trait Scalar where
    Self: Add<Self, Output=Self>,
    Self: Mul<Self, Output=Self>,
    Self: AddAssign<Self>,
    Self: PartialEq,
    Self: Sized,
    Self: Copy,
    Self: Display,
    Self: Debug,
    Self: rand::Rand,
    Self: Send,
    Self: Sync,
    Self: ScalarConstants,
    Self: 'static,
{}

macro_rules! impl_scalar {
    ($t:ty, $one:expr, $zero:expr) => {
        impl ScalarConstants for $t {
            #[inline(always)]
            fn one() -> Self { $one }
            #[inline(always)]
            fn zero() -> Self { $zero }
        }
        impl Scalar for $t {}
    };
}

impl_scalar!(f32, 1.0, 0.0);
impl_scalar!(f64, 1.0, 0.0);
impl_scalar!(i8, 1, 0);
impl_scalar!(u8, 1, 0);
impl_scalar!(i32, 1, 0);
impl_scalar!(u32, 1, 0);
