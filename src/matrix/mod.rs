//Public Modules
mod matrix;
mod general_stride;
mod panel_buffer;

pub use self::matrix::{Scalar,ScalarConstants};
pub use self::general_stride::{Matrix,RawMatrixMut};
pub use self::panel_buffer::{PanelBuffer};
