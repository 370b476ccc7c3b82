//! Covariate screening for the lek pipeline.
//!
//! Pure math library, no I/O. Flags linearly redundant covariates with a
//! Householder QR decomposition with column pivoting on the standardized
//! covariate matrix, and audits each flag with a leave-one-out re-test.

mod collinear;
mod error;
mod qr;

pub use collinear::{CollinearityScreen, HingePin, ScreenReport};
pub use error::ScreenError;
