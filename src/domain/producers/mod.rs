//! Built-in signal producers.

pub mod constant;
pub mod curve_slope;
pub mod momentum;

pub use constant::ConstantWeights;
pub use curve_slope::CurveSlope;
pub use momentum::TimeSeriesMomentum;
