//! Numerical primitives for the dwelling-tenure MRP workspace.

pub mod math;

pub use math::beta::*;
pub use math::density::*;
pub use math::gamma::*;
pub use math::stable::*;
pub use math::summary::*;
