//! Core math modules.

pub mod beta;
pub mod density;
pub mod gamma;
pub mod stable;
pub mod summary;
