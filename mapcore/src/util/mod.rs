//! Utils which are used internally

pub mod math;
