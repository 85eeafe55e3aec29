//! Per-particle physics primitives for thin-slice tracking.

pub mod drift;
pub mod multipole;
pub mod synrad;
