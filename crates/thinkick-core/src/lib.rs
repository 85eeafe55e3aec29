//! Thin-slice quadrupole kernel and the line tracker around it.
//!
//! resolver and dispatcher: the per-slice kernel
//! record, element, slicing, tracker, monitor: what feeds and exercises it

pub mod dispatcher;
pub mod element;
pub mod monitor;
pub mod record;
pub mod resolver;
pub mod slicing;
pub mod tracker;
