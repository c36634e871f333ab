//! Feature slices

pub mod dsa;
