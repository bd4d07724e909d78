//! Small self-contained helpers shared by the Glint crates.

pub mod utf8;
