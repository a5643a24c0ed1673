//! Debounced control of the binary activity indicator.

pub mod controller;
