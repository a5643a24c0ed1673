//! Activity detection from the kernel's paging counters.

pub mod activity;
