//! Linux bindings for the counter source (procfs) and indicator sink (sysfs GPIO).

pub mod gpio;
pub mod vmstat;
