//! Domain layer - pure business types with no I/O.

pub mod foundation;
pub mod subscription;
