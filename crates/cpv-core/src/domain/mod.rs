//! Domain layer

pub mod taxonomy;
