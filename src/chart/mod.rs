//! Chart descriptions: what to draw, independent of how it is rendered.

pub mod builder;
pub mod model;
