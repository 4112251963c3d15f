//! # Composition
//!
//! Plans which source feeds each span of the output timeline and drives the
//! media backend to render it.

pub mod engine;
pub mod plan;

// Re-exports for convenience
pub use engine::Compositor;
pub use plan::{InsertionPlan, OverlapPolicy, Placement, Segment, SegmentSource};
