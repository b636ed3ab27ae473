//! Visibility determination: occlusion queries, pipeline statistics and LOD selection

pub mod occlusion_query;
pub mod statistics_query;
pub mod lod;

pub use occlusion_query::{OcclusionError, OcclusionQuery, OcclusionResult, QueryOutcome, OCCLUSION_PREDICATE_OP};
pub use statistics_query::StatisticsQuery;
pub use lod::LodSelector;
