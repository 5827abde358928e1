//! Core domain types.

mod candidate;
mod category;
mod entity;

pub use candidate::{CandidateIndex, CandidatePair};
pub use category::Category;
pub use entity::{Entity, EntityRecord, Relationship};
