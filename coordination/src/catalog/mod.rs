//! Skill Catalog — declared agent capabilities
//!
//! Skills are tag-scoped fixing capabilities; agents bundle skills into
//! fixing personas. The catalog is built once at startup and never mutated.

pub mod registry;
pub mod types;

pub use registry::{CatalogError, CatalogResult, SkillCatalog};
pub use types::{Agent, Skill, SkillCategory};
