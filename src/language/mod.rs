//! Language profiles and the registry that resolves them by id

mod profile;
mod registry;

pub use profile::{LanguageProfile, SOURCE_FILE_STEM};
pub use registry::LanguageRegistry;
