//! CLI command implementations

pub mod backup;
pub mod locate;
pub mod version;
