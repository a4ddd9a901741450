pub mod abi;
pub mod config;
pub mod dependencies;
pub mod drift;
pub mod error;
pub mod gradle;
pub mod packages;
pub mod plan;
pub mod properties;
pub mod resolver;
pub mod signing;
pub mod cli;

pub use error::ResolveError;
pub use plan::BuildPlan;
pub use resolver::ManifestResolver;
