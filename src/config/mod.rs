//! Declarative pipeline configuration.
//!
//! - [`model`] maps the TOML sections one-to-one.
//! - [`loader`] reads and parses the file.
//! - [`validate`] turns a `RawConfigFile` into a `ConfigFile`, rejecting
//!   duplicate/unknown names and cyclic graphs before any file IO.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ProjectSection, RawConfigFile, ServeSection, TaskConfig, TransformConfig,
};
