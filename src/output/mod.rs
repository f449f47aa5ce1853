//! Build description model and the manifest format it is read from

pub mod manifest;
pub mod schema;

pub use manifest::parse_manifest;
pub use schema::{
    BuildDescription, Endpoint, Platform, RequiredApi, ResourceBindings, SecretBinding, Trigger,
};
