pub mod model;
pub mod registry;

pub use model::{LoaderType, Profile};
pub use registry::{NewProfile, ProfileRegistry, ProfileUpdate};
