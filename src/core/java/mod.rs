pub mod detect;

pub use detect::{
    detect_java_installations, find_java, required_java_for_minecraft_version, JavaInstallation,
};
