pub mod codec;

pub use codec::{decode, encode, ManifestCode, ManifestProfile};
