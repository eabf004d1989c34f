//! Project bundling: exclusion policy, archive creation, content hashing.

mod archive;
mod exclude;

pub use archive::{BundleInfo, BundleProgress, create_bundle, hash_archive};
pub use exclude::ExclusionPolicy;
