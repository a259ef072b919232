mod contracts;
mod manifest;
mod version;

pub use contracts::{InstalledContent, InstalledPack, ManifestProvider, Provenance, TargetLookup};
pub use manifest::{ManifestError, PackDefinition, PageDefinition};
pub use version::{compare_versions, parse_version, PackVersion, VersionParseError};
