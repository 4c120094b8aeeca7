//! Backup stages
//!
//! Init → DestinationCheck → SnapshotRequested → SnapshotHashed →
//! ResourcesArchived → ResourcesHashed → BundleBuilt → BundleHashed → Upload

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Resolve and validate store connection parameters
    Init,
    /// Confirm the remote destination is usable
    DestinationCheck,
    /// Write the store snapshot
    SnapshotRequested,
    SnapshotHashed,
    /// Archive the static pod resource directories
    ResourcesArchived,
    ResourcesHashed,
    /// Archive the whole working directory
    BundleBuilt,
    BundleHashed,
    Upload,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Init,
        Stage::DestinationCheck,
        Stage::SnapshotRequested,
        Stage::SnapshotHashed,
        Stage::ResourcesArchived,
        Stage::ResourcesHashed,
        Stage::BundleBuilt,
        Stage::BundleHashed,
        Stage::Upload,
    ];

    /// The stage that follows, `None` after the last
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::DestinationCheck),
            Stage::DestinationCheck => Some(Stage::SnapshotRequested),
            Stage::SnapshotRequested => Some(Stage::SnapshotHashed),
            Stage::SnapshotHashed => Some(Stage::ResourcesArchived),
            Stage::ResourcesArchived => Some(Stage::ResourcesHashed),
            Stage::ResourcesHashed => Some(Stage::BundleBuilt),
            Stage::BundleBuilt => Some(Stage::BundleHashed),
            Stage::BundleHashed => Some(Stage::Upload),
            Stage::Upload => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::DestinationCheck => "destination-check",
            Stage::SnapshotRequested => "snapshot-requested",
            Stage::SnapshotHashed => "snapshot-hashed",
            Stage::ResourcesArchived => "resources-archived",
            Stage::ResourcesHashed => "resources-hashed",
            Stage::BundleBuilt => "bundle-built",
            Stage::BundleHashed => "bundle-hashed",
            Stage::Upload => "upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_walks_all_stages_in_order() {
        let mut walked = vec![Stage::Init];
        while let Some(next) = walked.last().and_then(Stage::next) {
            walked.push(next);
        }
        assert_eq!(walked, Stage::ALL.to_vec());
    }

    #[test]
    fn test_display_matches_serde() {
        for stage in Stage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }
}
