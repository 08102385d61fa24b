//! Schema 1 image manifests and the metadata they carry.
//!
//! A schema 1 manifest lists the image's layers in `fsLayers` and, in parallel, a
//! `history` of JSON documents in the legacy `v1Compatibility` format. The first history
//! entry describes the image as a whole: when it was created, by which docker version,
//! and the container configuration.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Media type of a signed schema 1 manifest.
pub const MEDIA_TYPE_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Media type of an unsigned schema 1 manifest.
pub const MEDIA_TYPE_UNSIGNED: &str = "application/vnd.docker.distribution.manifest.v1+json";

/// Old registries serve schema 1 manifests as plain JSON.
pub const MEDIA_TYPE_JSON: &str = "application/json";

/// Every media type under which a schema 1 manifest may be served.
pub const SCHEMA1_MEDIA_TYPES: [&str; 3] =
    [MEDIA_TYPE_SIGNED, MEDIA_TYPE_UNSIGNED, MEDIA_TYPE_JSON];

/// The media type of a `Content-Type` header value, without parameters.
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(media_type, _)| media_type)
        .trim()
}

/// True for the media types of schema 1 manifests.
pub fn is_schema1(media_type: &str) -> bool {
    SCHEMA1_MEDIA_TYPES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(media_type))
}

/// A schema 1 manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedManifest {
    /// Always 1 for the manifests understood here.
    #[serde(default)]
    pub schema_version: Option<u32>,

    /// Layer digests, as listed in the manifest.
    #[serde(default)]
    pub fs_layers: Vec<FsLayer>,

    /// Per-layer compatibility records, parallel to `fs_layers`.
    #[serde(default)]
    pub history: Vec<History>,
}

/// One layer of a schema 1 manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    /// Digest of the layer blob.
    pub blob_sum: Digest,
}

/// One history entry of a schema 1 manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Legacy image configuration, a JSON document embedded as a string.
    pub v1_compatibility: String,
}

impl SignedManifest {
    /// Parse a manifest body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Parse the compatibility record describing the image.
    pub fn compatibility(&self) -> Result<Compatibility, String> {
        let history = self
            .history
            .first()
            .ok_or_else(|| "manifest has no history".to_owned())?;

        serde_json::from_str(&history.v1_compatibility)
            .map_err(|error| format!("invalid v1Compatibility: {error}"))
    }
}

/// The image-level fields of a `v1Compatibility` record.
#[derive(Debug, Clone, Deserialize)]
pub struct Compatibility {
    /// When the image was built.
    pub created: DateTime<Utc>,

    /// The docker version which built the image.
    #[serde(default)]
    pub docker_version: Option<String>,

    /// Container configuration.
    #[serde(default)]
    pub config: Option<ContainerConfig>,
}

/// The container configuration recorded in a `v1Compatibility` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    /// Ports, as `port/protocol` keys.
    #[serde(rename = "ExposedPorts", default)]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,

    /// Volume mount points, as keys.
    #[serde(rename = "Volumes", default)]
    pub volumes: Option<BTreeMap<String, serde_json::Value>>,

    /// The entry point command.
    #[serde(rename = "EntryPoint", alias = "Entrypoint", default)]
    pub entry_point: Option<Vec<String>>,

    /// The user the container runs as.
    #[serde(rename = "User", default)]
    pub user: Option<String>,
}

/// Metadata for one tag of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    /// When the image was built.
    pub created: DateTime<Utc>,

    /// The docker version which built the image, or empty.
    pub docker_version: String,

    /// The entry point command.
    pub entry_point: Vec<String>,

    /// Exposed ports, e.g. `80/tcp`.
    pub exposed_ports: BTreeSet<String>,

    /// Declared volume mount points.
    pub volumes: BTreeSet<String>,

    /// Number of layers in the manifest.
    pub layers: usize,

    /// Total compressed size of all layers, in bytes. `None` when a layer could not be
    /// sized and the client was asked not to fail for that.
    pub size: Option<u64>,

    /// The user the container runs as, or empty.
    pub user: String,
}

impl TagInfo {
    /// Assemble tag metadata from a compatibility record.
    pub fn new(compatibility: Compatibility, layers: usize, size: Option<u64>) -> Self {
        let config = compatibility.config.unwrap_or_default();

        TagInfo {
            created: compatibility.created,
            docker_version: compatibility.docker_version.unwrap_or_default(),
            entry_point: config.entry_point.unwrap_or_default(),
            exposed_ports: keys(config.exposed_ports),
            volumes: keys(config.volumes),
            layers,
            size,
            user: config.user.unwrap_or_default(),
        }
    }
}

fn keys(map: Option<BTreeMap<String, serde_json::Value>>) -> BTreeSet<String> {
    map.map(|map| map.into_keys().collect()).unwrap_or_default()
}
