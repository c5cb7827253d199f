use std::fmt;

use bytes::Bytes;
use oci_spec::image::{ImageIndex, ImageManifest, MediaType};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{Error, Result};
use crate::oci_digest::OciDigest;

/// Docker's equivalent of [`MediaType::ImageIndex`]; still what most multi-platform builds push.
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
/// Docker's equivalent of [`MediaType::ImageManifest`].
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Value for the `Accept` header of manifest requests. Without it registries may down-convert
/// manifest lists to a single-platform manifest, hiding the children we are looking for.
pub fn accepted_media_types() -> String {
    [
        MediaType::ImageIndex.to_string(),
        DOCKER_MANIFEST_LIST.to_string(),
        MediaType::ImageManifest.to_string(),
        DOCKER_MANIFEST.to_string(),
    ]
    .join(", ")
}

/// Reference to an [OCI
/// Manifest](https://github.com/opencontainers/image-spec/blob/main/manifest.md) as specified by
/// the [OCI Distrbution Spec](https://github.com/opencontainers/distribution-spec).
///
/// This refers to the `<reference>` portion of distribution API endpoints taking the form
/// `/v2/<name>/manifests/<reference>`, which MUST be either a digest or a tag matching
/// `[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestRef {
    Digest(OciDigest),
    Tag(String),
}

impl std::str::FromStr for ManifestRef {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(dgst) = OciDigest::try_from(s) {
            return Ok(Self::Digest(dgst));
        }
        static RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$")
                .expect("tag pattern is valid")
        });

        if RE.is_match(s) {
            return Ok(Self::Tag(String::from(s)));
        }

        Err(Error::InvalidManifest {
            reference: s.to_string(),
            reason: "reference is neither a digest nor a tag".to_string(),
        })
    }
}

impl fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestRef::Digest(d) => write!(f, "{d}"),
            ManifestRef::Tag(t) => write!(f, "{t}"),
        }
    }
}

/// Abstraction over [`oci_spec::image::ImageManifest`] and [`oci_spec::image::ImageIndex`].
///
/// Docker's v2 manifest and manifest list share the OCI shapes closely enough to decode as
/// either.
#[derive(Clone, Debug)]
pub enum ManifestSpec {
    /// A single-platform image manifest. It has no child manifests.
    Image(ImageManifest),
    /// A manifest list / image index.
    Index(ImageIndex),
}

impl ManifestSpec {
    /// Decode `bs` as an image manifest, falling back to an index. Every child digest of an
    /// index must be a valid digest.
    pub fn parse(reference: &ManifestRef, bs: &Bytes) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidManifest {
            reference: reference.to_string(),
            reason,
        };

        let img_err = match serde_json::from_slice::<ImageManifest>(bs) {
            Ok(m) => return Ok(ManifestSpec::Image(m)),
            Err(e) => e,
        };
        let index = match serde_json::from_slice::<ImageIndex>(bs) {
            Ok(m) => m,
            Err(ind_err) => {
                tracing::warn!("unable to deserialize {reference} as image: {img_err}");
                tracing::warn!("unable to deserialize {reference} as index: {ind_err}");
                let reason = format!("neither an image manifest nor an index: {ind_err}");
                return Err(invalid(reason));
            }
        };

        for descriptor in index.manifests() {
            OciDigest::try_from(descriptor.digest().as_str())
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(ManifestSpec::Index(index))
    }

    pub fn is_index(&self) -> bool {
        matches!(self, ManifestSpec::Index(_))
    }

    pub fn media_type(&self) -> Option<&MediaType> {
        match self {
            ManifestSpec::Image(m) => m.media_type().as_ref(),
            ManifestSpec::Index(m) => m.media_type().as_ref(),
        }
    }

    /// Digests of the child manifests of an index; empty for an image manifest.
    pub fn child_digests(&self) -> Vec<&str> {
        match self {
            ManifestSpec::Image(_) => Vec::new(),
            ManifestSpec::Index(index) => index
                .manifests()
                .iter()
                .map(|d| d.digest().as_str())
                .collect(),
        }
    }
}
