//! Core types for release-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A repository identifier of the form `owner/name`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId {
    owner: String,
    name: String,
}

impl RepositoryId {
    /// Repository owner (user or organisation)
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of this repository below the mirror root
    pub fn directory(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.owner).join(&self.name)
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepositoryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidRepository(s.to_string());
        let (owner, name) = s.split_once('/').ok_or_else(invalid)?;
        for part in [owner, name] {
            if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
                return Err(invalid());
            }
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RepositoryId> for String {
    fn from(id: RepositoryId) -> Self {
        id.to_string()
    }
}

/// A release as listed by the remote
///
/// The complete record is kept in [`Release::raw`] so the canonical metadata file
/// preserves fields the sync itself never reads.
#[derive(Clone, Debug)]
pub struct Release {
    /// Unique tag identifier
    pub tag_name: String,
    /// Display name
    pub name: Option<String>,
    /// Free-text description
    pub body: Option<String>,
    /// Downloadable assets, in remote order
    pub assets: Vec<Asset>,
    /// Locator of the source archive
    pub tarball_url: Option<String>,
    /// The record exactly as received
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
struct ReleaseFields {
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
    #[serde(default)]
    tarball_url: Option<String>,
}

impl Release {
    /// Build a release from a raw listing item
    pub fn from_value(raw: serde_json::Value) -> Result<Self> {
        let fields = ReleaseFields::deserialize(&raw)?;
        let tag_name = fields
            .tag_name
            .filter(|tag| !tag.is_empty())
            .ok_or_else(|| Error::InvalidRelease("missing tag_name".to_string()))?;

        Ok(Self {
            tag_name,
            name: fields.name,
            body: fields.body,
            assets: fields.assets,
            tarball_url: fields.tarball_url,
            raw,
        })
    }

    /// Title used in the description file, falling back to the tag
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.tag_name,
        }
    }

    /// Human-readable description: `# <name>`, a blank line, the body
    pub fn description(&self) -> String {
        format!(
            "# {}\n\n{}\n",
            self.display_name(),
            self.body.as_deref().unwrap_or_default()
        )
    }

    /// Canonical metadata: the raw record, 4-space indented, newline terminated
    pub fn canonical_json(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.raw.serialize(&mut serializer)?;
        out.push(b'\n');
        Ok(out)
    }
}

/// A downloadable file attached to a release
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// File name, used as the local file name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// API download locator
    pub url: String,
    /// Browser download locator
    #[serde(default)]
    pub browser_download_url: Option<String>,
    /// Content digest in `<algorithm>:<hex>` form
    #[serde(default)]
    pub digest: Option<String>,
}

impl Asset {
    /// Parsed digest, if the record carries one
    pub fn parsed_digest(&self) -> Option<AssetDigest> {
        self.digest
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(AssetDigest::parse)
    }
}

/// Digest algorithms the comparator can compute
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256
    Sha256,
    /// Anything else, by name
    Unsupported(String),
}

/// A digest split into algorithm and hex value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetDigest {
    /// Algorithm tag
    pub algorithm: DigestAlgorithm,
    /// Lower-cased hex value
    pub value: String,
}

impl AssetDigest {
    /// Parse `<algorithm>:<hex>`; a string without a separator is an unsupported algorithm
    pub fn parse(raw: &str) -> Self {
        let (algorithm, value) = raw.split_once(':').unwrap_or((raw, ""));
        let algorithm = match algorithm {
            "sha256" => DigestAlgorithm::Sha256,
            other => DigestAlgorithm::Unsupported(other.to_string()),
        };
        Self {
            algorithm,
            value: value.trim().to_ascii_lowercase(),
        }
    }
}

/// Summary of one repository's sync
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Releases processed
    pub releases: usize,
    /// Assets downloaded (absent or changed)
    pub assets_fetched: usize,
    /// Assets left alone (matching or unverifiable but present)
    pub assets_skipped: usize,
    /// Source archives downloaded
    pub sources_fetched: usize,
}

impl std::ops::AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.releases += other.releases;
        self.assets_fetched += other.assets_fetched;
        self.assets_skipped += other.assets_skipped;
        self.sources_fetched += other.sources_fetched;
    }
}
