//! The sync driver
//!
//! For each repository, in input order:
//! 1. make sure `<output>/<owner>/<name>/` exists
//! 2. stream its releases page by page
//! 3. for each release, (re)write `_release.json` and `_description.md` into
//!    `<output>/<owner>/<name>/<tag>/`, optionally mirror the source archive, then
//!    compare every asset with its local copy and download the ones that are absent
//!    or changed
//!
//! A tag containing `/` (`release/1.0`) is mirrored as nested directories.
//!
//! Everything is sequential. A failure aborts the repository it happened in; the
//! remaining repositories are still processed.

use crate::client::{Accept, ApiClient};
use crate::config::{Config, UnsupportedDigestPolicy};
use crate::error::{Error, Result};
use crate::fetcher::{Fetcher, remove_stale_scratch, write_atomic};
use crate::identity::{self, Identity};
use crate::pagination;
use crate::types::{Asset, Release, RepositoryId, SyncReport};
use crate::utils::{filename_from_headers, safe_component, safe_relative_path};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// File holding the release record as received
pub const RELEASE_METADATA_FILE: &str = "_release.json";

/// File holding the release title and notes
pub const DESCRIPTION_FILE: &str = "_description.md";

/// Result of syncing one repository
#[derive(Debug)]
pub struct RepositoryOutcome {
    /// The repository
    pub repository: RepositoryId,
    /// Counters, or the error that aborted the repository
    pub result: Result<SyncReport>,
}

/// Keeps a local mirror of release assets up to date
#[derive(Debug)]
pub struct Mirror {
    client: ApiClient,
    fetcher: Fetcher,
    output_dir: PathBuf,
    download_source: bool,
    unsupported_digest: UnsupportedDigestPolicy,
}

impl Mirror {
    /// Create a mirror from a validated configuration
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client cannot be created
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::new(config.api, config.retry)?;
        Ok(Self {
            fetcher: Fetcher::new(client.clone()),
            client,
            output_dir: config.output_dir,
            download_source: config.download_source,
            unsupported_digest: config.unsupported_digest,
        })
    }

    /// Root of the local mirror
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Sync every repository in order, continuing past failed ones
    pub async fn sync_all(&self, repositories: &[RepositoryId]) -> Vec<RepositoryOutcome> {
        let mut outcomes = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let result = self
                .sync_repository(repository)
                .instrument(info_span!("repository", repository = %repository))
                .await;
            if let Err(e) = &result {
                error!(repository = %repository, error = %e, "Failed to update repository");
            }
            outcomes.push(RepositoryOutcome {
                repository: repository.clone(),
                result,
            });
        }
        outcomes
    }

    /// Sync the releases of one repository
    pub async fn sync_repository(&self, repository: &RepositoryId) -> Result<SyncReport> {
        let directory = repository.directory(&self.output_dir);
        tokio::fs::create_dir_all(&directory).await?;

        info!("Updating '{}'...", repository);
        let mut report = SyncReport::default();
        let releases = pagination::releases(&self.client, repository);
        futures::pin_mut!(releases);
        while let Some(release) = releases.try_next().await? {
            let span = info_span!("release", tag = %release.tag_name);
            self.sync_release(&directory, &release, &mut report)
                .instrument(span)
                .await?;
        }

        info!(
            releases = report.releases,
            fetched = report.assets_fetched,
            skipped = report.assets_skipped,
            sources = report.sources_fetched,
            "Updated '{}'",
            repository
        );
        Ok(report)
    }

    async fn sync_release(
        &self,
        repository_dir: &Path,
        release: &Release,
        report: &mut SyncReport,
    ) -> Result<()> {
        info!("Checking '{}'...", release.tag_name);
        let directory = repository_dir.join(safe_relative_path("tag", &release.tag_name)?);
        tokio::fs::create_dir_all(&directory).await?;
        remove_stale_scratch(&directory).await?;

        write_atomic(
            &directory.join(RELEASE_METADATA_FILE),
            release.canonical_json()?,
        )
        .await?;
        write_atomic(&directory.join(DESCRIPTION_FILE), release.description()).await?;

        if self.download_source && self.sync_source(&directory, release).await? {
            report.sources_fetched += 1;
        }

        for asset in &release.assets {
            if self.sync_asset(&directory, asset).await? {
                report.assets_fetched += 1;
            } else {
                report.assets_skipped += 1;
            }
        }

        report.releases += 1;
        Ok(())
    }

    /// Returns true if the asset was downloaded
    async fn sync_asset(&self, release_dir: &Path, asset: &Asset) -> Result<bool> {
        let path = release_dir.join(safe_component("asset", &asset.name)?);

        match self.identify(asset, &path).await? {
            Identity::Match => {
                debug!("Skipping '{}' (matching digests)...", asset.url);
                Ok(false)
            }
            Identity::UnverifiablePresent => {
                debug!("Skipping '{}' (matching sizes)...", asset.url);
                Ok(false)
            }
            identity @ (Identity::Absent | Identity::Mismatch) => {
                if identity == Identity::Mismatch {
                    warn!("Re-downloading '{}'...", asset.url);
                }
                self.fetcher
                    .fetch(&asset.url, &path, Accept::OctetStream)
                    .await?;
                Ok(true)
            }
        }
    }

    /// Mirror the source archive if it is not present yet
    ///
    /// Presence alone counts: there is no digest for source archives, so a present
    /// archive is never checked or downloaded again. Returns true if it was downloaded.
    async fn sync_source(&self, release_dir: &Path, release: &Release) -> Result<bool> {
        let Some(url) = release.tarball_url.as_deref() else {
            debug!("Release '{}' has no source archive", release.tag_name);
            return Ok(false);
        };

        // The archive endpoint rejects octet-stream, so both requests ask for JSON
        let response = self.client.head(url, Accept::Json).await?;
        let filename =
            filename_from_headers(response.headers()).ok_or_else(|| Error::MissingFilename {
                url: url.to_string(),
            })?;
        let path = release_dir.join(safe_component("source archive", &filename)?);

        if tokio::fs::try_exists(&path).await? {
            debug!("Skipping source '{}' (present)...", filename);
            return Ok(false);
        }

        info!("Downloading source '{}'...", filename);
        self.fetcher.fetch(url, &path, Accept::Json).await?;
        Ok(true)
    }

    /// Hashing can take a while for large artifacts, so it runs off the async workers
    async fn identify(&self, asset: &Asset, path: &Path) -> Result<Identity> {
        let asset = asset.clone();
        let path = path.to_path_buf();
        let policy = self.unsupported_digest;
        let identity =
            tokio::task::spawn_blocking(move || identity::compare(&asset, &path, policy))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        Ok(identity)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, RetryConfig};
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_mirror(server: &MockServer, output: &Path, download_source: bool) -> Mirror {
        Mirror::new(Config {
            output_dir: output.to_path_buf(),
            download_source,
            unsupported_digest: UnsupportedDigestPolicy::SizeFallback,
            api: ApiConfig {
                base_url: server.uri(),
                ..ApiConfig::default()
            },
            retry: RetryConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                poll_interval: Duration::from_millis(1),
                ..RetryConfig::default()
            },
        })
        .unwrap()
    }

    async fn requests_to(server: &MockServer, request_path: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.api.page_size = 0;

        assert!(matches!(Mirror::new(config), Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn release_files_are_written() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1.0.0",
                "name": "Widgets 1.0",
                "body": "First release",
                "assets": [],
            }])))
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let mirror = test_mirror(&server, output.path(), false);
        let repository: RepositoryId = "acme/widgets".parse().unwrap();

        let report = mirror.sync_repository(&repository).await.unwrap();

        let release_dir = output.path().join("acme/widgets/v1.0.0");
        assert_eq!(report.releases, 1);
        assert_eq!(
            std::fs::read_to_string(release_dir.join(DESCRIPTION_FILE)).unwrap(),
            "# Widgets 1.0\n\nFirst release\n"
        );
        let metadata: serde_json::Value = serde_json::from_slice(
            &std::fs::read(release_dir.join(RELEASE_METADATA_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["tag_name"], "v1.0.0");
    }

    #[tokio::test]
    async fn unsafe_asset_name_aborts_repository() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1.0.0",
                "assets": [{
                    "name": "../../escape.sh",
                    "size": 1,
                    "url": format!("{}/assets/1", server.uri()),
                }],
            }])))
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let mirror = test_mirror(&server, output.path(), false);
        let repository: RepositoryId = "acme/widgets".parse().unwrap();

        let result = mirror.sync_repository(&repository).await;

        assert!(matches!(result, Err(Error::InvalidName { kind: "asset", .. })));
        assert_eq!(requests_to(&server, "/assets/1").await, 0);
    }

    #[tokio::test]
    async fn source_archive_is_fetched_once_and_never_reverified() {
        let server = MockServer::start().await;
        let tarball = format!("{}/tarball/v1.0.0", server.uri());
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1.0.0",
                "tarball_url": tarball,
                "assets": [],
            }])))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/tarball/v1.0.0"))
            .respond_with(ResponseTemplate::new(200).insert_header(
                "content-disposition",
                "attachment; filename=acme-widgets-v1.0.0-0-gf63690a.tar.gz",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tarball/v1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tar bytes".to_vec()))
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let mirror = test_mirror(&server, output.path(), true);
        let repository: RepositoryId = "acme/widgets".parse().unwrap();

        let first = mirror.sync_repository(&repository).await.unwrap();
        let archive = output
            .path()
            .join("acme/widgets/v1.0.0/acme-widgets-v1.0.0-0-gf63690a.tar.gz");
        assert_eq!(first.sources_fetched, 1);
        assert_eq!(std::fs::read(&archive).unwrap(), b"tar bytes");

        // Corrupt it: presence is all that is checked
        std::fs::write(&archive, b"x").unwrap();
        let second = mirror.sync_repository(&repository).await.unwrap();

        assert_eq!(second.sources_fetched, 0);
        assert_eq!(std::fs::read(&archive).unwrap(), b"x");
        let gets = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path() == "/tarball/v1.0.0")
            .count();
        assert_eq!(gets, 1);
    }

    #[tokio::test]
    async fn source_archive_without_filename_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1.0.0",
                "tarball_url": format!("{}/tarball/v1.0.0", server.uri()),
            }])))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/tarball/v1.0.0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let mirror = test_mirror(&server, output.path(), true);
        let repository: RepositoryId = "acme/widgets".parse().unwrap();

        let result = mirror.sync_repository(&repository).await;

        assert!(matches!(result, Err(Error::MissingFilename { .. })));
    }

    #[tokio::test]
    async fn source_archive_is_ignored_unless_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1.0.0",
                "tarball_url": format!("{}/tarball/v1.0.0", server.uri()),
            }])))
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let mirror = test_mirror(&server, output.path(), false);
        let repository: RepositoryId = "acme/widgets".parse().unwrap();

        mirror.sync_repository(&repository).await.unwrap();

        assert_eq!(requests_to(&server, "/tarball/v1.0.0").await, 0);
    }

    #[tokio::test]
    async fn failing_repository_does_not_stop_the_next() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/gone/releases"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let content = b"0123456789";
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1.0.0",
                "assets": [{
                    "name": "widget.bin",
                    "size": 10,
                    "url": format!("{}/assets/1", server.uri()),
                    "digest": format!("sha256:{:x}", Sha256::digest(content)),
                }],
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assets/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let mirror = test_mirror(&server, output.path(), false);
        let repositories: Vec<RepositoryId> = vec![
            "acme/gone".parse().unwrap(),
            "acme/widgets".parse().unwrap(),
        ];

        let outcomes = mirror.sync_all(&repositories).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].result.as_ref().unwrap_err().status(),
            Some(reqwest::StatusCode::NOT_FOUND)
        );
        assert_eq!(outcomes[1].result.as_ref().unwrap().assets_fetched, 1);
        assert!(output.path().join("acme/widgets/v1.0.0/widget.bin").is_file());
    }
}
