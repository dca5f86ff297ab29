//! Mock release API and mirror construction

use release_mirror::{ApiConfig, Config, Mirror, RetryConfig, UnsupportedDigestPolicy};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the release listing for `acme/widgets`
pub const RELEASES_PATH: &str = "/repos/acme/widgets/releases";

/// Retry settings that keep tests fast
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        poll_interval: Duration::from_millis(1),
        ..RetryConfig::default()
    }
}

/// A mirror writing into a fresh temporary directory, talking to `server`
pub struct TestMirror {
    pub mirror: Mirror,
    pub output: TempDir,
}

impl TestMirror {
    pub fn new(server: &MockServer) -> Self {
        Self::with_policy(server, UnsupportedDigestPolicy::SizeFallback)
    }

    pub fn with_policy(server: &MockServer, policy: UnsupportedDigestPolicy) -> Self {
        let output = TempDir::new().unwrap();
        let mirror = Mirror::new(Config {
            output_dir: output.path().to_path_buf(),
            download_source: false,
            unsupported_digest: policy,
            api: ApiConfig {
                base_url: server.uri(),
                ..ApiConfig::default()
            }
            .with_token(Some("test-token".to_string())),
            retry: fast_retry(),
        })
        .unwrap();
        Self { mirror, output }
    }

    pub fn release_dir(&self, tag: &str) -> PathBuf {
        self.output.path().join("acme").join("widgets").join(tag)
    }

    pub fn root(&self) -> &Path {
        self.output.path()
    }
}

/// Serve `releases` as a single page of the `acme/widgets` listing
pub async fn mount_releases(server: &MockServer, releases: Value) {
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(releases))
        .mount(server)
        .await;
}

/// Serve `pages` as a paginated listing linked by `rel="next"`
///
/// Page 1 is the bare URL; page `n > 1` is `?page=n`.
pub async fn mount_release_pages(server: &MockServer, pages: Vec<Value>) {
    let count = pages.len();
    let base = server.uri();
    // later pages first: the bare first-page matcher would also match them
    for (index, page) in pages.into_iter().enumerate().rev() {
        let number = index + 1;
        let mut template = ResponseTemplate::new(200).set_body_json(page);
        if number < count {
            let link = format!(
                "<{base}{RELEASES_PATH}?page={}>; rel=\"next\", <{base}{RELEASES_PATH}?page={count}>; rel=\"last\"",
                number + 1
            );
            template = template.insert_header("link", link.as_str());
        }
        let mock = Mock::given(method("GET")).and(path(RELEASES_PATH));
        if number == 1 {
            mock.respond_with(template).mount(server).await;
        } else {
            mock.and(query_param("page", number.to_string()))
                .respond_with(template)
                .mount(server)
                .await;
        }
    }
}

/// Serve `content` at `/assets/{id}`
pub async fn mount_asset(server: &MockServer, id: u32, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/assets/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

/// Number of requests the server received for `request_path`
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}
