//! Release records and asset content for scenario tests

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// `sha256:<hex>` digest string for `bytes`
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(bytes))
}

/// Asset record served at `{base}/assets/{id}`
pub fn asset(base: &str, id: u32, name: &str, size: usize, digest: Option<&str>) -> Value {
    json!({
        "id": id,
        "name": name,
        "size": size,
        "url": format!("{base}/assets/{id}"),
        "browser_download_url": format!("{base}/download/{name}"),
        "digest": digest,
    })
}

/// Release record with the given assets
pub fn release(tag: &str, assets: Vec<Value>) -> Value {
    json!({
        "tag_name": tag,
        "name": format!("Widgets {tag}"),
        "body": format!("Notes for {tag}"),
        "draft": false,
        "prerelease": false,
        "assets": assets,
    })
}
