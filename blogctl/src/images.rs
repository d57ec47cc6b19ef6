//! Image hosting on an S3-compatible bucket.
//!
//! Uploads are stored under a random object key, and post content refers to them with a
//! `[s3://<key>]` marker. The bucket stays private: when a post is read, every marker is replaced
//! by a presigned GET URL that lives for `image_storage.url_expiry`.

use std::time::Duration;

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream};
use tracing::instrument;
use uuid::Uuid;

use crate::config::ImageStorageConfig;
use crate::errors::Error;

const MARKER_OPEN: &str = "[s3://";
const MARKER_CLOSE: char = ']';

/// The marker that stands for the image stored under `key`.
pub fn marker(key: &str) -> String {
    format!("{MARKER_OPEN}{key}{MARKER_CLOSE}")
}

/// Accept a bare object key or a whole `[s3://<key>]` marker.
pub fn strip_marker(raw: &str) -> &str {
    raw.strip_prefix(MARKER_OPEN)
        .and_then(|rest| rest.strip_suffix(MARKER_CLOSE))
        .unwrap_or(raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Marker(&'a str),
}

/// Split content into plain text and image markers.
///
/// A marker is `[s3://`, one or more characters other than `]`, then `]`. An empty key or a
/// missing `]` leaves the text as it is.
fn segments(content: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = content[cursor..].find(MARKER_OPEN) {
        let open = cursor + offset;
        let key_start = open + MARKER_OPEN.len();
        let Some(key_len) = content[key_start..].find(MARKER_CLOSE) else {
            break;
        };
        if key_len == 0 {
            cursor = key_start;
            continue;
        }

        if open > text_start {
            out.push(Segment::Text(&content[text_start..open]));
        }
        out.push(Segment::Marker(&content[key_start..key_start + key_len]));
        cursor = key_start + key_len + MARKER_CLOSE.len_utf8();
        text_start = cursor;
    }

    if text_start < content.len() {
        out.push(Segment::Text(&content[text_start..]));
    }
    out
}

/// Client for the image bucket plus the upload rules that apply to it.
#[derive(Debug, Clone)]
pub struct ImageStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    url_expiry: Duration,
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl ImageStore {
    /// Build the S3 client. Static keys from the config win over the default credential chain.
    pub async fn from_config(config: &ImageStorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(key_id.clone(), secret.clone(), None, None, "blogctl-config"));
        }
        let shared = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config = s3_config.endpoint_url(endpoint.trim_end_matches('/'));
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config.build()),
            bucket: config.bucket.clone(),
            url_expiry: config.url_expiry,
            max_file_size: config.max_file_size,
            allowed_extensions: config.allowed_extensions.iter().map(|ext| ext.to_ascii_lowercase()).collect(),
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn url_expiry(&self) -> Duration {
        self.url_expiry
    }

    /// Object key for an upload called `filename`: a random UUID plus its lowercased extension.
    pub fn object_key(&self, filename: &str) -> Result<String, Error> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension {
            Some(ext) if self.allowed_extensions.contains(&ext) => Ok(format!("{}.{ext}", Uuid::new_v4())),
            _ => Err(Error::BadRequest {
                message: format!("Invalid file type. Allowed extensions: {}", self.allowed_extensions.join(", ")),
            }),
        }
    }

    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    pub async fn upload(&self, key: &str, content_type: Option<&str>, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .context("failed to upload image")?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn presigned_url(&self, key: &str) -> anyhow::Result<String> {
        let presigning = PresigningConfig::expires_in(self.url_expiry).context("failed to create presigning config")?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .context("failed to create presigned URL")?;

        Ok(presigned.uri().to_string())
    }

    /// Replace every image marker in `content` with a presigned URL.
    pub async fn render(&self, content: &str) -> anyhow::Result<String> {
        let mut rendered = String::with_capacity(content.len());
        for segment in segments(content) {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Marker(key) => rendered.push_str(&self.presigned_url(key).await?),
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_config() -> ImageStorageConfig {
        ImageStorageConfig {
            bucket: "blog-images".to_string(),
            endpoint: Some("http://localhost:9000/".to_string()),
            force_path_style: true,
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_segments() {
        use Segment::{Marker, Text};

        assert_eq!(
            segments("before [s3://a.png] middle [s3://b.jpg]"),
            vec![Text("before "), Marker("a.png"), Text(" middle "), Marker("b.jpg")]
        );
        assert_eq!(segments("[s3://a.png][s3://b.png]"), vec![Marker("a.png"), Marker("b.png")]);
        assert_eq!(segments("empty [s3://] key"), vec![Text("empty [s3://] key")]);
        assert_eq!(segments("open [s3://a.png and no close"), vec![Text("open [s3://a.png and no close")]);
        assert_eq!(segments("[s3://[s3://a]"), vec![Marker("[s3://a")]);
        assert_eq!(segments("[s3://]x] tail"), vec![Text("[s3://]x] tail")]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_marker_forms() {
        assert_eq!(marker("abc.png"), "[s3://abc.png]");
        assert_eq!(strip_marker("[s3://abc.png]"), "abc.png");
        assert_eq!(strip_marker("abc.png"), "abc.png");
        assert_eq!(strip_marker("[s3://abc.png"), "[s3://abc.png");
    }

    #[tokio::test]
    async fn test_object_key_checks_extension() {
        let store = ImageStore::from_config(&storage_config()).await;

        let key = store.object_key("Photo.PNG").unwrap();
        assert!(key.ends_with(".png"));
        assert_eq!(key.len(), 36 + ".png".len());
        assert_ne!(store.object_key("a.png").unwrap(), store.object_key("a.png").unwrap());

        for rejected in ["script.exe", "no-extension", "archive.png.zip", ""] {
            let err = store.object_key(rejected).unwrap_err();
            assert!(matches!(err, Error::BadRequest { .. }), "{rejected} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_presigned_url_addresses_object() {
        let store = ImageStore::from_config(&storage_config()).await;

        let url = store.presigned_url("abc.png").await.unwrap();

        assert!(url.starts_with("http://localhost:9000/blog-images/abc.png?"), "{url}");
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_render_replaces_only_markers() {
        let store = ImageStore::from_config(&storage_config()).await;

        let rendered = store.render("![cover]([s3://cover.webp]) and [s3://] stays").await.unwrap();

        assert!(rendered.starts_with("![cover](http://localhost:9000/blog-images/cover.webp?"));
        assert!(rendered.ends_with(") and [s3://] stays"));
        assert!(!rendered.contains("[s3://cover.webp]"));
        assert_eq!(store.render("no images here").await.unwrap(), "no images here");
    }
}
