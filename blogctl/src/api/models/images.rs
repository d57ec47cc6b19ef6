//! API request/response models for image hosting.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// A stored image and the marker to paste into post content
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageUploadResponse {
    /// Object key in the image bucket
    pub id: String,
    /// `[s3://<id>]`, replaced by a temporary URL whenever a post is read
    pub marker: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ImageUrlQuery {
    /// Object key, or the whole `[s3://<id>]` marker
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageUrlResponse {
    /// Presigned GET URL
    pub url: String,
    /// Seconds until the URL stops working
    pub expires_in: u64,
}
