//! Bucket-level values: aggregated usage and the public-read access policy.

use serde::Serialize;
use serde_json::json;

/// Object count and byte usage summed over a whole bucket.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketUsage {
    /// Number of objects in the bucket.
    pub objects: u64,

    /// Sum of all object sizes in bytes.
    pub bytes: u64,
}

impl BucketUsage {
    /// Fold one listing page into the running totals.
    pub fn add_page(&mut self, sizes: &[u64]) {
        self.objects += sizes.len() as u64;
        self.bytes += sizes.iter().sum::<u64>();
    }
}

/// Policy document granting anonymous read access to a bucket.
///
/// Anyone may fetch objects and list/locate the bucket; nothing else.
pub fn public_read_policy(bucket: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "AWS": ["*"] },
                "Action": ["s3:GetBucketLocation", "s3:ListBucket"],
                "Resource": [format!("arn:aws:s3:::{}", bucket)]
            },
            {
                "Effect": "Allow",
                "Principal": { "AWS": ["*"] },
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", bucket)]
            }
        ]
    })
    .to_string()
}
