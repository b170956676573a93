//! S3 buckets through `aws s3api`

use crate::provider::AwsProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stratus_cloud::{ObjectStoreApi, RemoteStatus, Result};
use stratus_config::Encryption;

/// Error codes `head-bucket` reports for a bucket that is not there
const MISSING_BUCKET: &[&str] = &["404", "NoSuchBucket", "NotFound"];

/// Upper bound on keys per `delete-objects` call
const DELETE_BATCH: usize = 1000;

fn encryption_configuration(encryption: &Encryption) -> String {
    let default = match encryption {
        Encryption::Aes256 => json!({ "SSEAlgorithm": "AES256" }),
        Encryption::Kms { key_id: Some(key) } => {
            json!({ "SSEAlgorithm": "aws:kms", "KMSMasterKeyID": key })
        }
        Encryption::Kms { key_id: None } => json!({ "SSEAlgorithm": "aws:kms" }),
    };
    json!({
        "Rules": [{
            "ApplyServerSideEncryptionByDefault": default,
            "BucketKeyEnabled": matches!(encryption, Encryption::Kms { .. }),
        }]
    })
    .to_string()
}

fn public_access_configuration(blocked: bool) -> String {
    format!(
        "BlockPublicAcls={b},IgnorePublicAcls={b},BlockPublicPolicy={b},RestrictPublicBuckets={b}",
        b = blocked
    )
}

fn lifecycle_configuration(days: u32) -> String {
    json!({
        "Rules": [{
            "ID": "expire-noncurrent-versions",
            "Status": "Enabled",
            "Filter": {},
            "NoncurrentVersionExpiration": { "NoncurrentDays": days },
            "AbortIncompleteMultipartUpload": { "DaysAfterInitiation": 7 },
        }]
    })
    .to_string()
}

// ========== Object versions ==========

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionListing {
    #[serde(default)]
    versions: Vec<ObjectVersion>,
    #[serde(default)]
    delete_markers: Vec<ObjectVersion>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectVersion {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_id: Option<String>,
}

impl VersionListing {
    /// `delete-objects` payloads covering every version and delete marker
    fn delete_batches(self) -> Vec<String> {
        let objects: Vec<ObjectVersion> = self
            .versions
            .into_iter()
            .chain(self.delete_markers)
            .collect();
        objects
            .chunks(DELETE_BATCH)
            .map(|chunk| json!({ "Objects": chunk, "Quiet": true }).to_string())
            .collect()
    }
}

#[async_trait]
impl ObjectStoreApi for AwsProvider {
    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        match self.cli.run(&["s3api", "head-bucket", "--bucket", name]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_code(MISSING_BUCKET) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        let location = format!("LocationConstraint={}", self.region());
        let mut args = vec!["s3api", "create-bucket", "--bucket", name];
        // us-east-1 rejects an explicit location constraint
        if self.region() != "us-east-1" {
            args.push("--create-bucket-configuration");
            args.push(&location);
        }
        self.cli.run(&args).await?;
        Ok(())
    }

    async fn put_versioning(&self, name: &str, enabled: bool) -> Result<()> {
        let status = if enabled {
            "Status=Enabled"
        } else {
            "Status=Suspended"
        };
        self.cli
            .run(&[
                "s3api",
                "put-bucket-versioning",
                "--bucket",
                name,
                "--versioning-configuration",
                status,
            ])
            .await?;
        Ok(())
    }

    async fn put_encryption(&self, name: &str, encryption: &Encryption) -> Result<()> {
        self.cli
            .run(&[
                "s3api",
                "put-bucket-encryption",
                "--bucket",
                name,
                "--server-side-encryption-configuration",
                &encryption_configuration(encryption),
            ])
            .await?;
        Ok(())
    }

    async fn put_public_access_block(&self, name: &str, blocked: bool) -> Result<()> {
        self.cli
            .run(&[
                "s3api",
                "put-public-access-block",
                "--bucket",
                name,
                "--public-access-block-configuration",
                &public_access_configuration(blocked),
            ])
            .await?;
        Ok(())
    }

    async fn put_lifecycle(
        &self,
        name: &str,
        noncurrent_expiration_days: Option<u32>,
    ) -> Result<()> {
        match noncurrent_expiration_days {
            Some(days) => {
                self.cli
                    .run(&[
                        "s3api",
                        "put-bucket-lifecycle-configuration",
                        "--bucket",
                        name,
                        "--lifecycle-configuration",
                        &lifecycle_configuration(days),
                    ])
                    .await?;
            }
            None => {
                self.cli
                    .run(&["s3api", "delete-bucket-lifecycle", "--bucket", name])
                    .await?;
            }
        }
        Ok(())
    }

    async fn bucket_status(&self, name: &str) -> Result<RemoteStatus> {
        Ok(if self.bucket_exists(name).await? {
            RemoteStatus::Ready
        } else {
            RemoteStatus::Pending("not found".to_string())
        })
    }

    async fn empty_bucket(&self, name: &str) -> Result<()> {
        loop {
            let listed = self
                .cli
                .run_json_or_default::<VersionListing>(&[
                    "s3api",
                    "list-object-versions",
                    "--bucket",
                    name,
                    "--max-items",
                    "1000",
                ])
                .await;
            let listing = match listed {
                Ok(listing) => listing,
                Err(e) if e.is_code(&["NoSuchBucket"]) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            let batches = listing.delete_batches();
            if batches.is_empty() {
                return Ok(());
            }
            for batch in batches {
                self.cli
                    .run(&[
                        "s3api",
                        "delete-objects",
                        "--bucket",
                        name,
                        "--delete",
                        &batch,
                    ])
                    .await?;
            }
            tracing::debug!("Deleted a batch of object versions from {}", name);
        }
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.cli
            .run(&["s3api", "delete-bucket", "--bucket", name])
            .await?;
        Ok(())
    }

    fn bucket_arn(&self, name: &str) -> String {
        format!("arn:aws:s3:::{}", name)
    }
}
