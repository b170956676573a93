//! ECR repositories through `aws ecr`

use crate::provider::AwsProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stratus_cloud::{RegistryApi, RemoteStatus, RepositoryInfo, Result};
use stratus_config::Encryption;

const MISSING_REPOSITORY: &[&str] = &["RepositoryNotFoundException"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryList {
    #[serde(default)]
    repositories: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedRepository {
    repository: Repository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    repository_name: String,
    repository_arn: String,
    repository_uri: String,
    registry_id: String,
}

impl From<Repository> for RepositoryInfo {
    fn from(repo: Repository) -> Self {
        Self {
            name: repo.repository_name,
            arn: repo.repository_arn,
            uri: repo.repository_uri,
            registry_id: repo.registry_id,
        }
    }
}

fn encryption_configuration(encryption: &Encryption) -> String {
    match encryption {
        Encryption::Aes256 => "encryptionType=AES256".to_string(),
        Encryption::Kms { key_id: Some(key) } => format!("encryptionType=KMS,kmsKey={}", key),
        Encryption::Kms { key_id: None } => "encryptionType=KMS".to_string(),
    }
}

/// Expire everything beyond the newest `count` images
fn lifecycle_policy(count: u32) -> String {
    json!({
        "rules": [{
            "rulePriority": 1,
            "description": format!("keep the last {} images", count),
            "selection": {
                "tagStatus": "any",
                "countType": "imageCountMoreThan",
                "countNumber": count,
            },
            "action": { "type": "expire" },
        }]
    })
    .to_string()
}

#[async_trait]
impl RegistryApi for AwsProvider {
    async fn find_repository(&self, name: &str) -> Result<Option<RepositoryInfo>> {
        let list: Option<RepositoryList> = self
            .cli
            .run_json_optional(
                &["ecr", "describe-repositories", "--repository-names", name],
                MISSING_REPOSITORY,
            )
            .await?;
        Ok(list
            .and_then(|l| l.repositories.into_iter().next())
            .map(RepositoryInfo::from))
    }

    async fn create_repository(
        &self,
        name: &str,
        encryption: &Encryption,
    ) -> Result<RepositoryInfo> {
        let created: CreatedRepository = self
            .cli
            .run_json(&[
                "ecr",
                "create-repository",
                "--repository-name",
                name,
                "--encryption-configuration",
                &encryption_configuration(encryption),
                "--tags",
                "Key=managed-by,Value=stratus",
            ])
            .await?;
        Ok(created.repository.into())
    }

    async fn put_scan_on_push(&self, name: &str, enabled: bool) -> Result<()> {
        let setting = format!("scanOnPush={}", enabled);
        self.cli
            .run(&[
                "ecr",
                "put-image-scanning-configuration",
                "--repository-name",
                name,
                "--image-scanning-configuration",
                &setting,
            ])
            .await?;
        Ok(())
    }

    async fn put_tag_mutability(&self, name: &str, immutable: bool) -> Result<()> {
        let mutability = if immutable { "IMMUTABLE" } else { "MUTABLE" };
        self.cli
            .run(&[
                "ecr",
                "put-image-tag-mutability",
                "--repository-name",
                name,
                "--image-tag-mutability",
                mutability,
            ])
            .await?;
        Ok(())
    }

    async fn put_lifecycle_policy(&self, name: &str, keep_last_images: Option<u32>) -> Result<()> {
        match keep_last_images {
            Some(count) => {
                self.cli
                    .run(&[
                        "ecr",
                        "put-lifecycle-policy",
                        "--repository-name",
                        name,
                        "--lifecycle-policy-text",
                        &lifecycle_policy(count),
                    ])
                    .await?;
            }
            None => {
                let removed = self
                    .cli
                    .run(&["ecr", "delete-lifecycle-policy", "--repository-name", name])
                    .await;
                match removed {
                    Ok(_) => {}
                    Err(e) if e.is_code(&["LifecyclePolicyNotFoundException"]) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    async fn repository_status(&self, name: &str) -> Result<RemoteStatus> {
        Ok(match self.find_repository(name).await? {
            Some(_) => RemoteStatus::Ready,
            None => RemoteStatus::Pending("not found".to_string()),
        })
    }

    async fn delete_repository(&self, name: &str) -> Result<()> {
        self.cli
            .run(&[
                "ecr",
                "delete-repository",
                "--repository-name",
                name,
                "--force",
            ])
            .await?;
        Ok(())
    }
}
