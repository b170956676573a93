//! Configuration resolution: defaults < YAML file < environment

use crate::error::{ConfigError, Result};
use crate::model::ResolvedConfiguration;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

const CONFIG_CANDIDATES: [&str; 2] = ["stratus.local.yaml", "stratus.yaml"];

/// Locate the project configuration file
///
/// Search order:
/// 1. `STRATUS_CONFIG_PATH` (explicit path)
/// 2. current directory: stratus.local.yaml, stratus.yaml
/// 3. `./.stratus/` with the same candidates
/// 4. `~/.config/stratus/stratus.yaml`
///
/// Returns `None` when nothing is found; defaults apply in that case.
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("STRATUS_CONFIG_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let current_dir = std::env::current_dir().ok()?;
    for dir in [current_dir.clone(), current_dir.join(".stratus")] {
        for filename in &CONFIG_CANDIDATES {
            let path = dir.join(filename);
            if path.exists() {
                return Some(path);
            }
        }
    }

    let global = dirs::config_dir()?.join("stratus").join("stratus.yaml");
    global.exists().then_some(global)
}

/// Builds a [`ResolvedConfiguration`]
#[derive(Debug, Default)]
pub struct ConfigResolver {
    file: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this file instead of searching for one; it must exist
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
        }
    }

    /// Resolve against the real process environment
    pub fn resolve(&self) -> Result<ResolvedConfiguration> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve with an explicit variable lookup
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfiguration>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.clone()));
                }
                load_file(path)?
            }
            None => match find_config_file() {
                Some(path) => load_file(&path)?,
                None => {
                    tracing::debug!("No config file found, using defaults");
                    ResolvedConfiguration::default()
                }
            },
        };

        apply_env(&mut config, &lookup)?;
        validate(&config)?;
        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<ResolvedConfiguration> {
    let content = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

fn apply_env<F>(config: &mut ResolvedConfiguration, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("STRATUS_PROJECT") {
        config.project = v;
    }
    if let Some(v) = get("STRATUS_ENVIRONMENT") {
        config.environment = v;
    }
    if let Some(v) = get("STRATUS_REGION").or_else(|| get("AWS_REGION")) {
        config.region = v;
    }
    if let Some(v) = get("AWS_PROFILE") {
        config.profile = Some(v);
    }
    if let Some(v) = get("STRATUS_STATE_DIR") {
        config.state.dir = PathBuf::from(v);
    }
    if let Some(v) = get("STRATUS_STATE_LOCK") {
        config.state.lock = parse_bool("STRATUS_STATE_LOCK", &v)?;
    }
    if let Some(v) = get("STRATUS_AVAILABILITY_ZONES") {
        config.network.availability_zones = split_list(&v);
    }
    if let Some(v) = get("STRATUS_ENABLE_NAT") {
        config.network.enable_nat = parse_bool("STRATUS_ENABLE_NAT", &v)?;
    }
    if let Some(v) = get("STRATUS_SINGLE_NAT") {
        config.network.single_nat = parse_bool("STRATUS_SINGLE_NAT", &v)?;
    }
    if let Some(v) = get("STRATUS_CLUSTER_VERSION") {
        config.cluster.version = v;
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("'{}' is not a boolean", other))),
    }
}

/// Structural validation. Completeness checks per resource kind happen later,
/// when a provisioner checks its prerequisites.
fn validate(config: &ResolvedConfiguration) -> Result<()> {
    validate_name("project", &config.project)?;
    validate_name("environment", &config.environment)?;

    if config.region.trim().is_empty() {
        return Err(ConfigError::invalid("region", "must not be empty"));
    }

    let network = &config.network;
    if !network.vpc_cidr.is_empty() {
        validate_cidr("network.vpc_cidr", &network.vpc_cidr)?;
    }
    for cidr in network
        .public_subnet_cidrs
        .iter()
        .chain(&network.private_subnet_cidrs)
    {
        validate_cidr("network subnet", cidr)?;
    }

    for purpose in &config.object_store.buckets {
        validate_name("object_store.buckets", purpose)?;
    }
    for repository in &config.image_registry.repositories {
        validate_name("image_registry.repositories", repository)?;
    }

    if config.timeouts.poll_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "timeouts.poll_interval_secs",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_name(key: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            key,
            format!("'{}' must be lowercase letters, digits and '-'", value),
        ))
    }
}

fn validate_cidr(key: &str, value: &str) -> Result<()> {
    let bad = || ConfigError::invalid(key, format!("'{}' is not an IPv4 CIDR block", value));
    let (addr, prefix) = value.split_once('/').ok_or_else(bad)?;
    addr.parse::<Ipv4Addr>().map_err(|_| bad())?;
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::fs;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.yaml");
        fs::write(
            &path,
            r#"
project: shop
environment: prod
network:
  enable_nat: false
cluster:
  max_size: 6
"#,
        )
        .unwrap();

        let config = ConfigResolver::with_file(&path)
            .resolve_with(env(&[]))
            .unwrap();

        assert_eq!(config.project, "shop");
        assert_eq!(config.environment, "prod");
        assert!(!config.network.enable_nat);
        assert_eq!(config.network.vpc_cidr, "10.0.0.0/16");
        assert_eq!(config.cluster.max_size, 6);
        assert_eq!(config.cluster.min_size, 1);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.yaml");
        fs::write(&path, "project: shop\nregion: eu-west-1\n").unwrap();

        let config = ConfigResolver::with_file(&path)
            .resolve_with(env(&[
                ("STRATUS_ENVIRONMENT", "stg"),
                ("AWS_REGION", "ap-northeast-1"),
                ("STRATUS_AVAILABILITY_ZONES", "ap-northeast-1a, ap-northeast-1c"),
                ("STRATUS_SINGLE_NAT", "false"),
            ]))
            .unwrap();

        assert_eq!(config.project, "shop");
        assert_eq!(config.environment, "stg");
        assert_eq!(config.region, "ap-northeast-1");
        assert_eq!(
            config.network.availability_zones,
            vec!["ap-northeast-1a", "ap-northeast-1c"]
        );
        assert!(!config.network.single_nat);
    }

    #[test]
    fn test_stratus_region_wins_over_aws_region() {
        let (_dir, path) = write_empty();
        let config = ConfigResolver::with_file(&path)
            .resolve_with(env(&[
                ("STRATUS_REGION", "us-west-2"),
                ("AWS_REGION", "eu-central-1"),
            ]))
            .unwrap();
        assert_eq!(config.region, "us-west-2");
    }

    fn write_empty() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.yaml");
        fs::write(&path, "{}\n").unwrap();
        (dir, path)
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.yaml");
        fs::write(&path, "projekt: typo\n").unwrap();

        let err = ConfigResolver::with_file(&path)
            .resolve_with(env(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_rejects_bad_cidr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.yaml");
        fs::write(&path, "network:\n  vpc_cidr: 10.0.0.0/40\n").unwrap();

        let err = ConfigResolver::with_file(&path)
            .resolve_with(env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("network.vpc_cidr"));
    }

    #[test]
    fn test_rejects_bad_project_name() {
        let (_dir, path) = write_empty();
        let err = ConfigResolver::with_file(&path)
            .resolve_with(env(&[("STRATUS_PROJECT", "My_Project")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "project"));
    }

    #[test]
    fn test_rejects_bad_bool() {
        let (_dir, path) = write_empty();
        let err = ConfigResolver::with_file(&path)
            .resolve_with(env(&[("STRATUS_ENABLE_NAT", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("STRATUS_ENABLE_NAT"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigResolver::with_file("/nonexistent/stratus.yaml")
            .resolve_with(env(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_kms_encryption_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.yaml");
        fs::write(
            &path,
            "object_store:\n  encryption:\n    type: kms\n    key_id: alias/data\n",
        )
        .unwrap();

        let config = ConfigResolver::with_file(&path)
            .resolve_with(env(&[]))
            .unwrap();
        assert_eq!(
            config.object_store.encryption,
            crate::Encryption::Kms {
                key_id: Some("alias/data".to_string())
            }
        );
    }

    #[test]
    #[serial]
    fn test_find_config_file_prefers_local() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stratus.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join("stratus.local.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let found = temp_env::with_var_unset("STRATUS_CONFIG_PATH", find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(found.unwrap().ends_with("stratus.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_from_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("custom.yaml");
        fs::write(&path, "{}").unwrap();

        let found = temp_env::with_var("STRATUS_CONFIG_PATH", Some(&path), find_config_file);
        assert_eq!(found, Some(path));
    }

    #[test]
    #[serial]
    fn test_resolve_reads_process_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stratus.yaml");
        fs::write(&path, "{}").unwrap();

        let config = temp_env::with_vars(
            [
                ("STRATUS_PROJECT", Some("billing")),
                ("STRATUS_REGION", None),
                ("AWS_REGION", Some("eu-west-2")),
            ],
            || ConfigResolver::with_file(&path).resolve(),
        )
        .unwrap();

        assert_eq!(config.project, "billing");
        assert_eq!(config.region, "eu-west-2");
    }
}
