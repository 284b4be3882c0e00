//! Persistence of discovered targets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TargetDescriptor;
use crate::utils::fs::{io_error, write_atomic};
use crate::Result;

const FILE_HEADER: &str = "# Auto-generated file - discovered Shelly devices\n\
                           # Do not edit manually - changes may be overwritten\n\n";

/// Durable storage for discovered targets.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Previously saved targets. A missing store yields an empty list.
    async fn load(&self) -> Result<Vec<TargetDescriptor>>;

    /// Replace the stored set. Targets not marked as discovered are ignored.
    async fn save(&self, targets: &[TargetDescriptor]) -> Result<()>;
}

#[derive(Serialize)]
struct DiscoveredFile<'a> {
    discovered_targets: Vec<&'a TargetDescriptor>,
}

/// YAML file holding a `discovered_targets` list.
#[derive(Debug, Clone)]
pub struct YamlDiscoveryStore {
    path: PathBuf,
}

impl YamlDiscoveryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DiscoveryStore for YamlDiscoveryStore {
    async fn load(&self) -> Result<Vec<TargetDescriptor>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No discovered targets file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error("reading", &self.path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        let Some(entries) = document
            .get("discovered_targets")
            .and_then(serde_yaml::Value::as_sequence)
        else {
            warn!(path = %self.path.display(), "Discovered targets file has no 'discovered_targets' list");
            return Ok(Vec::new());
        };

        let mut targets = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_yaml::from_value::<TargetDescriptor>(entry.clone()) {
                Ok(target) => targets.push(target.mark_discovered()),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Skipping invalid discovered target");
                }
            }
        }

        info!(
            path = %self.path.display(),
            count = targets.len(),
            "Loaded discovered targets"
        );
        Ok(targets)
    }

    async fn save(&self, targets: &[TargetDescriptor]) -> Result<()> {
        let file = DiscoveredFile {
            discovered_targets: targets.iter().filter(|t| t.discovered).collect(),
        };
        let count = file.discovered_targets.len();

        let mut contents = String::from(FILE_HEADER);
        contents.push_str(&serde_yaml::to_string(&file)?);
        write_atomic(&self.path, contents.as_bytes()).await?;

        info!(path = %self.path.display(), count, "Saved discovered targets");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shelly_devices::{ChannelDescriptor, Credentials};

    use super::*;

    fn discovered(name: &str, address: &str) -> TargetDescriptor {
        TargetDescriptor::new(name, address)
            .with_channels(vec![ChannelDescriptor::switch(0), ChannelDescriptor::switch(1)])
            .mark_discovered()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlDiscoveryStore::new(dir.path().join("discovered.yml"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("discovered.yml");
        let store = YamlDiscoveryStore::new(&path);

        let with_credentials = discovered("shelly_10_0_0_6_plug", "10.0.0.6")
            .with_credentials(Some(Credentials::new("admin", "pw")));
        let manual = TargetDescriptor::new("manual", "10.0.0.9");
        let targets = vec![discovered("shelly_10_0_0_5_pro", "10.0.0.5"), with_credentials, manual];

        store.save(&targets).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.starts_with("# Auto-generated file - discovered Shelly devices\n"));
        assert!(contents.contains("discovered_targets:"));
        assert!(!contents.contains("manual"));
        assert!(!dir.path().join("nested").join("discovered.yml.tmp").exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, targets[..2].to_vec());
    }

    #[tokio::test]
    async fn test_load_skips_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovered.yml");
        tokio::fs::write(
            &path,
            "discovered_targets:\n  - name: ok\n    url: 10.0.0.5\n  - url: 10.0.0.6\n  - name: also_ok\n    url: 10.0.0.7\n    discovered: false\n",
        )
        .await
        .unwrap();

        let loaded = YamlDiscoveryStore::new(&path).load().await.unwrap();
        let names: Vec<_> = loaded.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "also_ok"]);
        assert!(loaded.iter().all(|t| t.discovered));
    }
}
