//! Output layout, staged publishing and manifests.
//!
//! ```text
//! <root>/
//!   fox/
//!     fox_low.glb
//!     fox_high.glb
//!     fox_manifest.json
//!     .fox_high.glb.4711-12.tmp     (staging, only while a job runs)
//! ```
//!
//! Engines never write to a final path. A worker asks for a [`StagedFile`],
//! lets the engine export into its temporary path, and publishes it with a
//! rename in the same directory. Readers therefore see either the previous
//! file or the complete new one. A staged file that is dropped unpublished
//! is deleted. Staging files left behind by a process that died mid-job are
//! swept the next time the same asset is staged, once they are older than
//! [`STALE_STAGING_AGE`].
//!
//! Manifest updates are read-merge-write cycles. They are serialized per
//! manifest path across every manager in the process, so concurrent jobs on
//! different tiers of one entry never drop each other's tiers.

mod manifest;

pub use manifest::{Manifest, GENERATOR};

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;

/// Extension of exported assets.
pub const ASSET_EXTENSION: &str = "glb";

/// Staging files older than this are treated as leftovers of a dead process.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(600);

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

static MANIFEST_LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();

fn manifest_lock(path: &Path) -> Arc<Mutex<()>> {
    MANIFEST_LOCKS
        .get_or_init(DashMap::new)
        .entry(path.to_path_buf())
        .or_default()
        .clone()
}

/// Export bookkeeping errors.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The entry directory or staging path could not be prepared.
    #[error("Failed to prepare {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The engine reported success but wrote nothing.
    #[error("Engine produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    /// The engine wrote an empty file.
    #[error("Engine produced an empty file at {}", .0.display())]
    EmptyOutput(PathBuf),

    /// The staged file could not be moved into place.
    #[error("Failed to publish {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A manifest could not be read or written.
    #[error("Manifest I/O failed for {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A manifest could not be encoded or decoded.
    #[error("Manifest encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A published asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Temporary export target that becomes a final file on [`publish`](Self::publish).
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    dest: PathBuf,
    published: bool,
}

impl StagedFile {
    /// Path the engine should export to.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Final path the file is published to.
    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Atomically replaces the destination with the staged file.
    pub async fn publish(mut self) -> Result<PublishedFile, ExportError> {
        let metadata = match tokio::fs::metadata(&self.temp).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ExportError::MissingOutput(self.dest.clone()));
            }
            Err(source) => {
                return Err(ExportError::Publish {
                    path: self.dest.clone(),
                    source,
                });
            }
        };
        if metadata.len() == 0 {
            return Err(ExportError::EmptyOutput(self.dest.clone()));
        }

        tokio::fs::rename(&self.temp, &self.dest)
            .await
            .map_err(|source| ExportError::Publish {
                path: self.dest.clone(),
                source,
            })?;
        self.published = true;

        debug!(path = %self.dest.display(), size = metadata.len(), "Published asset");
        Ok(PublishedFile {
            path: self.dest.clone(),
            size: metadata.len(),
        })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.published {
            match std::fs::remove_file(&self.temp) {
                Ok(()) => debug!(path = %self.temp.display(), "Discarded staged export"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %self.temp.display(), error = %e, "Failed to discard staged export")
                }
            }
        }
    }
}

/// Deterministic naming, output layout and manifest emission.
#[derive(Debug, Clone)]
pub struct ExportManager {
    root: PathBuf,
}

impl ExportManager {
    /// Creates a manager rooted at `root`. Nothing is created until needed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all files of an entry.
    pub fn entry_dir(&self, entry_id: &str) -> PathBuf {
        self.root.join(entry_id)
    }

    /// `<entry>_<tier>.glb`
    pub fn asset_file_name(entry_id: &str, tier: &str) -> String {
        format!("{entry_id}_{tier}.{ASSET_EXTENSION}")
    }

    /// `<entry>_manifest.json`
    pub fn manifest_file_name(entry_id: &str) -> String {
        format!("{entry_id}_manifest.json")
    }

    /// Final path of an asset.
    pub fn asset_path(&self, entry_id: &str, tier: &str) -> PathBuf {
        self.entry_dir(entry_id)
            .join(Self::asset_file_name(entry_id, tier))
    }

    /// Final path of an entry's manifest.
    pub fn manifest_path(&self, entry_id: &str) -> PathBuf {
        self.entry_dir(entry_id)
            .join(Self::manifest_file_name(entry_id))
    }

    /// Prepares a staging path next to the asset's final location.
    pub async fn stage(&self, entry_id: &str, tier: &str) -> Result<StagedFile, ExportError> {
        let dir = self.entry_dir(entry_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ExportError::Prepare {
                path: dir.clone(),
                source,
            })?;

        let file_name = Self::asset_file_name(entry_id, tier);
        sweep_stale_staging(&dir, &file_name).await;
        let temp = dir.join(staging_name(&file_name));
        Ok(StagedFile {
            temp,
            dest: dir.join(file_name),
            published: false,
        })
    }

    /// Reads an entry's manifest, `None` if it has none yet.
    pub async fn read_manifest(&self, entry_id: &str) -> Result<Option<Manifest>, ExportError> {
        let path = self.manifest_path(entry_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ExportError::Manifest { path, source }),
        }
    }

    /// Writes the manifest for `entry` after a batch.
    ///
    /// The tier map holds every tier that succeeded in the batch. Tiers the
    /// batch did not attempt keep their previous manifest entry as long as
    /// the asset is still on disk; attempted tiers that failed are dropped.
    pub async fn write_manifest(
        &self,
        entry: &CatalogEntry,
        attempted: &BTreeSet<String>,
        succeeded: &BTreeSet<String>,
    ) -> Result<Manifest, ExportError> {
        let lock = manifest_lock(&self.manifest_path(&entry.id));
        let _guard = lock.lock().await;

        let mut manifest = Manifest::for_entry(entry);
        for tier in succeeded {
            manifest.insert_tier(tier, Self::asset_file_name(&entry.id, tier));
        }

        let previous = match self.read_manifest(&entry.id).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(entry = %entry.id, error = %e, "Ignoring unreadable previous manifest");
                None
            }
        };
        if let Some(previous) = previous {
            for (tier, file) in previous.tiers {
                if attempted.contains(&tier) || !entry.supports_tier(&tier) {
                    continue;
                }
                if tokio::fs::try_exists(self.entry_dir(&entry.id).join(&file))
                    .await
                    .unwrap_or(false)
                {
                    manifest.insert_tier(&tier, file);
                }
            }
        }

        self.store_manifest(&manifest).await?;
        info!(
            entry = %entry.id,
            tiers = manifest.tiers.len(),
            path = %self.manifest_path(&entry.id).display(),
            "Manifest written"
        );
        Ok(manifest)
    }

    async fn store_manifest(&self, manifest: &Manifest) -> Result<(), ExportError> {
        let dir = self.entry_dir(&manifest.entry_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ExportError::Prepare {
                path: dir.clone(),
                source,
            })?;

        let path = self.manifest_path(&manifest.entry_id);
        let bytes = serde_json::to_vec_pretty(manifest)?;

        // Write atomically via temp file
        let file_name = Self::manifest_file_name(&manifest.entry_id);
        sweep_stale_staging(&dir, &file_name).await;
        let temp = dir.join(staging_name(&file_name));
        if let Err(source) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ExportError::Manifest { path, source });
        }
        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ExportError::Manifest { path, source });
        }
        Ok(())
    }
}

/// Hidden, unique temporary name in the same directory as `file_name`.
fn staging_name(file_name: &str) -> String {
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(".{file_name}.{}-{n}.tmp", std::process::id())
}

/// Removes staging files of `file_name` older than [`STALE_STAGING_AGE`].
async fn sweep_stale_staging(dir: &Path, file_name: &str) {
    let prefix = format!(".{file_name}.");
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };

    while let Ok(Some(item)) = entries.next_entry().await {
        let name = item.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(&prefix) || !name.ends_with(".tmp") {
            continue;
        }

        let stale = item
            .metadata()
            .await
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age >= STALE_STAGING_AGE);
        if !stale {
            continue;
        }

        let path = item.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed stale staging file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale staging file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AnatomyMarker, VisualizationMode};
    use tempfile::TempDir;

    fn fox() -> CatalogEntry {
        CatalogEntry::new(
            "fox",
            "Fox",
            vec!["low".into(), "high".into()],
            vec![VisualizationMode::Normal, VisualizationMode::Xray],
        )
        .with_markers(vec![AnatomyMarker::new("heart", [0.3, 0.0, 0.6])])
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_layout() {
        let manager = ExportManager::new("/out");
        assert_eq!(
            manager.asset_path("fox", "low"),
            PathBuf::from("/out/fox/fox_low.glb")
        );
        assert_eq!(
            manager.manifest_path("fox"),
            PathBuf::from("/out/fox/fox_manifest.json")
        );
    }

    #[tokio::test]
    async fn test_publish_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());
        let dest = manager.asset_path("fox", "low");

        let staged = manager.stage("fox", "low").await.unwrap();
        std::fs::write(staged.path(), b"first").unwrap();
        staged.publish().await.unwrap();

        let staged = manager.stage("fox", "low").await.unwrap();
        std::fs::write(staged.path(), b"second version").unwrap();
        let published = staged.publish().await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second version");
        assert_eq!(published.size, 14);
    }

    #[tokio::test]
    async fn test_dropped_stage_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());
        let dest = manager.asset_path("fox", "low");

        let staged = manager.stage("fox", "low").await.unwrap();
        std::fs::write(staged.path(), b"good").unwrap();
        staged.publish().await.unwrap();

        let staged = manager.stage("fox", "low").await.unwrap();
        let temp = staged.path().to_path_buf();
        std::fs::write(&temp, b"half-writ").unwrap();
        drop(staged);

        assert!(!temp.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"good");
    }

    #[tokio::test]
    async fn test_missing_and_empty_output() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());

        let staged = manager.stage("fox", "low").await.unwrap();
        assert!(matches!(
            staged.publish().await,
            Err(ExportError::MissingOutput(_))
        ));

        let staged = manager.stage("fox", "low").await.unwrap();
        std::fs::write(staged.path(), b"").unwrap();
        assert!(matches!(
            staged.publish().await,
            Err(ExportError::EmptyOutput(_))
        ));
        assert!(!manager.asset_path("fox", "low").exists());
    }

    #[tokio::test]
    async fn test_manifest_lists_succeeded_tiers_only() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());
        let entry = fox();

        let manifest = manager
            .write_manifest(&entry, &set(&["low", "high"]), &set(&["low"]))
            .await
            .unwrap();
        assert_eq!(manifest.tier_names(), set(&["low"]));

        let reread = manager.read_manifest("fox").await.unwrap().unwrap();
        assert_eq!(reread.tiers.get("low").unwrap(), "fox_low.glb");
        assert_eq!(reread.markers.get("heart"), Some(&[0.3, 0.0, 0.6]));
        assert_eq!(reread.modes.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_batch_keeps_unattempted_tiers_on_disk() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());
        let entry = fox();

        // Earlier full batch: both tiers built.
        for tier in ["low", "high"] {
            let staged = manager.stage("fox", tier).await.unwrap();
            std::fs::write(staged.path(), b"glb").unwrap();
            staged.publish().await.unwrap();
        }
        manager
            .write_manifest(&entry, &set(&["low", "high"]), &set(&["low", "high"]))
            .await
            .unwrap();

        // Rebuild of low alone that fails: high survives, low is dropped.
        let manifest = manager
            .write_manifest(&entry, &set(&["low"]), &set(&[]))
            .await
            .unwrap();
        assert_eq!(manifest.tier_names(), set(&["high"]));

        // high removed from disk: no longer listed.
        std::fs::remove_file(manager.asset_path("fox", "high")).unwrap();
        let manifest = manager
            .write_manifest(&entry, &set(&["low"]), &set(&["low"]))
            .await
            .unwrap();
        assert_eq!(manifest.tier_names(), set(&["low"]));
    }

    #[tokio::test]
    async fn test_manifest_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());
        manager
            .write_manifest(&fox(), &set(&["low"]), &set(&["low"]))
            .await
            .unwrap();
        let names: Vec<_> = std::fs::read_dir(manager.entry_dir("fox"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["fox_manifest.json".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_manifest_writes_keep_both_tiers() {
        let entry = fox();

        for _ in 0..25 {
            let dir = TempDir::new().unwrap();
            let entry_dir = dir.path().join("fox");
            std::fs::create_dir_all(&entry_dir).unwrap();
            std::fs::write(entry_dir.join("fox_low.glb"), b"glb").unwrap();
            std::fs::write(entry_dir.join("fox_high.glb"), b"glb").unwrap();

            // Two independent managers on one root, one tier each.
            let writers = ["low", "high"].map(|tier| {
                let manager = ExportManager::new(dir.path());
                let entry = entry.clone();
                tokio::spawn(async move {
                    manager
                        .write_manifest(&entry, &set(&[tier]), &set(&[tier]))
                        .await
                        .unwrap();
                })
            });
            for writer in writers {
                writer.await.unwrap();
            }

            let manifest = ExportManager::new(dir.path())
                .read_manifest("fox")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(manifest.tier_names(), set(&["low", "high"]));
        }
    }

    #[tokio::test]
    async fn test_stage_sweeps_stale_staging_files() {
        let dir = TempDir::new().unwrap();
        let manager = ExportManager::new(dir.path());
        let entry_dir = manager.entry_dir("fox");
        std::fs::create_dir_all(&entry_dir).unwrap();

        let stale = entry_dir.join(".fox_low.glb.99999-3.tmp");
        let fresh = entry_dir.join(".fox_low.glb.99999-4.tmp");
        let other_tier = entry_dir.join(".fox_high.glb.99999-5.tmp");
        for path in [&stale, &fresh, &other_tier] {
            std::fs::write(path, b"partial").unwrap();
        }
        let long_ago = std::time::SystemTime::now() - STALE_STAGING_AGE * 2;
        for path in [&stale, &other_tier] {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(long_ago)
                .unwrap();
        }

        let staged = manager.stage("fox", "low").await.unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(other_tier.exists());
        assert_ne!(staged.path(), fresh.as_path());
    }
}
