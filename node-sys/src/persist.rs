// SPDX-License-Identifier: GPL-3.0-only

//! Persistence of files into the `/config` overlay
//!
//! A persisted path has a copy below the overlay base which is bind mounted
//! back over the live path. The manifest (`/config/files`) lists every
//! persisted path and must match the active bind mounts.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{CommandRunner, CommandSpec};
use crate::fs::{atomic_write, read_optional};
use crate::mounts::{self, MountEntry};
use crate::{Result, SysError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    Persisted,
    AlreadyPersisted,
    /// The overlay is not mounted; nothing was done.
    Skipped,
}

/// Differences between the manifest and the active bind mounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceAudit {
    /// Listed in the manifest but not bind mounted
    pub missing_mounts: Vec<String>,
    /// Bind mounted from the overlay but absent from the manifest
    pub unlisted_mounts: Vec<String>,
}

impl PersistenceAudit {
    pub fn is_clean(&self) -> bool {
        self.missing_mounts.is_empty() && self.unlisted_mounts.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PersistPaths {
    /// Root of the live filesystem
    pub root: PathBuf,
    pub base: PathBuf,
    pub manifest: PathBuf,
    pub mountinfo: PathBuf,
}

impl Default for PersistPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            base: PathBuf::from("/config"),
            manifest: PathBuf::from("/config/files"),
            mountinfo: PathBuf::from(mounts::MOUNTINFO),
        }
    }
}

pub struct PersistentStore<'a> {
    runner: &'a dyn CommandRunner,
    paths: PersistPaths,
}

impl<'a> PersistentStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self::with_paths(runner, PersistPaths::default())
    }

    pub fn with_paths(runner: &'a dyn CommandRunner, paths: PersistPaths) -> Self {
        Self { runner, paths }
    }

    /// Whether the overlay base is mounted.
    pub fn is_enabled(&self) -> bool {
        match self.mount_table() {
            Ok(entries) => mounts::is_mount_point(&entries, &self.paths.base.to_string_lossy()),
            Err(e) => {
                warn!("Could not read mount table: {}", e);
                false
            }
        }
    }

    pub fn persist(&self, path: &str) -> Result<PersistOutcome> {
        if !self.is_enabled() {
            debug!("Overlay not enabled, not persisting {}", path);
            return Ok(PersistOutcome::Skipped);
        }

        let live = self.live(path);
        let meta = fs::symlink_metadata(&live).map_err(|e| SysError::path_io(&live, e))?;

        let outcome = if meta.file_type().is_symlink() {
            self.persist_symlink(path, &live)?
        } else if meta.is_dir() {
            self.persist_directory(path, &live)?
        } else {
            self.persist_file(path, &live)?
        };

        match outcome {
            PersistOutcome::Persisted => info!("Successfully persisted {}", path),
            PersistOutcome::AlreadyPersisted => info!("{} already persisted", path),
            PersistOutcome::Skipped => {}
        }
        Ok(outcome)
    }

    fn persist_file(&self, path: &str, live: &Path) -> Result<PersistOutcome> {
        let overlay = self.overlay(path);

        if overlay.exists() {
            if same_content(live, &overlay) {
                if self.is_bind_mounted(live) {
                    self.add_to_manifest(path)?;
                    return Ok(PersistOutcome::AlreadyPersisted);
                }
                warn!("Overlay copy of {} is not bind mounted, mounting it", path);
                self.bind_mount(&overlay, live)?;
                self.add_to_manifest(path)?;
                return Ok(PersistOutcome::Persisted);
            }
            warn!("Overlay copy of {} differs, repairing bind mount", path);
            self.unmount(live);
            fs::remove_file(&overlay).map_err(|e| SysError::path_io(&overlay, e))?;
        }

        create_parent(&overlay)?;
        fs::copy(live, &overlay).map_err(|e| SysError::path_io(&overlay, e))?;
        copy_ownership(live, &overlay)?;
        self.bind_mount(&overlay, live)?;
        self.add_to_manifest(path)?;
        Ok(PersistOutcome::Persisted)
    }

    fn persist_directory(&self, path: &str, live: &Path) -> Result<PersistOutcome> {
        let overlay = self.overlay(path);
        if overlay.is_dir()
            && self.is_bind_mounted(live)
            && self.manifest()?.iter().any(|entry| entry == path)
        {
            return Ok(PersistOutcome::AlreadyPersisted);
        }

        copy_tree(live, &overlay)?;
        copy_ownership(live, &overlay)?;
        self.bind_mount(&overlay, live)?;
        self.add_to_manifest(path)?;
        Ok(PersistOutcome::Persisted)
    }

    fn persist_symlink(&self, path: &str, live: &Path) -> Result<PersistOutcome> {
        let target = fs::read_link(live).map_err(|e| SysError::path_io(live, e))?;
        let overlay = self.overlay(path);

        if fs::read_link(&overlay).is_ok_and(|existing| existing == target) {
            self.add_to_manifest(path)?;
            return Ok(PersistOutcome::AlreadyPersisted);
        }

        create_parent(&overlay)?;
        let tmp = overlay.with_extension("tmp-link");
        let _ = fs::remove_file(&tmp);
        std::os::unix::fs::symlink(&target, &tmp).map_err(|e| SysError::path_io(&tmp, e))?;
        fs::rename(&tmp, &overlay).map_err(|e| SysError::path_io(&overlay, e))?;
        self.add_to_manifest(path)?;
        Ok(PersistOutcome::Persisted)
    }

    /// Undo [`persist`](Self::persist), leaving the current content at the
    /// live path. Returns false when the path was not persisted.
    pub fn unpersist(&self, path: &str) -> Result<bool> {
        if !self.manifest()?.iter().any(|entry| entry == path) {
            warn!("{} is not persisted", path);
            return Ok(false);
        }

        let live = self.live(path);
        let overlay = self.overlay(path);

        match fs::symlink_metadata(&overlay) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(&overlay).map_err(|e| SysError::path_io(&overlay, e))?;
            }
            Ok(meta) if meta.is_dir() => {
                self.unmount(&live);
                copy_tree(&overlay, &live)?;
                fs::remove_dir_all(&overlay).map_err(|e| SysError::path_io(&overlay, e))?;
            }
            Ok(_) => {
                self.unmount(&live);
                create_parent(&live)?;
                fs::copy(&overlay, &live).map_err(|e| SysError::path_io(&live, e))?;
                fs::remove_file(&overlay).map_err(|e| SysError::path_io(&overlay, e))?;
            }
            Err(_) => warn!("Overlay copy of {} is missing", path),
        }

        self.remove_from_manifest(path)?;
        self.prune_empty_dirs(&overlay);
        info!("Successfully unpersisted {}", path);
        Ok(true)
    }

    /// Unpersist `path` and remove it from the live filesystem.
    pub fn delete(&self, path: &str) -> Result<()> {
        if self.manifest()?.iter().any(|entry| entry == path) {
            self.unpersist(path)?;
        }

        let live = self.live(path);
        match fs::symlink_metadata(&live) {
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&live).map_err(|e| SysError::path_io(&live, e))?
            }
            Ok(_) => fs::remove_file(&live).map_err(|e| SysError::path_io(&live, e))?,
            Err(_) => debug!("{} does not exist", path),
        }
        Ok(())
    }

    pub fn is_persisted(&self, path: &str) -> bool {
        let listed = self
            .manifest()
            .map(|entries| entries.iter().any(|entry| entry == path))
            .unwrap_or(false);
        if !listed {
            return false;
        }

        let live = self.live(path);
        let overlay = self.overlay(path);
        match fs::symlink_metadata(&overlay) {
            Ok(meta) if meta.file_type().is_symlink() => true,
            Ok(meta) if meta.is_file() => {
                same_content(&live, &overlay) && self.is_bind_mounted(&live)
            }
            Ok(_) => self.is_bind_mounted(&live),
            Err(_) => false,
        }
    }

    /// Whether `live` currently has a mount on top of it.
    fn is_bind_mounted(&self, live: &Path) -> bool {
        match self.mount_table() {
            Ok(entries) => mounts::is_mount_point(&entries, &live.to_string_lossy()),
            Err(e) => {
                warn!("Could not read mount table: {}", e);
                false
            }
        }
    }

    pub fn audit(&self) -> Result<PersistenceAudit> {
        let entries = self.mount_table()?;
        let manifest = self.manifest()?;
        let base = self.paths.base.to_string_lossy().to_string();

        let Some(base_device) = entries
            .iter()
            .find(|entry| entry.mount_point == base)
            .map(|entry| entry.major_minor.clone())
        else {
            return Ok(PersistenceAudit {
                missing_mounts: Vec::new(),
                unlisted_mounts: Vec::new(),
            });
        };

        let overlay_mounts: Vec<&MountEntry> = entries
            .iter()
            .filter(|entry| entry.major_minor == base_device && entry.mount_point != base)
            .collect();

        let mut audit = PersistenceAudit::default();

        for path in &manifest {
            let is_link = fs::symlink_metadata(self.overlay(path))
                .is_ok_and(|meta| meta.file_type().is_symlink());
            if is_link {
                continue;
            }
            let live = self.live(path).to_string_lossy().to_string();
            if !overlay_mounts.iter().any(|entry| entry.mount_point == live) {
                audit.missing_mounts.push(path.clone());
            }
        }

        for entry in overlay_mounts {
            let logical = self.logical(&entry.mount_point);
            if !manifest.contains(&logical) {
                audit.unlisted_mounts.push(logical);
            }
        }

        if !audit.is_clean() {
            warn!(
                "Persistence audit: {} missing mounts, {} unlisted mounts",
                audit.missing_mounts.len(),
                audit.unlisted_mounts.len()
            );
        }
        Ok(audit)
    }

    pub fn manifest(&self) -> Result<Vec<String>> {
        Ok(read_optional(&self.paths.manifest)?
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn add_to_manifest(&self, path: &str) -> Result<()> {
        let mut entries = self.manifest()?;
        if entries.iter().any(|entry| entry == path) {
            return Ok(());
        }
        entries.push(path.to_string());
        self.write_manifest(&entries)
    }

    fn remove_from_manifest(&self, path: &str) -> Result<()> {
        let mut entries = self.manifest()?;
        entries.retain(|entry| entry != path);
        self.write_manifest(&entries)
    }

    fn write_manifest(&self, entries: &[String]) -> Result<()> {
        let mut content = entries.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        atomic_write(&self.paths.manifest, &content)
    }

    fn bind_mount(&self, overlay: &Path, live: &Path) -> Result<()> {
        self.runner.check(
            &CommandSpec::new("mount")
                .args(["-n", "--bind"])
                .arg(overlay.to_string_lossy())
                .arg(live.to_string_lossy()),
        )?;
        Ok(())
    }

    fn unmount(&self, live: &Path) {
        if !self
            .runner
            .succeeds(&CommandSpec::new("umount").arg("-n").arg(live.to_string_lossy()))
        {
            debug!("{:?} was not mounted", live);
        }
    }

    fn prune_empty_dirs(&self, start: &Path) {
        let mut dir = start.parent();
        while let Some(current) = dir {
            if current == self.paths.base || !current.starts_with(&self.paths.base) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        mounts::read_mountinfo(&self.paths.mountinfo)
    }

    fn live(&self, path: &str) -> PathBuf {
        self.paths.root.join(path.trim_start_matches('/'))
    }

    fn overlay(&self, path: &str) -> PathBuf {
        self.paths.base.join(path.trim_start_matches('/'))
    }

    fn logical(&self, live: &str) -> String {
        match Path::new(live).strip_prefix(&self.paths.root) {
            Ok(rel) => format!("/{}", rel.to_string_lossy()),
            Err(_) => live.to_string(),
        }
    }
}

fn same_content(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SysError::path_io(parent, e))?;
    }
    Ok(())
}

fn copy_ownership(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from).map_err(|e| SysError::path_io(from, e))?;
    std::os::unix::fs::chown(to, Some(meta.uid()), Some(meta.gid()))
        .map_err(|e| SysError::path_io(to, e))
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| SysError::path_io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| SysError::path_io(from, e))? {
        let entry = entry?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_tree(&source, &dest)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&source).map_err(|e| SysError::path_io(&source, e))?;
            let _ = fs::remove_file(&dest);
            std::os::unix::fs::symlink(target, &dest).map_err(|e| SysError::path_io(&dest, e))?;
        } else {
            fs::copy(&source, &dest).map_err(|e| SysError::path_io(&dest, e))?;
        }
    }
    Ok(())
}
