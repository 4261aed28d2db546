//! # Migration Source
//!
//! Migration scripts are read from a directory named by a `file://` URL.
//! Files follow `{version}_{title}.{up|down}.{ext}`, e.g. `3_add_orders.up.sql`.
//!
//! [`plan`] turns the loaded set plus the applied version into the ordered
//! steps needed to reach a target version.

use super::DriverError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static MIGRATION_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)_(.*)\.(down|up)\.(.*)$").expect("valid migration file regex")
});

/// Location of migration scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    url: String,
    directory: PathBuf,
}

impl MigrationSource {
    /// Parse a source URL
    ///
    /// # Errors
    ///
    /// Only `file://<directory>` sources are supported.
    pub fn parse(url: &str) -> Result<Self, DriverError> {
        let url = url.trim();
        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(DriverError::Source(format!(
                "source '{url}' is not a URL (expected file://<directory>)"
            )));
        };
        if !scheme.eq_ignore_ascii_case("file") {
            return Err(DriverError::Source(format!(
                "unsupported source scheme '{scheme}' (only file:// is supported)"
            )));
        }
        if rest.is_empty() {
            return Err(DriverError::Source(format!(
                "source '{url}' does not name a directory"
            )));
        }
        Ok(Self {
            url: url.to_string(),
            directory: PathBuf::from(rest),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl fmt::Display for MigrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// One script on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u64,
    pub title: String,
    pub direction: Direction,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Parse a file name; `None` for names that are not migration scripts
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let captures = MIGRATION_FILE_NAME.captures(file_name)?;
        let version = captures.get(1)?.as_str().parse::<u64>().ok()?;
        let direction = match captures.get(3)?.as_str() {
            "up" => Direction::Up,
            _ => Direction::Down,
        };
        Some(Self {
            version,
            title: captures.get(2)?.as_str().to_string(),
            direction,
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct VersionFiles {
    up: Option<MigrationFile>,
    down: Option<MigrationFile>,
}

/// All migrations found in a source, ordered by version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSet {
    versions: BTreeMap<u64, VersionFiles>,
}

impl MigrationSet {
    /// Read the source directory
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read or holds two scripts for the same version and direction.
    pub async fn load(source: &MigrationSource) -> Result<Self, DriverError> {
        let mut reader = tokio::fs::read_dir(source.directory()).await.map_err(|e| {
            DriverError::Source(format!(
                "failed to read migrations from {}: {e}",
                source.directory().display()
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| DriverError::Source(format!("failed to list migrations: {e}")))?
        {
            let path = entry.path();
            match MigrationFile::from_path(&path) {
                Some(file) => files.push(file),
                None => debug!("Ignoring non-migration file {}", path.display()),
            }
        }
        Self::from_files(files)
    }

    /// Build a set from already parsed files
    ///
    /// # Errors
    ///
    /// Two files for the same version and direction are rejected.
    pub fn from_files(files: impl IntoIterator<Item = MigrationFile>) -> Result<Self, DriverError> {
        let mut versions: BTreeMap<u64, VersionFiles> = BTreeMap::new();
        for file in files {
            let slot = versions.entry(file.version).or_default();
            let target = match file.direction {
                Direction::Up => &mut slot.up,
                Direction::Down => &mut slot.down,
            };
            if let Some(existing) = target {
                return Err(DriverError::Source(format!(
                    "duplicate {} migration for version {}: {} and {}",
                    file.direction,
                    file.version,
                    existing.path.display(),
                    file.path.display()
                )));
            }
            *target = Some(file);
        }
        Ok(Self { versions })
    }

    #[must_use]
    pub fn contains(&self, version: u64) -> bool {
        self.versions.contains_key(&version)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Known versions in ascending order
    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.versions.keys().copied()
    }

    fn previous(&self, version: u64) -> Option<u64> {
        self.versions.range(..version).next_back().map(|(v, _)| *v)
    }

    fn file(&self, version: u64, direction: Direction) -> Result<&MigrationFile, DriverError> {
        let files = self.versions.get(&version);
        let file = match direction {
            Direction::Up => files.and_then(|f| f.up.as_ref()),
            Direction::Down => files.and_then(|f| f.down.as_ref()),
        };
        file.ok_or_else(|| {
            DriverError::Source(format!("no {direction} migration for version {version}"))
        })
    }
}

/// One script to run and the version the database is at afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: u64,
    pub direction: Direction,
    pub path: PathBuf,
    /// `None` once every migration has been rolled back
    pub resulting_version: Option<u64>,
}

/// Steps that move a database from `current` to `target`
///
/// No applied version counts as version `0`; target `0` rolls every migration back.
///
/// # Errors
///
/// The target and the current version must both exist in the set unless they are `0`.
pub fn plan(
    set: &MigrationSet,
    current: Option<u64>,
    target: u64,
) -> Result<Vec<MigrationStep>, DriverError> {
    let current = current.unwrap_or(0);
    if current == target {
        return Ok(Vec::new());
    }
    if target != 0 && !set.contains(target) {
        return Err(DriverError::Source(format!(
            "no migration found for target version {target}"
        )));
    }

    if current != 0 && !set.contains(current) {
        return Err(DriverError::Source(format!(
            "applied version {current} is not present in the migration source"
        )));
    }

    if target > current {
        return set
            .versions
            .range(current.saturating_add(1)..=target)
            .map(|(version, _)| {
                let file = set.file(*version, Direction::Up)?;
                Ok(MigrationStep {
                    version: *version,
                    direction: Direction::Up,
                    path: file.path.clone(),
                    resulting_version: Some(*version),
                })
            })
            .collect();
    }

    set.versions
        .range(target.saturating_add(1)..=current)
        .rev()
        .map(|(version, _)| {
            let file = set.file(*version, Direction::Down)?;
            Ok(MigrationStep {
                version: *version,
                direction: Direction::Down,
                path: file.path.clone(),
                resulting_version: set.previous(*version),
            })
        })
        .collect()
}
