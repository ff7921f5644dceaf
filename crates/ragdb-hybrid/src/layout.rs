//! Generation-based persistence layout.
//!
//! Every commit lands in a fresh `gen-NNNNNN` directory that was fully written
//! as a hidden staging directory first. `CURRENT` names the live generation
//! and is replaced with a single rename, so a reader resolves either the old
//! or the new generation and never a half-written one. The previous
//! generation is kept after a commit; older ones are pruned.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

use ragdb_core::docstore::DOCSTORE_FILE;
use ragdb_core::embed_config::EMBED_CONFIG_FILE;
use ragdb_core::error::{Error, Result};

pub const CURRENT_FILE: &str = "CURRENT";
pub const BM25_DIR: &str = "bm25";
pub const VECTOR_DIR: &str = "vector";

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

/// Paths of the four artifacts inside a generation or staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
    pub fn dir(&self) -> &Path { &self.dir }
    pub fn bm25(&self) -> PathBuf { self.dir.join(BM25_DIR) }
    pub fn docstore(&self) -> PathBuf { self.dir.join(DOCSTORE_FILE) }
    pub fn vector(&self) -> PathBuf { self.dir.join(VECTOR_DIR) }
    pub fn embed_config(&self) -> PathBuf { self.dir.join(EMBED_CONFIG_FILE) }

    /// `CorruptIndex` naming the first artifact that is missing.
    pub fn check_complete(&self) -> Result<()> {
        for (name, path) in [("lexical index", self.bm25()), ("document store", self.docstore()), ("vector index", self.vector()), ("embedding configuration", self.embed_config())] {
            if !path.exists() {
                return Err(Error::CorruptIndex(format!("{} missing at {}", name, path.display())));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub number: u64,
    pub paths: ArtifactPaths,
}

impl Generation {
    pub fn name(&self) -> String { generation_name(self.number) }
}

fn generation_name(number: u64) -> String { format!("{GENERATION_PREFIX}{number:06}") }

fn parse_generation(name: &str) -> Option<u64> { name.strip_prefix(GENERATION_PREFIX)?.parse().ok() }

/// A directory being filled for the next commit. Dropping it without
/// committing deletes everything written so far.
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    pub fn paths(&self) -> ArtifactPaths { ArtifactPaths::new(self.dir.path()) }
}

#[derive(Debug, Clone)]
pub struct PersistLayout {
    root: PathBuf,
}

impl PersistLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    /// The generation `CURRENT` points at, or `None` when nothing was committed.
    pub fn current(&self) -> Result<Option<Generation>> {
        let pointer = self.root.join(CURRENT_FILE);
        let name = match fs::read_to_string(&pointer) {
            Ok(name) => name.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let number = parse_generation(&name)
            .ok_or_else(|| Error::CorruptIndex(format!("{} names an unknown generation `{}`", pointer.display(), name)))?;
        let dir = self.root.join(&name);
        if !dir.is_dir() {
            return Err(Error::CorruptIndex(format!("current generation {} is missing", dir.display())));
        }
        Ok(Some(Generation { number, paths: ArtifactPaths::new(dir) }))
    }

    pub fn has_corpus(&self) -> Result<bool> { Ok(self.current()?.is_some()) }

    pub fn stage(&self) -> Result<Staging> {
        fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(&self.root)?;
        debug!(dir = %dir.path().display(), "staging directory created");
        Ok(Staging { dir })
    }

    /// Move `staging` into the next generation and point `CURRENT` at it.
    pub fn commit(&self, staging: Staging) -> Result<Generation> {
        let previous = self.current()?;
        let number = self.generations()?.into_iter().max().unwrap_or(0) + 1;
        let dir = self.root.join(generation_name(number));
        fs::rename(staging.dir.path(), &dir)?;
        // The staging TempDir now points at nothing; its cleanup is a no-op.
        drop(staging);

        let mut pointer = NamedTempFile::new_in(&self.root)?;
        pointer.write_all(generation_name(number).as_bytes())?;
        pointer.as_file().sync_all()?;
        pointer.persist(self.root.join(CURRENT_FILE)).map_err(|e| Error::Io(e.error))?;
        sync_dir(&self.root);

        let generation = Generation { number, paths: ArtifactPaths::new(dir) };
        info!(generation = %generation.name(), "generation committed");
        let keep: Vec<u64> = previous.iter().map(|g| g.number).chain([number]).collect();
        self.prune(&keep);
        Ok(generation)
    }

    /// Remove abandoned staging directories and every generation not in `keep`.
    /// Failures are logged; a leftover directory is harmless.
    pub fn prune(&self, keep: &[u64]) {
        let Ok(entries) = fs::read_dir(&self.root) else { return };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let stale = name.starts_with(STAGING_PREFIX) || parse_generation(&name).is_some_and(|n| !keep.contains(&n));
            if !stale || !entry.path().is_dir() { continue; }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => debug!(dir = %name, "pruned"),
                Err(e) => warn!(dir = %name, error = %e, "failed to prune"),
            }
        }
    }

    /// Drop everything but the live generation.
    pub fn prune_stale(&self) -> Result<()> {
        let keep: Vec<u64> = self.current()?.map(|g| g.number).into_iter().collect();
        self.prune(&keep);
        Ok(())
    }

    /// Forget the corpus: `CURRENT` goes first so readers stop resolving it.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(self.root.join(CURRENT_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.prune(&[]);
        info!(root = %self.root.display(), "corpus cleared");
        Ok(())
    }

    fn generations(&self) -> Result<Vec<u64>> {
        if !self.root.exists() { return Ok(Vec::new()); }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            if let Some(n) = parse_generation(&entry?.file_name().to_string_lossy()) { out.push(n); }
        }
        Ok(out)
    }
}

fn sync_dir(dir: &Path) {
    if let Ok(d) = fs::File::open(dir) { let _ = d.sync_all(); }
}
