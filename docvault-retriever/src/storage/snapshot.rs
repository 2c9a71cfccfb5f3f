//! Crash-safe snapshots of the whole store.
//!
//! A snapshot is a set of generation-numbered artifacts plus a manifest:
//!
//! ```text
//! data_dir/
//!   index.<gen>.bin        header + row-major f32 vectors
//!   metadata.<gen>.json    chunk records, position-aligned with the index
//!   vectorizer.<gen>.json  fitted TF-IDF state (tfidf backend only)
//!   manifest.json          backend, dimension, count, size and blake3 of each artifact
//! ```
//!
//! Every file is written to a temporary file in `data_dir`, fsynced and
//! atomically renamed into place. The manifest is written last and is the
//! commit point: until it is renamed, the previous generation remains the one
//! that loads. Artifacts of older generations are removed afterwards on a
//! best-effort basis.

use crate::config::Backend;
use crate::error::PersistError;
use crate::retrieval::flat_index::FlatIndex;
use crate::retrieval::tfidf::TfIdfVectorizer;
use crate::storage::MetadataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

const INDEX_MAGIC: &[u8; 8] = b"DVFLAT01";
/// magic + dimension (u32 LE) + count (u64 LE)
const INDEX_HEADER_LEN: usize = 8 + 4 + 8;
const ARTIFACT_PREFIXES: [&str; 3] = ["index.", "metadata.", "vectorizer."];

type PersistResult<T> = std::result::Result<T, PersistError>;

/// Borrowed view of the state to persist.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRef<'a> {
    pub backend: Backend,
    pub index: &'a FlatIndex,
    pub metadata: &'a MetadataStore,
    pub vectorizer: Option<&'a TfIdfVectorizer>,
}

/// State restored from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub index: FlatIndex,
    pub metadata: MetadataStore,
    pub vectorizer: Option<TfIdfVectorizer>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`PersistenceLayer::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(Snapshot),
    /// Nothing usable on disk; start empty
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ArtifactKind {
    Index,
    Metadata,
    Vectorizer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactEntry {
    kind: ArtifactKind,
    file: String,
    bytes: u64,
    blake3: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    generation: u64,
    backend: Backend,
    dimension: usize,
    count: usize,
    created_at: DateTime<Utc>,
    artifacts: Vec<ArtifactEntry>,
}

impl Manifest {
    fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|entry| entry.kind == kind)
    }

    fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|entry| entry.bytes).sum()
    }
}

/// Saves and restores snapshots in one directory.
#[derive(Debug)]
pub struct PersistenceLayer {
    dir: PathBuf,
    generation: u64,
    snapshot_bytes: u64,
}

impl PersistenceLayer {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            generation: 0,
            snapshot_bytes: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generation of the last snapshot saved or loaded (0 if none).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total size of the committed artifacts.
    pub fn snapshot_bytes(&self) -> u64 {
        self.snapshot_bytes
    }

    /// Write a new generation and commit it via the manifest.
    pub fn save(&mut self, snapshot: SnapshotRef<'_>) -> PersistResult<()> {
        self.save_with(snapshot, sync_dir)
    }

    /// `save` with the directory fsync supplied by the caller.
    fn save_with(
        &mut self,
        snapshot: SnapshotRef<'_>,
        sync: impl FnOnce(&Path) -> PersistResult<()>,
    ) -> PersistResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        let generation = self.generation + 1;

        let mut artifacts = vec![
            self.write_artifact(
                ArtifactKind::Index,
                format!("index.{generation}.bin"),
                &encode_index(snapshot.index),
            )?,
            self.write_artifact(
                ArtifactKind::Metadata,
                format!("metadata.{generation}.json"),
                &serde_json::to_vec(snapshot.metadata)?,
            )?,
        ];
        if let Some(vectorizer) = snapshot.vectorizer {
            artifacts.push(self.write_artifact(
                ArtifactKind::Vectorizer,
                format!("vectorizer.{generation}.json"),
                &serde_json::to_vec(vectorizer)?,
            )?);
        }

        let manifest = Manifest {
            version: SNAPSHOT_VERSION,
            generation,
            backend: snapshot.backend,
            dimension: snapshot.index.dimension(),
            count: snapshot.index.len(),
            created_at: Utc::now(),
            artifacts,
        };
        write_atomic(&self.dir, MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;
        // The manifest is committed; later saves must not reuse this generation
        self.generation = generation;
        self.snapshot_bytes = manifest.total_bytes();
        sync(&self.dir)?;

        self.remove_stale(Some(generation));

        tracing::debug!(
            "Saved snapshot generation {} ({} vectors, {} bytes) to {}",
            generation,
            manifest.count,
            self.snapshot_bytes,
            self.dir.display()
        );
        Ok(())
    }

    /// Restore the committed snapshot, if there is a usable one.
    ///
    /// Any inconsistency is logged as `PersistenceCorrupt` and reported as
    /// [`LoadOutcome::NotFound`], as is a snapshot written for a different
    /// backend or dimension.
    pub fn load(&mut self, backend: Backend, dimension: usize) -> LoadOutcome {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            tracing::info!("No snapshot found in {}", self.dir.display());
            return LoadOutcome::NotFound;
        }

        match self.try_load(backend, dimension) {
            Ok((snapshot, manifest)) => {
                self.generation = manifest.generation;
                self.snapshot_bytes = manifest.total_bytes();
                tracing::info!(
                    "Loaded snapshot generation {} with {} chunks from {}",
                    manifest.generation,
                    manifest.count,
                    self.dir.display()
                );
                LoadOutcome::Loaded(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    "PersistenceCorrupt: ignoring snapshot in {}: {}",
                    self.dir.display(),
                    e
                );
                LoadOutcome::NotFound
            }
        }
    }

    /// Delete the manifest and every artifact. Missing files are not an error.
    pub fn clear(&mut self) -> PersistResult<()> {
        remove_if_exists(&self.dir.join(MANIFEST_FILE))?;
        for path in self.artifact_files()? {
            remove_if_exists(&path)?;
        }
        if self.dir.exists() {
            sync_dir(&self.dir)?;
        }
        self.snapshot_bytes = 0;
        Ok(())
    }

    fn try_load(&self, backend: Backend, dimension: usize) -> PersistResult<(Snapshot, Manifest)> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        let manifest_bytes =
            fs::read(&manifest_path).map_err(|e| PersistError::io(&manifest_path, e))?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;

        if manifest.version != SNAPSHOT_VERSION {
            return Err(PersistError::corrupt(format!(
                "unsupported snapshot version {}",
                manifest.version
            )));
        }
        if manifest.backend != backend {
            return Err(PersistError::corrupt(format!(
                "snapshot was written by the {} backend, store uses {}",
                manifest.backend, backend
            )));
        }
        if manifest.dimension != dimension {
            return Err(PersistError::corrupt(format!(
                "snapshot dimension {} differs from configured {}",
                manifest.dimension, dimension
            )));
        }

        let index_bytes = self.read_artifact(&manifest, ArtifactKind::Index)?;
        let index = decode_index(&index_bytes)?;
        let metadata: MetadataStore =
            serde_json::from_slice(&self.read_artifact(&manifest, ArtifactKind::Metadata)?)?;

        let vectorizer = match backend {
            Backend::Tfidf => {
                let bytes = self.read_artifact(&manifest, ArtifactKind::Vectorizer)?;
                let vectorizer: TfIdfVectorizer = serde_json::from_slice(&bytes)?;
                if !vectorizer.is_consistent() || vectorizer.dimension() != dimension {
                    return Err(PersistError::corrupt("fitted vectorizer is inconsistent"));
                }
                Some(vectorizer)
            }
            Backend::Exact => None,
        };

        if index.dimension() != dimension {
            return Err(PersistError::corrupt(format!(
                "index dimension {} differs from manifest {}",
                index.dimension(),
                dimension
            )));
        }
        if index.len() != metadata.count() || index.len() != manifest.count {
            return Err(PersistError::corrupt(format!(
                "index holds {} vectors, metadata {} chunks, manifest {}",
                index.len(),
                metadata.count(),
                manifest.count
            )));
        }

        let snapshot = Snapshot {
            index,
            metadata,
            vectorizer,
            created_at: manifest.created_at,
        };
        Ok((snapshot, manifest))
    }

    fn write_artifact(
        &self,
        kind: ArtifactKind,
        file: String,
        bytes: &[u8],
    ) -> PersistResult<ArtifactEntry> {
        write_atomic(&self.dir, &file, bytes)?;
        Ok(ArtifactEntry {
            kind,
            file,
            bytes: bytes.len() as u64,
            blake3: blake3::hash(bytes).to_hex().to_string(),
        })
    }

    fn read_artifact(&self, manifest: &Manifest, kind: ArtifactKind) -> PersistResult<Vec<u8>> {
        let entry = manifest
            .artifact(kind)
            .ok_or_else(|| PersistError::corrupt(format!("manifest lists no {kind:?} artifact")))?;
        if entry.file.contains(['/', '\\']) {
            return Err(PersistError::corrupt(format!(
                "artifact name {:?} is not a plain file name",
                entry.file
            )));
        }

        let path = self.dir.join(&entry.file);
        let bytes = fs::read(&path).map_err(|e| PersistError::io(&path, e))?;
        if bytes.len() as u64 != entry.bytes {
            return Err(PersistError::corrupt(format!(
                "{} is {} bytes, manifest says {}",
                entry.file,
                bytes.len(),
                entry.bytes
            )));
        }
        let digest = blake3::hash(&bytes);
        if hex::encode(digest.as_bytes()) != entry.blake3 {
            return Err(PersistError::corrupt(format!(
                "{} fails its checksum",
                entry.file
            )));
        }
        Ok(bytes)
    }

    fn artifact_files(&self) -> PersistResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistError::io(&self.dir, e)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistError::io(&self.dir, e))?;
            let name = entry.file_name();
            if artifact_generation(&name.to_string_lossy()).is_some() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Remove artifacts not belonging to `keep`.
    fn remove_stale(&self, keep: Option<u64>) {
        let files = match self.artifact_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!("Skipping cleanup of old snapshots: {}", e);
                return;
            }
        };
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if artifact_generation(&name) != keep {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::debug!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Generation number encoded in an artifact file name, e.g. `index.7.bin` -> 7.
fn artifact_generation(name: &str) -> Option<u64> {
    let rest = ARTIFACT_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))?;
    let (generation, extension) = rest.split_once('.')?;
    if !matches!(extension, "bin" | "json") {
        return None;
    }
    generation.parse().ok()
}

fn encode_index(index: &FlatIndex) -> Vec<u8> {
    let data: &[u8] = bytemuck::cast_slice(index.as_flat());
    let mut bytes = Vec::with_capacity(INDEX_HEADER_LEN + data.len());
    bytes.extend_from_slice(INDEX_MAGIC);
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    // Vector data is stored in native byte order
    bytes.extend_from_slice(data);
    bytes
}

fn decode_index(bytes: &[u8]) -> PersistResult<FlatIndex> {
    if bytes.len() < INDEX_HEADER_LEN || &bytes[..8] != INDEX_MAGIC {
        return Err(PersistError::corrupt("index artifact has no valid header"));
    }
    let mut dimension = [0u8; 4];
    dimension.copy_from_slice(&bytes[8..12]);
    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[12..20]);
    let dimension = u32::from_le_bytes(dimension) as usize;
    let count = u64::from_le_bytes(count) as usize;

    let payload = &bytes[INDEX_HEADER_LEN..];
    let expected = dimension
        .checked_mul(count)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()));
    if expected != Some(payload.len()) {
        return Err(PersistError::corrupt(format!(
            "index payload is {} bytes, header declares {count} x {dimension}",
            payload.len()
        )));
    }

    let data: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
    FlatIndex::from_flat(dimension, data)
        .map_err(|e| PersistError::corrupt(format!("index artifact: {e}")))
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> PersistResult<()> {
    let target = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| PersistError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PersistError::io(tmp.path(), e))?;
    tmp.persist(&target)
        .map_err(|e| PersistError::io(&target, e.error))?;
    Ok(())
}

fn sync_dir(path: &Path) -> PersistResult<()> {
    #[cfg(unix)]
    {
        fs::File::open(path)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| PersistError::io(path, e))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> PersistResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PersistError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Chunk, ChunkExtra};
    use tempfile::tempdir;

    fn sample_state(n: usize) -> (FlatIndex, MetadataStore) {
        let mut index = FlatIndex::new(3);
        let mut metadata = MetadataStore::new();
        for i in 0..n {
            index.add(&[vec![i as f32, 0.5, -1.0]]).unwrap();
            metadata.append(Chunk {
                text: format!("chunk {i}"),
                source_filename: "notes.txt".to_string(),
                chunk_index: i,
                total_chunks: n,
                created_at: Utc::now(),
                extra: ChunkExtra::new(),
            });
        }
        (index, metadata)
    }

    fn exact<'a>(index: &'a FlatIndex, metadata: &'a MetadataStore) -> SnapshotRef<'a> {
        SnapshotRef {
            backend: Backend::Exact,
            index,
            metadata,
            vectorizer: None,
        }
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let dir = tempdir().unwrap();
        let mut layer = PersistenceLayer::new(dir.path().join("absent"));
        assert_eq!(layer.load(Backend::Exact, 3), LoadOutcome::NotFound);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let (index, metadata) = sample_state(4);

        let mut layer = PersistenceLayer::new(dir.path());
        layer.save(exact(&index, &metadata)).unwrap();
        assert_eq!(layer.generation(), 1);
        assert!(layer.snapshot_bytes() > 0);

        let mut fresh = PersistenceLayer::new(dir.path());
        match fresh.load(Backend::Exact, 3) {
            LoadOutcome::Loaded(snapshot) => {
                assert_eq!(snapshot.index, index);
                assert_eq!(snapshot.metadata, metadata);
                assert!(snapshot.vectorizer.is_none());
            }
            LoadOutcome::NotFound => panic!("expected a snapshot"),
        }
        assert_eq!(fresh.generation(), 1);
        assert_eq!(fresh.snapshot_bytes(), layer.snapshot_bytes());
    }

    #[test]
    fn test_old_generations_are_removed() {
        let dir = tempdir().unwrap();
        let mut layer = PersistenceLayer::new(dir.path());
        let (index, metadata) = sample_state(1);
        layer.save(exact(&index, &metadata)).unwrap();
        let (index, metadata) = sample_state(2);
        layer.save(exact(&index, &metadata)).unwrap();

        assert!(!dir.path().join("index.1.bin").exists());
        assert!(dir.path().join("index.2.bin").exists());
        assert!(dir.path().join("metadata.2.json").exists());
    }

    #[test]
    fn test_generation_advances_once_manifest_is_committed() {
        let dir = tempdir().unwrap();
        let mut layer = PersistenceLayer::new(dir.path());
        let (index, metadata) = sample_state(1);

        let err = layer
            .save_with(exact(&index, &metadata), |_| {
                Err(PersistError::corrupt("fsync failed"))
            })
            .unwrap_err();
        assert!(matches!(err, PersistError::Corrupt(_)));
        assert_eq!(layer.generation(), 1);

        // The next save must not overwrite the committed generation's files
        let (index, metadata) = sample_state(2);
        layer.save(exact(&index, &metadata)).unwrap();
        assert_eq!(layer.generation(), 2);
        assert!(dir.path().join("index.2.bin").exists());
        assert!(!dir.path().join("index.1.bin").exists());

        match PersistenceLayer::new(dir.path()).load(Backend::Exact, 3) {
            LoadOutcome::Loaded(snapshot) => assert_eq!(snapshot.metadata.count(), 2),
            LoadOutcome::NotFound => panic!("expected a snapshot"),
        }
    }

    #[test]
    fn test_tampered_artifact_is_not_found() {
        let dir = tempdir().unwrap();
        let (index, metadata) = sample_state(2);
        let mut layer = PersistenceLayer::new(dir.path());
        layer.save(exact(&index, &metadata)).unwrap();

        fs::write(dir.path().join("metadata.1.json"), b"[]").unwrap();
        assert_eq!(
            PersistenceLayer::new(dir.path()).load(Backend::Exact, 3),
            LoadOutcome::NotFound
        );
    }

    #[test]
    fn test_garbage_manifest_is_not_found() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), b"{not json").unwrap();
        assert_eq!(
            PersistenceLayer::new(dir.path()).load(Backend::Exact, 3),
            LoadOutcome::NotFound
        );
    }

    #[test]
    fn test_backend_and_dimension_must_match() {
        let dir = tempdir().unwrap();
        let (index, metadata) = sample_state(2);
        let mut layer = PersistenceLayer::new(dir.path());
        layer.save(exact(&index, &metadata)).unwrap();

        assert_eq!(layer.load(Backend::Tfidf, 3), LoadOutcome::NotFound);
        assert_eq!(layer.load(Backend::Exact, 4), LoadOutcome::NotFound);
        assert!(matches!(layer.load(Backend::Exact, 3), LoadOutcome::Loaded(_)));
    }

    #[test]
    fn test_tfidf_snapshot_requires_vectorizer() {
        let dir = tempdir().unwrap();
        let (index, metadata) = sample_state(1);
        let vectorizer = TfIdfVectorizer::fit(["chunk zero"], 3);
        let mut layer = PersistenceLayer::new(dir.path());
        layer
            .save(SnapshotRef {
                backend: Backend::Tfidf,
                index: &index,
                metadata: &metadata,
                vectorizer: Some(&vectorizer),
            })
            .unwrap();
        assert!(dir.path().join("vectorizer.1.json").exists());

        match PersistenceLayer::new(dir.path()).load(Backend::Tfidf, 3) {
            LoadOutcome::Loaded(snapshot) => assert_eq!(snapshot.vectorizer, Some(vectorizer)),
            LoadOutcome::NotFound => panic!("expected a snapshot"),
        }

        fs::remove_file(dir.path().join("vectorizer.1.json")).unwrap();
        assert_eq!(
            PersistenceLayer::new(dir.path()).load(Backend::Tfidf, 3),
            LoadOutcome::NotFound
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let (index, metadata) = sample_state(2);
        let mut layer = PersistenceLayer::new(dir.path());
        layer.save(exact(&index, &metadata)).unwrap();

        layer.clear().unwrap();
        layer.clear().unwrap();
        assert_eq!(layer.snapshot_bytes(), 0);
        assert!(!dir.path().join(MANIFEST_FILE).exists());
        assert!(!dir.path().join("index.1.bin").exists());
        assert_eq!(layer.load(Backend::Exact, 3), LoadOutcome::NotFound);

        PersistenceLayer::new(dir.path().join("never-created"))
            .clear()
            .unwrap();
    }

    #[test]
    fn test_index_codec_rejects_truncation() {
        let (index, _) = sample_state(3);
        let bytes = encode_index(&index);
        assert_eq!(decode_index(&bytes).unwrap(), index);
        assert!(decode_index(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_index(b"short").is_err());
    }

    #[test]
    fn test_artifact_generation_parsing() {
        assert_eq!(artifact_generation("index.12.bin"), Some(12));
        assert_eq!(artifact_generation("metadata.3.json"), Some(3));
        assert_eq!(artifact_generation("vectorizer.1.json"), Some(1));
        assert_eq!(artifact_generation("manifest.json"), None);
        assert_eq!(artifact_generation("index.x.bin"), None);
        assert_eq!(artifact_generation("notes.txt"), None);
    }
}
