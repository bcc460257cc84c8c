//! SQLite persistence for index snapshots.
//!
//! A save writes a fresh database next to the live one and renames it into
//! place, so a crash or failure mid-save leaves the previous file untouched.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use super::{ChunkRef, FlatIndex, IndexError, IndexManifest, IndexSnapshot, IndexedFile, VectorIndex};
use crate::ingest::chunker::ChunkId;
use crate::ingest::loader::DocumentId;

/// Directory created inside the indexed folder.
pub const INDEX_DIR_NAME: &str = ".augustus";
pub const INDEX_FILE_NAME: &str = "index.db";

const FORMAT_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    format_version INTEGER NOT NULL,
    root TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL,
    built_at DATETIME NOT NULL
);

CREATE TABLE files (
    relative_path TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    chunks INTEGER NOT NULL
);

CREATE TABLE chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    start_char INTEGER NOT NULL,
    end_char INTEGER NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL
);

CREATE INDEX idx_chunks_source ON chunks(source_path);
"#;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store kept in `<root>/.augustus/`.
    pub fn for_root(root: &Path) -> Self {
        Self::new(root.join(INDEX_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Persist `snapshot`, replacing any previous index in one rename.
    pub fn save(&self, snapshot: &IndexSnapshot) -> Result<(), IndexError> {
        fs::create_dir_all(&self.dir)?;

        let target = self.path();
        let temp = self.dir.join(format!(
            "{INDEX_FILE_NAME}.tmp-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_database(&temp, snapshot) {
            if let Err(cleanup) = fs::remove_file(&temp) {
                debug!("could not remove {}: {}", temp.display(), cleanup);
            }
            return Err(e);
        }

        fs::rename(&temp, &target)?;
        info!(
            "Saved index to {} ({} files, {} chunks)",
            target.display(),
            snapshot.manifest.files.len(),
            snapshot.index.len()
        );
        Ok(())
    }

    /// Load the persisted snapshot, or `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<IndexSnapshot>, IndexError> {
        let Some(conn) = self.open_read_only()? else {
            return Ok(None);
        };

        let manifest = read_manifest(&conn)?;
        let mut index = FlatIndex::new(manifest.dimensions)?;

        let mut stmt = conn.prepare(
            "SELECT document_id, source_path, chunk_index, start_char, end_char, content, embedding
             FROM chunks ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Vec<u8>>(6)?,
            ))
        })?;

        for row in rows {
            let (document_id, source_path, chunk_index, start_char, end_char, text, blob) = row?;
            let document_id = DocumentId::from_hex(&document_id)
                .ok_or_else(|| IndexError::Corrupt(format!("bad document id for {source_path}")))?;
            let embedding = deserialize_vector(&blob)
                .filter(|v| v.len() == manifest.dimensions)
                .ok_or_else(|| {
                    IndexError::Corrupt(format!(
                        "embedding for {source_path}#{chunk_index} is {} bytes, expected {}",
                        blob.len(),
                        manifest.dimensions * 4
                    ))
                })?;

            let chunk = ChunkRef {
                chunk_id: ChunkId {
                    document_id,
                    index: chunk_index as usize,
                },
                source_path,
                chunk_index: chunk_index as usize,
                text,
                start_char: start_char as usize,
                end_char: end_char as usize,
            };
            index.insert(chunk, embedding)?;
        }

        debug!("Loaded {} chunks from {}", index.len(), self.path().display());
        Ok(Some(IndexSnapshot { index, manifest }))
    }

    /// Read only the manifest, skipping the embeddings.
    pub fn load_manifest(&self) -> Result<Option<IndexManifest>, IndexError> {
        match self.open_read_only()? {
            Some(conn) => read_manifest(&conn).map(Some),
            None => Ok(None),
        }
    }

    fn open_read_only(&self) -> Result<Option<Connection>, IndexError> {
        let path = self.path();
        if !path.is_file() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Some(conn))
    }
}

fn write_database(path: &Path, snapshot: &IndexSnapshot) -> Result<(), IndexError> {
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA_SQL)?;

    let manifest = &snapshot.manifest;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO meta (id, format_version, root, dimensions, model, built_at)
         VALUES (1, ?, ?, ?, ?, ?)",
        params![
            FORMAT_VERSION,
            manifest.root,
            manifest.dimensions as i64,
            manifest.model,
            manifest.built_at
        ],
    )?;

    for file in &manifest.files {
        tx.execute(
            "INSERT INTO files (relative_path, document_id, size_bytes, chunks) VALUES (?, ?, ?, ?)",
            params![
                file.relative_path,
                file.document_id,
                file.size_bytes as i64,
                file.chunks as i64
            ],
        )?;
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO chunks (document_id, source_path, chunk_index, start_char, end_char, content, embedding)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        for entry in snapshot.index.entries() {
            let chunk = &entry.chunk;
            stmt.execute(params![
                chunk.chunk_id.document_id.as_str(),
                chunk.source_path,
                chunk.chunk_index as i64,
                chunk.start_char as i64,
                chunk.end_char as i64,
                chunk.text,
                serialize_vector(entry.embedding())
            ])?;
        }
    }

    tx.commit()?;
    conn.close().map_err(|(_, e)| IndexError::Database(e))?;
    Ok(())
}

fn read_manifest(conn: &Connection) -> Result<IndexManifest, IndexError> {
    let meta = conn
        .query_row(
            "SELECT format_version, root, dimensions, model, built_at FROM meta WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, DateTime<Utc>>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((version, root, dimensions, model, built_at)) = meta else {
        return Err(IndexError::Corrupt("missing meta row".to_string()));
    };
    if version != FORMAT_VERSION {
        warn!("index format {} is not supported", version);
        return Err(IndexError::Corrupt(format!(
            "unsupported format version {version}"
        )));
    }
    if dimensions <= 0 {
        return Err(IndexError::Corrupt(format!("invalid dimensions {dimensions}")));
    }

    let mut stmt = conn.prepare(
        "SELECT relative_path, document_id, size_bytes, chunks FROM files ORDER BY relative_path",
    )?;
    let files = stmt
        .query_map([], |row| {
            Ok(IndexedFile {
                relative_path: row.get(0)?,
                document_id: row.get(1)?,
                size_bytes: row.get::<_, i64>(2)? as u64,
                chunks: row.get::<_, i64>(3)? as usize,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IndexManifest {
        root,
        dimensions: dimensions as usize,
        model,
        built_at,
        files,
    })
}

/// Little-endian `f32` bytes.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Inverse of [`serialize_vector`]; `None` when the length is not a multiple of 4.
pub fn deserialize_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
