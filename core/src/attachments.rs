use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use walkdir::WalkDir;

use crate::db::{placeholders, Attachment};
use crate::error::{NotesError, NotesResult};
use crate::thumbnail::Thumbnailer;

// ---------------------------------------------------------------------------
// Classification and naming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Audio,
    Video,
    Document,
}

impl FileKind {
    /// Classify by file extension, case-insensitively. Anything unrecognised
    /// is a document.
    pub fn classify(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => FileKind::Image,
            "mp3" | "wav" | "ogg" | "m4a" | "aac" => FileKind::Audio,
            "mp4" | "mov" => FileKind::Video,
            _ => FileKind::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Document => "document",
        }
    }

    /// Inverse of [`FileKind::as_str`]; unknown stored values read as documents.
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => FileKind::Image,
            "audio" => FileKind::Audio,
            "video" => FileKind::Video,
            _ => FileKind::Document,
        }
    }
}

pub fn stored_file_name(note_id: i64, original: &str) -> String {
    format!("{note_id}_{original}")
}

pub fn thumbnail_file_name(stored: &str) -> String {
    format!("thumb_{stored}")
}

/// `cat.png` with `n = 2` becomes `cat_2.png`; names without an extension
/// just get the suffix.
pub fn numbered_file_name(original: &str, n: u32) -> String {
    let path = Path::new(original);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{stem}_{n}.{ext}"),
        _ => format!("{original}_{n}"),
    }
}

// ---------------------------------------------------------------------------
// Upload payloads and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied name. Only the final path component is kept.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file as an upload, named after its final path component.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }

    fn base_name(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of an add-path run. Failed files never abort the transaction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttachmentReport {
    pub saved: Vec<Attachment>,
    pub failed: Vec<FailedUpload>,
}

// ---------------------------------------------------------------------------
// AttachmentStore
// ---------------------------------------------------------------------------

/// Files younger than this are never swept, whether or not a row refers to
/// them yet.
pub const DEFAULT_SWEEP_GRACE: Duration = Duration::from_secs(600);

/// Keeps attachment rows and the files under the storage root in step.
///
/// All methods take the connection of the caller's transaction. File writes
/// and deletes are not transactional; they happen before the row changes.
#[derive(Clone)]
pub struct AttachmentStore {
    root: PathBuf,
    thumbnailer: Arc<dyn Thumbnailer>,
    sweep_grace: Duration,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        Self {
            root: root.into(),
            thumbnailer,
            sweep_grace: DEFAULT_SWEEP_GRACE,
        }
    }

    /// Minimum age of a file before the orphan sweep may remove it.
    pub fn with_sweep_grace(mut self, grace: Duration) -> Self {
        self.sweep_grace = grace;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Save each upload, derive a thumbnail for images, and insert one row per
    /// saved file. Save and thumbnail failures are logged and reported.
    pub fn add_attachments(
        &self,
        conn: &Connection,
        note_id: i64,
        files: &[UploadedFile],
    ) -> NotesResult<AttachmentReport> {
        let mut report = AttachmentReport::default();
        if files.is_empty() {
            return Ok(report);
        }
        if let Err(e) = fs::create_dir_all(&self.root) {
            tracing::warn!(root = %self.root.display(), error = %e, "failed to create storage root");
        }

        let mut insert = conn.prepare_cached(
            "INSERT INTO attachments (note_id, file_path, thumbnail_path, file_type)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for file in files {
            let Some(base) = file.base_name() else {
                tracing::warn!(note_id, file = %file.file_name, "upload has no usable file name");
                report.failed.push(FailedUpload {
                    file_name: file.file_name.clone(),
                    reason: "empty file name".to_string(),
                });
                continue;
            };

            let stored = self.unused_stored_name(conn, note_id, base)?;
            let full_path = self.path_for(&stored);
            if let Err(e) = fs::write(&full_path, &file.bytes) {
                tracing::warn!(note_id, file = %stored, error = %e, "attachment save failed");
                report.failed.push(FailedUpload {
                    file_name: file.file_name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }

            let kind = FileKind::classify(&stored);
            let thumbnail = if kind == FileKind::Image {
                self.make_thumbnail(&stored, &full_path)
            } else {
                String::new()
            };

            insert.execute(params![note_id, stored, thumbnail, kind.as_str()])?;
            report.saved.push(Attachment {
                id: conn.last_insert_rowid(),
                file_path: stored,
                thumbnail_path: thumbnail,
                file_type: kind,
            });
        }

        tracing::debug!(
            note_id,
            saved = report.saved.len(),
            failed = report.failed.len(),
            "attachments added"
        );
        Ok(report)
    }

    /// First stored name for `base` that neither a row nor a file on disk
    /// already uses. A repeated upload name gets a numeric suffix.
    fn unused_stored_name(
        &self,
        conn: &Connection,
        note_id: i64,
        base: &str,
    ) -> NotesResult<String> {
        let mut taken =
            conn.prepare_cached("SELECT 1 FROM attachments WHERE file_path = ?1 LIMIT 1")?;
        let mut candidate = stored_file_name(note_id, base);
        let mut n = 1;
        while taken.exists(params![candidate])? || self.path_for(&candidate).exists() {
            n += 1;
            candidate = stored_file_name(note_id, &numbered_file_name(base, n));
        }
        if n > 1 {
            tracing::debug!(note_id, file = %candidate, "renamed colliding upload");
        }
        Ok(candidate)
    }

    /// Returns the thumbnail name, or an empty string if none was produced.
    fn make_thumbnail(&self, stored: &str, source: &Path) -> String {
        let thumb = thumbnail_file_name(stored);
        let dest = self.path_for(&thumb);
        match self.thumbnailer.make_thumbnail(source, &dest) {
            Ok(()) => thumb,
            Err(e) => {
                tracing::warn!(file = %stored, error = %e, "thumbnail generation failed");
                // Drop any partial output so it does not linger unreferenced.
                let _ = fs::remove_file(&dest);
                String::new()
            }
        }
    }

    /// Delete the given attachments of `note_id`, files first, then rows.
    ///
    /// Every id is checked for ownership before anything is touched; an id
    /// that is unknown or belongs to another note rejects the whole call.
    pub fn remove_attachments(
        &self,
        conn: &Connection,
        note_id: i64,
        attachment_ids: &[i64],
    ) -> NotesResult<usize> {
        let mut lookup = conn.prepare_cached(
            "SELECT file_path, thumbnail_path FROM attachments WHERE id = ?1 AND note_id = ?2",
        )?;
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for &id in attachment_ids {
            if !seen.insert(id) {
                continue;
            }
            let files: Option<(String, String)> = lookup
                .query_row(params![id, note_id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            match files {
                Some(files) => targets.push((id, files)),
                None => {
                    return Err(NotesError::validation(
                        "delete_attachments",
                        format!("attachment {id} does not belong to note {note_id}"),
                    ))
                }
            }
        }

        let mut delete = conn.prepare_cached("DELETE FROM attachments WHERE id = ?1")?;
        for (id, (file_path, thumbnail_path)) in &targets {
            self.delete_physical_file(file_path);
            if !thumbnail_path.is_empty() {
                self.delete_physical_file(thumbnail_path);
            }
            delete.execute(params![id])?;
        }
        Ok(targets.len())
    }

    /// Physically delete every file attached to the given notes. Rows are left
    /// for the cascading note delete. Returns the number of attachments seen.
    pub fn purge_files_for_notes(&self, conn: &Connection, note_ids: &[i64]) -> NotesResult<usize> {
        if note_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT file_path, thumbnail_path FROM attachments WHERE note_id IN ({})",
            placeholders(note_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(note_ids), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let files = rows.collect::<Result<Vec<_>, _>>()?;
        for (file_path, thumbnail_path) in &files {
            self.delete_physical_file(file_path);
            if !thumbnail_path.is_empty() {
                self.delete_physical_file(thumbnail_path);
            }
        }
        Ok(files.len())
    }

    /// Remove files under the storage root that no attachment row refers to.
    /// These are left behind when a process dies between writing a file and
    /// committing its row.
    ///
    /// Call inside an IMMEDIATE transaction so no upload can commit between
    /// reading the row set and deleting. Files younger than the sweep grace
    /// are kept regardless, since their row may still be uncommitted.
    pub fn sweep_orphan_files(&self, conn: &Connection) -> NotesResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut referenced = HashSet::new();
        {
            let mut stmt = conn.prepare("SELECT file_path, thumbnail_path FROM attachments")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for r in rows {
                let (file_path, thumbnail_path) = r?;
                referenced.insert(file_path);
                if !thumbnail_path.is_empty() {
                    referenced.insert(thumbnail_path);
                }
            }
        }

        let mut removed = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "storage walk error");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if referenced.contains(&name) {
                continue;
            }
            if self.is_recent(entry.path()) {
                tracing::debug!(file = %name, "unreferenced file inside sweep grace, kept");
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed.push(name),
                Err(e) => tracing::warn!(file = %name, error = %e, "failed to remove orphan file"),
            }
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "swept orphan attachment files");
        }
        Ok(removed)
    }

    /// Unreadable or future modification times count as recent.
    fn is_recent(&self, path: &Path) -> bool {
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified
                .elapsed()
                .map(|age| age < self.sweep_grace)
                .unwrap_or(true),
            Err(_) => true,
        }
    }

    /// Best-effort removal; a missing file is only logged.
    fn delete_physical_file(&self, file_name: &str) {
        let full = self.path_for(file_name);
        match fs::remove_file(&full) {
            Ok(()) => tracing::debug!(path = %full.display(), "file deleted"),
            Err(e) => tracing::warn!(path = %full.display(), error = %e, "could not delete file"),
        }
    }
}
