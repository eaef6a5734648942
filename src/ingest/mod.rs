use crate::config::Config;
use crate::model::{AnalyzeStats, FileKind, FileOutcome, FileStatus};
use crate::store::Store;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

pub mod class;
pub mod extract;
pub mod mapping;
pub mod page;
pub mod scan;

use extract::Extractor;

/// Drives per-file (re-)analysis: scan, extract, commit. Each file is one
/// all-or-nothing unit; a failing extractor flags the file and the run moves
/// on to the next one.
pub struct Ingestor {
    root: PathBuf,
    store: Store,
    project_id: i64,
    scan_options: scan::ScanOptions,
    force: bool,
}

impl Ingestor {
    pub fn new(
        store: Store,
        project_name: &str,
        root: PathBuf,
        scan_options: scan::ScanOptions,
        force: bool,
    ) -> Result<Self> {
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let project_id = store.upsert_project(project_name, &root.to_string_lossy())?;
        Ok(Self {
            root,
            store,
            project_id,
            scan_options,
            force,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn analyze(&mut self) -> Result<(AnalyzeStats, Vec<FileOutcome>)> {
        let started = Instant::now();
        let scanned = scan::scan_root(&self.root, self.scan_options)?;

        let mut existing: HashMap<String, (i64, String)> = HashMap::new();
        for record in self.store.live_files(self.project_id)? {
            existing.insert(record.file_path, (record.file_id, record.content_hash));
        }

        let mut stats = AnalyzeStats {
            scanned: scanned.len(),
            ..Default::default()
        };
        let mut outcomes = Vec::with_capacity(scanned.len());
        let max_bytes = Config::get().max_file_mb * 1024 * 1024;

        for file in &scanned {
            let unchanged = existing
                .remove(&file.rel_path)
                .map(|(_, hash)| hash == file.hash)
                .unwrap_or(false);
            if unchanged && !self.force {
                stats.skipped += 1;
                outcomes.push(FileOutcome {
                    path: file.rel_path.clone(),
                    status: FileStatus::Skipped,
                    components: 0,
                    relationships: 0,
                    error: None,
                });
                continue;
            }

            let outcome = match self.ingest_file(file, max_bytes) {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Failure is isolated to the file, never global.
                    warn!(path = %file.rel_path, %err, "extraction failed");
                    self.record_file_error(file)?;
                    FileOutcome {
                        path: file.rel_path.clone(),
                        status: FileStatus::Error,
                        components: 0,
                        relationships: 0,
                        error: Some(err.to_string()),
                    }
                }
            };
            match outcome.status {
                FileStatus::Analyzed => {
                    stats.analyzed += 1;
                    stats.components += outcome.components;
                    stats.relationships += outcome.relationships;
                }
                FileStatus::Error => stats.errors += 1,
                _ => {}
            }
            outcomes.push(outcome);
        }

        // Whatever is left in the map vanished from the source root.
        for (path, (file_id, _)) in existing {
            self.store.soft_delete_file_facts(file_id)?;
            stats.removed += 1;
            outcomes.push(FileOutcome {
                path,
                status: FileStatus::Removed,
                components: 0,
                relationships: 0,
                error: None,
            });
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            analyzed = stats.analyzed,
            skipped = stats.skipped,
            errors = stats.errors,
            removed = stats.removed,
            "ingestion pass complete"
        );
        Ok((stats, outcomes))
    }

    fn ingest_file(&mut self, file: &scan::ScannedFile, max_bytes: u64) -> Result<FileOutcome> {
        if file.size as u64 > max_bytes {
            // Bound the blast radius of a stuck parser; the next run retries.
            anyhow::bail!("file exceeds size bound ({} bytes)", file.size);
        }
        let source = crate::util::read_to_string(&file.abs_path)?;
        let extractor = extractor_for(&file.kind);
        let facts = extractor.extract(&file.rel_path, &source)?;

        let file_id = self.store.upsert_file(
            self.project_id,
            &file.rel_path,
            file.kind.as_str(),
            &file.hash,
        )?;
        let (components, relationships) = self.store.commit_file_facts(file_id, &facts)?;
        Ok(FileOutcome {
            path: file.rel_path.clone(),
            status: FileStatus::Analyzed,
            components,
            relationships,
            error: None,
        })
    }

    /// Extraction failed: the file still gets a row so the error is visible,
    /// and its class generation carries `has_error`. The content hash is left
    /// empty so the next full run re-analyzes the file instead of skipping it
    /// as unchanged.
    fn record_file_error(&mut self, file: &scan::ScannedFile) -> Result<()> {
        let file_id =
            self.store
                .upsert_file(self.project_id, &file.rel_path, file.kind.as_str(), "")?;
        if file.kind == FileKind::ClassSource {
            let stem = crate::util::file_name(&file.rel_path);
            let stem = stem.strip_suffix(".java").unwrap_or(&stem);
            let class_id = self.store.upsert_class(file_id, stem)?;
            self.store.set_class_error(class_id, true)?;
        }
        self.store.mark_file_error(file_id)?;
        Ok(())
    }
}

fn extractor_for(kind: &FileKind) -> Box<dyn Extractor> {
    match kind {
        FileKind::MappingFile => Box::new(mapping::MappingExtractor::new()),
        FileKind::ClassSource => Box::new(class::ClassExtractor::new()),
        FileKind::PageTemplate | FileKind::Other(_) => Box::new(page::PageExtractor::new()),
    }
}
