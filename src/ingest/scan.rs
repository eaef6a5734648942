use crate::model::FileKind;
use anyhow::Result;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub size: i64,
    pub kind: FileKind,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

pub fn scan_root(root: &Path, options: ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, "walk error");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let Some(kind) = detect_file_kind(path) else {
            continue;
        };
        let rel_path = crate::util::normalize_rel_path(root, path)?;
        // A file deleted or locked mid-walk costs only itself, not the pass.
        let metadata = match fs::metadata(path) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "stat failed, skipping");
                continue;
            }
        };
        let size = metadata.len() as i64;
        let data = match fs::read(path) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "read failed, skipping");
                continue;
            }
        };
        // Mapping files share the .xml extension with config files; only
        // statement-bearing documents count.
        let kind = match kind {
            FileKind::MappingFile if !looks_like_mapping(&data) => continue,
            other => other,
        };
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash: crate::util::hash_bytes(&data),
            size,
            kind,
        });
    }
    // Mapping files first, then class sources, then page templates: symbolic
    // cross-file references only resolve against already-committed facts.
    files.sort_by(|a, b| {
        kind_rank(&a.kind)
            .cmp(&kind_rank(&b.kind))
            .then_with(|| a.rel_path.cmp(&b.rel_path))
    });
    Ok(files)
}

fn kind_rank(kind: &FileKind) -> u8 {
    match kind {
        FileKind::MappingFile => 0,
        FileKind::ClassSource => 1,
        FileKind::PageTemplate => 2,
        FileKind::Other(_) => 3,
    }
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    match entry.file_name() {
        name if name == OsStr::new(".tiergraph") => true,
        name if name == OsStr::new(".git") => true,
        name if name == OsStr::new("target") => true,
        _ => false,
    }
}

fn detect_file_kind(path: &Path) -> Option<FileKind> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    match ext.to_ascii_lowercase().as_str() {
        "jsp" | "html" | "htm" | "vm" => Some(FileKind::PageTemplate),
        "java" => Some(FileKind::ClassSource),
        "xml" => Some(FileKind::MappingFile),
        _ => None,
    }
}

fn looks_like_mapping(data: &[u8]) -> bool {
    let text = String::from_utf8_lossy(data);
    text.contains("<mapper") || text.contains("<sqlMap")
}
