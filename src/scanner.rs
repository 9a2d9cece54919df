//! @ai:module:intent Discover and read the source files of a run
//! @ai:module:layer infrastructure
//! @ai:module:public_api Scanner, FileFilter
//! @ai:module:depends_on config, language, collector, error
//! @ai:module:stateless true

use crate::collector::SourceFile;
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::language::DialectRegistry;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// @ai:intent Include/exclude glob filter over root-relative paths
#[derive(Debug, Clone)]
pub struct FileFilter {
    /// If empty, all files are included.
    inclusions: Option<GlobSet>,
    exclusions: GlobSet,
}

impl FileFilter {
    /// @ai:intent Compile include and exclude globs
    /// @ai:post Err on an invalid glob
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let inclusions = if include.is_empty() {
            None
        } else {
            Some(build_glob_set(include)?)
        };

        Ok(Self {
            inclusions,
            exclusions: build_glob_set(exclude)?,
        })
    }

    /// @ai:intent Check a root-relative path against the filter
    /// @ai:effects pure
    pub fn matches(&self, path: &Path) -> bool {
        if self.exclusions.is_match(path) {
            return false;
        }

        match &self.inclusions {
            Some(inclusions) => inclusions.is_match(path),
            None => true,
        }
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// @ai:intent Walks a directory and turns matching files into SourceFiles
#[derive(Debug, Clone)]
pub struct Scanner {
    filter: FileFilter,
    dialects: DialectRegistry,
    skip_unknown_files: bool,
}

impl Scanner {
    pub fn new(config: &ScanConfig, dialects: DialectRegistry) -> Result<Self> {
        Ok(Self {
            filter: FileFilter::new(&config.include, &config.exclude)?,
            dialects,
            skip_unknown_files: config.skip_unknown_files,
        })
    }

    /// @ai:intent Collect every handled file below root, sorted by relative path
    /// @ai:pre root exists
    /// @ai:post file ids are relative to root; a file root keeps its given path
    /// @ai:effects fs:read
    pub fn scan(&self, root: &Path) -> Result<Vec<SourceFile>> {
        if root.is_file() {
            return Ok(self.load(root, root)?.into_iter().collect());
        }

        if !root.is_dir() {
            return Err(Error::InvalidPath {
                path: root.display().to_string(),
                reason: "no such file or directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };

            if !self.filter.matches(relative) {
                continue;
            }

            if let Some(file) = self.load(path, relative)? {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %root.display(), files = files.len(), "scan finished");
        Ok(files)
    }

    /// @ai:intent Read one file if a dialect handles it
    /// @ai:post Ok(None) for skipped unknown or unreadable files
    fn load(&self, path: &Path, id: &Path) -> Result<Option<SourceFile>> {
        let Some(dialect) = self.dialects.detect(path) else {
            if self.skip_unknown_files {
                debug!(file = %id.display(), "skipping file without dialect");
                return Ok(None);
            }
            return Err(Error::UnsupportedFileType(id.display().to_string()));
        };

        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(SourceFile {
                path: id.to_path_buf(),
                text,
                dialect,
            })),
            Err(e) => {
                warn!(file = %id.display(), error = %e, "skipping unreadable file");
                Ok(None)
            }
        }
    }
}
