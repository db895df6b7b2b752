//! Small filesystem utilities.

use globset::{Glob, GlobSet, GlobSetBuilder};

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{RehearseError, RehearseResult};

/// Expands scenario arguments: literal paths pass through, anything else is
/// treated as a glob rooted at the cwd.
pub fn expand_scenario_args(args: &[String]) -> RehearseResult<Vec<PathBuf>> {
    let mut literal = Vec::new();
    let mut patterns = Vec::new();
    for a in args {
        let p = Path::new(a);
        if p.exists() {
            literal.push(p.to_path_buf());
        } else {
            patterns.push(a.clone());
        }
    }
    if !patterns.is_empty() {
        literal.extend(find_matching_files(&patterns)?);
    }
    literal.sort();
    literal.dedup();
    Ok(literal)
}

pub fn find_matching_files(patterns: &[String]) -> RehearseResult<Vec<PathBuf>> {
    let set = compile_globset(patterns)?;
    let mut out = Vec::new();
    for entry in WalkDir::new(".").follow_links(false) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            RehearseError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(msg)),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.path();
        let rel = p.strip_prefix(".").unwrap_or(p);
        if set.is_match(rel) {
            out.push(rel.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

fn compile_globset(patterns: &[String]) -> RehearseResult<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        let g = Glob::new(p)
            .map_err(|e| RehearseError::InvalidArgument(format!("invalid glob {p:?}: {e}")))?;
        b.add(g);
    }
    b.build()
        .map_err(|e| RehearseError::InvalidArgument(format!("invalid globset: {e}")))
}
