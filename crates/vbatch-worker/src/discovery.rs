//! Input discovery.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, info, warn};
use vbatch_models::InputItem;

use crate::error::{WorkerError, WorkerResult};

/// Find every file under `input_dir` matching one of `patterns`.
///
/// Matches are deduplicated and sorted. A missing directory, an invalid
/// pattern or zero matches is an error. Files with an unsupported
/// extension are skipped. A file whose stem repeats an earlier item id gets
/// the id `{stem}_{ext}` instead (with a numeric suffix if that is taken
/// too), so every discovered file becomes an item.
pub fn discover_inputs(input_dir: &Path, patterns: &[String]) -> WorkerResult<Vec<InputItem>> {
    if !input_dir.is_dir() {
        return Err(WorkerError::discovery_failed(format!(
            "input directory does not exist or is not a directory: {}",
            input_dir.display()
        )));
    }

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let root = Pattern::escape(&input_dir.to_string_lossy());

    let mut paths = BTreeSet::<PathBuf>::new();
    for pattern in patterns {
        let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
        let matches = glob::glob_with(&full, options)
            .map_err(|e| WorkerError::discovery_failed(format!("invalid pattern {:?}: {}", pattern, e)))?;

        for entry in matches {
            match entry {
                Ok(path) if path.is_file() => {
                    paths.insert(path);
                }
                Ok(_) => {}
                Err(e) => warn!("Unreadable path during discovery: {}", e),
            }
        }
    }

    let mut seen_ids = HashSet::new();
    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let item = match InputItem::from_path(&path) {
            Ok(item) => item,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if seen_ids.insert(item.id().to_string()) {
            items.push(item);
            continue;
        }

        let id = unique_id(&item, &seen_ids);
        warn!(
            item_id = %item.id(),
            renamed = %id,
            "Item id already taken, using a qualified id for {}",
            path.display()
        );
        seen_ids.insert(id.clone());
        items.push(item.with_id(id));
    }

    if items.is_empty() {
        return Err(WorkerError::discovery_failed(format!(
            "no files matching {} in {}",
            patterns.join(","),
            input_dir.display()
        )));
    }

    info!(count = items.len(), "Discovered inputs in {}", input_dir.display());
    Ok(items)
}

fn unique_id(item: &InputItem, taken: &HashSet<String>) -> String {
    let base = item.qualified_id();
    if !taken.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}
