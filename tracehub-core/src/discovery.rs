//! Discovery & watcher (spec §4.1).
//!
//! Enumerates candidate trace files under configured source profiles and
//! watches them for changes, feeding a coalesced dirty-path queue.

use crate::config::SourceProfile;
use crate::error::{Error, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// A file found by discovery, not yet parsed.
#[derive(Debug, Clone)]
pub struct DiscoveredTraceFile {
    pub id: String,
    pub source_profile: String,
    pub path: PathBuf,
    pub agent_hint: Option<String>,
    pub parser_hint: Option<String>,
    pub size_bytes: u64,
    pub mtime_ms: i64,
}

fn expand_home(root: &str) -> PathBuf {
    if let Some(stripped) = root.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            let stripped = stripped.trim_start_matches('/');
            return home.join(stripped);
        }
    }
    PathBuf::from(root)
}

fn depth_from(root: &Path, candidate: &Path) -> usize {
    candidate
        .strip_prefix(root)
        .map(|rel| rel.components().count())
        .unwrap_or(usize::MAX)
}

fn matches_globs(path: &Path, globs: &[glob::Pattern], default_all: bool) -> bool {
    if globs.is_empty() {
        return default_all;
    }
    globs.iter().any(|g| g.matches_path(path))
}

fn compile_globs(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect()
}

/// Enumerate every file under `profile.roots` matching its include/exclude
/// globs and `maxDepth`, for one named source profile.
pub fn discover_profile(name: &str, profile: &SourceProfile) -> Vec<DiscoveredTraceFile> {
    if !profile.enabled {
        return Vec::new();
    }
    let include = compile_globs(&profile.include_globs);
    let exclude = compile_globs(&profile.exclude_globs);
    let mut out = Vec::new();

    for root_str in &profile.roots {
        let root = expand_home(root_str);
        let walk_pattern = root.join("**").join("*");
        let Some(pattern_str) = walk_pattern.to_str() else {
            continue;
        };
        let Ok(paths) = glob::glob(pattern_str) else {
            continue;
        };
        for entry in paths.flatten() {
            if !entry.is_file() {
                continue;
            }
            if let Some(max_depth) = profile.max_depth {
                if depth_from(&root, &entry) as u32 > max_depth {
                    continue;
                }
            }
            if !matches_globs(&entry, &include, include.is_empty()) {
                continue;
            }
            if matches_globs(&entry, &exclude, false) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let mtime_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            let path_str = entry.to_string_lossy().to_string();
            out.push(DiscoveredTraceFile {
                id: crate::types::trace_id(name, &path_str),
                source_profile: name.to_string(),
                path: entry,
                agent_hint: profile.agent_hint.clone(),
                parser_hint: profile.agent_hint.clone(),
                size_bytes: meta.len(),
                mtime_ms,
            });
        }
    }
    out
}

/// Enumerate every enabled source profile.
pub fn discover_all(
    profiles: &std::collections::HashMap<String, SourceProfile>,
) -> Vec<DiscoveredTraceFile> {
    let mut out = Vec::new();
    for (name, profile) in profiles {
        out.extend(discover_profile(name, profile));
    }
    out
}

/// A live filesystem watcher over a set of root directories. Coalesces
/// bursts within the debounce window and forwards unique dirty paths.
pub struct Watcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    pub rx: mpsc::UnboundedReceiver<PathBuf>,
}

impl Watcher {
    /// Start watching `roots` with the given debounce window. Each root
    /// that fails to expand to an existing directory is skipped with a
    /// warning; one bad root does not abort the watch.
    pub fn start(roots: &[String], debounce_ms: u64) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();
        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms.max(1)),
            move |res: DebounceEventResult| {
                let _ = raw_tx.send(res);
            },
        )
        .map_err(Error::Watch)?;

        let mut watched_any = false;
        for root_str in roots {
            let root = expand_home(root_str);
            if !root.exists() {
                tracing::warn!(root = %root.display(), "watch root does not exist, skipping");
                continue;
            }
            match debouncer
                .watcher()
                .watch(&root, RecursiveMode::Recursive)
            {
                Ok(()) => watched_any = true,
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "failed to watch root")
                }
            }
        }
        if !watched_any {
            tracing::warn!("watcher started with no valid roots");
        }

        std::thread::spawn(move || {
            let mut seen: HashSet<PathBuf> = HashSet::new();
            for result in raw_rx {
                seen.clear();
                match result {
                    Ok(events) => {
                        for event in events {
                            if event.kind == DebouncedEventKind::AnyContinuous
                                || event.kind == DebouncedEventKind::Any
                            {
                                if seen.insert(event.path.clone()) && tx.send(event.path).is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                    Err(errors) => {
                        for err in errors {
                            tracing::warn!(error = %err, "watcher event error");
                        }
                    }
                }
            }
        });

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn profile(roots: Vec<&str>, include: Vec<&str>, exclude: Vec<&str>) -> SourceProfile {
        SourceProfile {
            enabled: true,
            roots: roots.into_iter().map(String::from).collect(),
            include_globs: include.into_iter().map(String::from).collect(),
            exclude_globs: exclude.into_iter().map(String::from).collect(),
            max_depth: None,
            agent_hint: Some("claude".to_string()),
        }
    }

    #[test]
    fn discovers_matching_files_and_skips_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("session.jsonl"), "{}").unwrap();
        fs::write(root.join("agent-side.jsonl"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "hi").unwrap();

        let prof = profile(
            vec![root.to_str().unwrap()],
            vec!["**/*.jsonl"],
            vec!["**/agent-*"],
        );
        let found = discover_profile("claude", &prof);
        let names: Vec<String> = found
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"session.jsonl".to_string()));
        assert!(!names.contains(&"agent-side.jsonl".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));
    }

    #[test]
    fn disabled_profile_yields_nothing() {
        let mut prof = profile(vec!["/tmp"], vec!["**/*.jsonl"], vec![]);
        prof.enabled = false;
        assert!(discover_profile("x", &prof).is_empty());
    }
}
