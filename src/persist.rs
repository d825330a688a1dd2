//! Periodic best-effort snapshots: one JSON artifact per group under
//! `{data_dir}/{course}/{group}.json`, written on a timer and read back at
//! boot. A crash between saves loses whatever happened since the last one.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::matcher::{Group, Matcher};
use crate::AppState;

/// Rebuilds the engine from the snapshot tree. A missing directory is an
/// empty store; an unreadable group file is logged and skipped rather than
/// taking the whole boot down.
pub fn load(data_dir: &Path) -> anyhow::Result<Matcher> {
    let mut matcher = Matcher::new();
    if !data_dir.exists() {
        info!(path = %data_dir.display(), "no snapshot directory, starting empty");
        return Ok(matcher);
    }

    for course in fs::read_dir(data_dir)? {
        let course = course?;
        if !course.file_type()?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(course.path())? {
            let path = entry?.path();
            match load_group(&path) {
                Ok(group) => {
                    debug!(course = %group.course, group = %group.group, "loaded group snapshot");
                    matcher.restore_group(group);
                }
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable group snapshot"),
            }
        }
    }
    Ok(matcher)
}

fn load_group(path: &Path) -> anyhow::Result<Group> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Writes every group out. Directories are created as needed; existing
/// artifacts are overwritten wholesale.
pub fn save(matcher: &Matcher, data_dir: &Path) -> anyhow::Result<()> {
    for group in matcher.groups() {
        let course_dir = data_dir.join(&group.course);
        fs::create_dir_all(&course_dir)?;
        fs::write(course_dir.join(format!("{}.json", group.group)), serde_json::to_string(group)?)?;
        debug!(course = %group.course, group = %group.group, "saved group snapshot");
    }
    Ok(())
}

/// Spawns the save cycle. Runs until the process exits; individual failures
/// are logged and the next tick tries again.
pub fn start_save_cycle(state: AppState, data_dir: PathBuf, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; nothing to save yet.
        interval.tick().await;
        loop {
            interval.tick().await;
            debug!("saving");
            let matcher = state.matcher.lock().await;
            if let Err(err) = save(&matcher, &data_dir) {
                warn!(%err, "snapshot cycle failed");
            }
        }
    });
}
