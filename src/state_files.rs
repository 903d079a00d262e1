//! Atomic scalar state-file read/write.
//!
//! Grounded in `examples/original_source/src/lib/state_files.c`
//! (`state_file_write`'s `mkstemp` + `rename` pattern, `state_file_rw_string`'s
//! read-or-default behavior). Shared by the per-partition state directory
//! and the last-played log.
use std::io::Write;
use std::path::{Path, PathBuf};

fn file_path(workdir: &Path, dir: &str, name: &str) -> PathBuf {
    workdir.join(dir).join(name)
}

/// Reads `workdir/dir/name`; if absent, writes `default` there and returns
/// it. A value file present but unreadable/blank also falls back to
/// `default` without touching disk.
pub fn read_or_default(workdir: &Path, dir: &str, name: &str, default: &str) -> String {
    let path = file_path(workdir, dir, name);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let line = content.lines().next().unwrap_or("").trim();
            if line.is_empty() {
                default.to_owned()
            } else {
                line.to_owned()
            }
        }
        Err(_) => {
            write_atomic(workdir, dir, name, default).ok();
            default.to_owned()
        }
    }
}

pub fn read_bool(workdir: &Path, dir: &str, name: &str, default: bool) -> bool {
    let s = read_or_default(workdir, dir, name, if default { "true" } else { "false" });
    s == "true"
}

/// Writes `value` to `workdir/dir/name` via a temp file in the same
/// directory, then renames over the target. A reader opening the target
/// path at any point sees either the old full content or the new full
/// content, never a partial write.
pub fn write_atomic(workdir: &Path, dir: &str, name: &str, value: &str) -> std::io::Result<()> {
    let target_dir = workdir.join(dir);
    std::fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(name);
    let mut tmp = tempfile::NamedTempFile::new_in(&target_dir)?;
    tmp.write_all(value.as_bytes())?;
    tmp.flush()?;
    tmp.persist(&target)
        .map_err(|e| e.error)?;
    Ok(())
}

/// Appends `line` to `workdir/dir/name`, creating it if absent. Used by
/// the last-played log, which is append-only.
pub fn append_line(workdir: &Path, dir: &str, name: &str, line: &str) -> std::io::Result<()> {
    let target_dir = workdir.join(dir);
    std::fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(name);
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(target)?;
    writeln!(f, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_created_with_default() {
        let dir = tempdir().unwrap();
        let v = read_or_default(dir.path(), "state/default", "jukebox_mode", "off");
        assert_eq!(v, "off");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("state/default/jukebox_mode")).unwrap(),
            "off"
        );
    }

    #[test]
    fn existing_value_is_read_back() {
        let dir = tempdir().unwrap();
        write_atomic(dir.path(), "state/default", "volume", "80").unwrap();
        assert_eq!(read_or_default(dir.path(), "state/default", "volume", "50"), "80");
    }

    #[test]
    fn write_atomic_never_leaves_truncated_file() {
        let dir = tempdir().unwrap();
        write_atomic(dir.path(), "state/default", "x", "first").unwrap();
        write_atomic(dir.path(), "state/default", "x", "second-longer-value").unwrap();
        let content = std::fs::read_to_string(dir.path().join("state/default/x")).unwrap();
        assert!(content == "first" || content == "second-longer-value");
    }

    #[test]
    fn append_line_creates_and_grows_file() {
        let dir = tempdir().unwrap();
        append_line(dir.path(), "state", "last_played", "100::foo.mp3").unwrap();
        append_line(dir.path(), "state", "last_played", "200::bar.mp3").unwrap();
        let content = std::fs::read_to_string(dir.path().join("state/last_played")).unwrap();
        assert_eq!(content, "100::foo.mp3\n200::bar.mp3\n");
    }
}
