//! Size-based rotation of a log file and its numbered backups.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Decides when the active file rolls over and shifts the backup chain.
///
/// The policy never holds a file handle; callers close their writer before
/// calling [`RotationPolicy::rotate`] and reopen the base path afterwards.
#[derive(Clone, Debug)]
pub(crate) struct RotationPolicy {
    path: PathBuf,
    max_size: u64,
    rotation_limit: usize,
}

impl RotationPolicy {
    pub(crate) fn new(path: PathBuf, max_size: u64, rotation_limit: usize) -> Self {
        Self {
            path,
            max_size,
            rotation_limit,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Whether appending `incoming` bytes to a file of `current` bytes must
    /// rotate first. An empty file never rotates, so a record larger than
    /// `max_size` still lands in a fresh file.
    pub(crate) fn should_rotate(&self, current: u64, incoming: u64) -> bool {
        current > 0 && current.saturating_add(incoming) > self.max_size
    }

    /// Roll the base file over.
    ///
    /// With a limit of zero the base file is deleted. Otherwise backups shift
    /// up by one, the oldest falls off the end and the base file becomes
    /// `path.1`. Missing files are skipped.
    pub(crate) fn rotate(&self) -> io::Result<()> {
        if self.rotation_limit == 0 {
            return remove_file_if_exists(&self.path);
        }
        self.remove_excess_backups()?;
        remove_file_if_exists(&self.backup_path(self.rotation_limit))?;
        self.cascade_backups()?;
        rename_file_if_exists(&self.path, &self.backup_path(1))
    }

    /// Delete stale backups left above the limit by an earlier configuration.
    fn remove_excess_backups(&self) -> io::Result<()> {
        let mut extra = self.rotation_limit + 1;
        loop {
            match fs::remove_file(self.backup_path(extra)) {
                Ok(()) => extra += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn cascade_backups(&self) -> io::Result<()> {
        for idx in (1..self.rotation_limit).rev() {
            rename_file_if_exists(&self.backup_path(idx), &self.backup_path(idx + 1))?;
        }
        Ok(())
    }

    pub(crate) fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|file_name| file_name.to_os_string())
            .unwrap_or_else(|| self.path.as_os_str().to_os_string());
        name.push(format!(".{index}"));
        self.path.with_file_name(name)
    }
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn rename_file_if_exists(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    #[case(0, 500, false)]
    #[case(60, 30, false)]
    #[case(70, 30, false)]
    #[case(71, 30, true)]
    #[case(1, 200, true)]
    fn rotation_trigger(#[case] current: u64, #[case] incoming: u64, #[case] expected: bool) {
        let policy = RotationPolicy::new(PathBuf::from("app.log"), 100, 1);
        assert_eq!(policy.should_rotate(current, incoming), expected);
    }

    #[test]
    fn shifts_backups_and_drops_the_oldest() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new(path.clone(), 10, 2);
        fs::write(&path, "current")?;
        fs::write(policy.backup_path(1), "older")?;
        fs::write(policy.backup_path(2), "oldest")?;

        policy.rotate()?;

        assert!(!path.exists());
        assert_eq!(fs::read_to_string(policy.backup_path(1))?, "current");
        assert_eq!(fs::read_to_string(policy.backup_path(2))?, "older");
        assert!(!policy.backup_path(3).exists());
        Ok(())
    }

    #[test]
    fn zero_limit_deletes_the_file() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("app.log");
        fs::write(&path, "data")?;
        let policy = RotationPolicy::new(path.clone(), 10, 0);

        policy.rotate()?;

        assert!(!path.exists());
        assert!(!policy.backup_path(1).exists());
        Ok(())
    }

    #[test]
    fn stale_backups_above_the_limit_are_removed() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new(path.clone(), 10, 1);
        fs::write(&path, "now")?;
        fs::write(policy.backup_path(2), "stale")?;
        fs::write(policy.backup_path(3), "staler")?;

        policy.rotate()?;

        assert_eq!(fs::read_to_string(policy.backup_path(1))?, "now");
        assert!(!policy.backup_path(2).exists());
        assert!(!policy.backup_path(3).exists());
        Ok(())
    }

    #[test]
    fn missing_files_are_skipped() -> io::Result<()> {
        let dir = tempdir()?;
        let policy = RotationPolicy::new(dir.path().join("absent.log"), 10, 3);
        policy.rotate()
    }

    #[test]
    fn backup_names_append_the_index() {
        let policy = RotationPolicy::new(PathBuf::from("/var/log/app.log"), 1, 1);
        assert_eq!(policy.backup_path(2), PathBuf::from("/var/log/app.log.2"));
    }
}
