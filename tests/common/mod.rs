#![allow(dead_code)]

use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Narrowed permissions on a file or directory, restored on drop so the
/// temporary tree can still be removed.
pub struct Restricted {
    path: PathBuf,
    original: Permissions,
}

impl Restricted {
    /// Applies `mode` to `path`.
    ///
    /// Returns `None` (with permissions already restored) when the change is
    /// not enforced, which is the case when the tests run as root.
    pub fn apply(path: &Path, mode: u32) -> Option<Self> {
        let original = fs::metadata(path).unwrap().permissions();
        let is_dir = path.is_dir();
        fs::set_permissions(path, Permissions::from_mode(mode)).unwrap();
        let guard = Restricted {
            path: path.to_path_buf(),
            original,
        };

        let denied = if is_dir {
            fs::read_dir(path).is_err()
        } else {
            File::open(path).is_err()
        };
        if !denied {
            eprintln!("permissions are not enforced here, skipping");
            return None;
        }
        Some(guard)
    }
}

impl Drop for Restricted {
    fn drop(&mut self) {
        let _ = fs::set_permissions(&self.path, self.original.clone());
    }
}
