//! 临时目录与空输出目录清理。

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

/// 章节临时目录的后缀，见 `Chapter::folder_name`。
pub const TEMP_SUFFIX: &str = "_tmp";

pub fn is_empty_dir(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    let mut entries = fs::read_dir(path)?;
    Ok(entries.next().is_none())
}

/// 删除输出目录下所有未完成的 `*_tmp` 章节目录，返回删除数量。
pub fn cleanup_unfinished_temp_folders(output_dir: &Path) -> usize {
    let Ok(rd) = fs::read_dir(output_dir) else {
        return 0;
    };
    let mut removed = 0usize;
    for entry in rd.filter_map(|e| e.ok()) {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        if !is_dir || !name.to_string_lossy().ends_with(TEMP_SUFFIX) {
            continue;
        }
        let full = entry.path();
        match fs::remove_dir_all(&full) {
            Ok(()) => {
                info!(target: "cleanup", "已删除临时目录 {}", full.display());
                removed += 1;
            }
            Err(err) => warn!(target: "cleanup", "删除 {} 失败: {}", full.display(), err),
        }
    }
    removed
}

/// 输出目录为空时删除它。
pub fn remove_if_empty(dir: &Path) -> bool {
    if is_empty_dir(dir).unwrap_or(false) && fs::remove_dir(dir).is_ok() {
        info!(target: "cleanup", "已删除空输出目录 {}", dir.display());
        return true;
    }
    false
}

pub fn cleanup_folder(folder: &Path) {
    let _ = fs::remove_dir_all(folder);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_only_temp_folders() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("1_intro_tmp")).unwrap();
        fs::write(dir.path().join("1_intro_tmp").join("page_001.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();
        fs::write(dir.path().join("2.cbz"), b"zip").unwrap();

        assert_eq!(cleanup_unfinished_temp_folders(dir.path()), 1);
        assert!(!dir.path().join("1_intro_tmp").exists());
        assert!(dir.path().join("keep").exists());
        assert!(dir.path().join("2.cbz").exists());
    }

    #[test]
    fn empty_output_folder_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        assert!(remove_if_empty(&out));
        assert!(!out.exists());

        fs::create_dir(&out).unwrap();
        fs::write(out.join("a.cbz"), b"x").unwrap();
        assert!(!remove_if_empty(&out));
    }
}
