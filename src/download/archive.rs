//! 章节打包：已下载图片按文件名排序写入 CBZ（zip）。

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use zip::CompressionMethod;
use zip::write::FileOptions;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("打包 {path} 时 IO 错误: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("没有可打包的文件")]
    Empty,
}

pub trait ChapterArchiver: Send + Sync {
    fn build(&self, files: &[PathBuf], output: &Path) -> Result<(), ArchiveError>;
}

pub struct CbzArchiver;

impl ChapterArchiver for CbzArchiver {
    fn build(&self, files: &[PathBuf], output: &Path) -> Result<(), ArchiveError> {
        if files.is_empty() {
            return Err(ArchiveError::Empty);
        }
        let res = write_cbz(files, output);
        if res.is_err() {
            let _ = fs::remove_file(output);
        }
        res
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_cbz(files: &[PathBuf], output: &Path) -> Result<(), ArchiveError> {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let file = File::create(output).map_err(io_err(output))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in sorted {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(name, options)?;
        let mut src = File::open(path).map_err(io_err(path))?;
        io::copy(&mut src, &mut zip).map_err(io_err(path))?;
    }
    zip.finish()?;
    debug!(target: "archive", "已写入 {} ({} 个文件)", output.display(), files.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn entries_are_sorted_base_names() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("1_tmp");
        fs::create_dir_all(&folder).unwrap();
        let mut files = Vec::new();
        for (name, body) in [("page_002.png", "two"), ("page_001.jpg", "one"), ("page_010.jpg", "ten")] {
            let p = folder.join(name);
            fs::write(&p, body).unwrap();
            files.push(p);
        }
        let out = dir.path().join("1.cbz");
        CbzArchiver.build(&files, &out).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["page_001.jpg", "page_002.png", "page_010.jpg"]);

        let mut body = String::new();
        zip.by_name("page_002.png")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "two");
    }

    #[test]
    fn empty_input_is_rejected_and_missing_file_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.cbz");
        assert!(matches!(CbzArchiver.build(&[], &out), Err(ArchiveError::Empty)));

        let missing = vec![dir.path().join("nope.jpg")];
        assert!(matches!(
            CbzArchiver.build(&missing, &out),
            Err(ArchiveError::Io { .. })
        ));
        assert!(!out.exists());
    }
}
