use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 候选文件过滤规则。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileFilter {
    AllFiles,
    /// 不区分大小写，不带点，如 `mp4`。
    Extensions(Vec<String>),
}

impl FileFilter {
    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FileFilter::Extensions(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        )
    }

    fn matches(&self, path: &Path) -> bool {
        match self {
            FileFilter::AllFiles => true,
            FileFilter::Extensions(allowed) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    pub recursive: bool,
    pub filter: FileFilter,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            filter: FileFilter::extensions(["mp4"]),
        }
    }
}

/// 枚举待上传的普通文件，按路径字典序返回，保证重复运行时提交顺序一致。
/// 根目录不可读时返回错误；子目录读取失败只记录日志并跳过。符号链接目录不跟随。
pub fn collect_files(root: &Path, options: &ScanOptions) -> io::Result<Vec<PathBuf>> {
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(path = %path, "skipping unreadable entry: {err}");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        // 指向普通文件的符号链接仍然上传
        let path = entry.into_path();
        if path.is_file() && options.filter.matches(&path) {
            files.push(path);
        }
    }

    files.sort();
    debug!(root = %root.display(), count = files.len(), "collected candidate files");
    Ok(files)
}
