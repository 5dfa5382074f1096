use crate::api::drive::DriveApi;
use crate::error::FolderResolutionError;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// 上传目标：显式 ID 直接使用，名称需要查找或创建。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderTarget {
    Id(String),
    Name(String),
}

/// 文件夹名称到 ID 的解析器，带一次运行内有效的读穿缓存。
///
/// 查找与创建之间没有原子性：同名新文件夹被并发解析时可能重复创建，
/// 因此应在 worker 启动前串行调用。同名文件夹有多个时取远端列表的第一项，
/// 该顺序没有保证。
#[derive(Default)]
pub struct FolderResolver {
    cache: Mutex<HashMap<String, String>>,
}

impl FolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<A: DriveApi + ?Sized>(
        &self,
        api: &mut A,
        target: &FolderTarget,
    ) -> Result<String, FolderResolutionError> {
        match target {
            FolderTarget::Id(id) => Ok(id.clone()),
            FolderTarget::Name(name) => self.resolve_name(api, name),
        }
    }

    pub fn resolve_name<A: DriveApi + ?Sized>(
        &self,
        api: &mut A,
        name: &str,
    ) -> Result<String, FolderResolutionError> {
        if let Some(id) = self.cached(name) {
            return Ok(id);
        }

        let wrap = |source| FolderResolutionError {
            name: name.to_string(),
            source,
        };
        let matches = api.list_folders(name).map_err(wrap)?;
        let id = match matches.first() {
            Some(existing) => {
                if matches.len() > 1 {
                    warn!(
                        folder = name,
                        count = matches.len(),
                        "multiple folders share this name; using the first listed"
                    );
                }
                info!(folder = name, id = %existing.id, "using existing folder");
                existing.id.clone()
            }
            None => {
                let id = api.create_folder(name).map_err(wrap)?;
                info!(folder = name, id = %id, "created folder");
                id
            }
        };

        super::core::recover_lock(&self.cache).insert(name.to_string(), id.clone());
        Ok(id)
    }

    fn cached(&self, name: &str) -> Option<String> {
        super::core::recover_lock(&self.cache).get(name).cloned()
    }
}
