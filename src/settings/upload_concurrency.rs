use crate::db::Storage;

const CONCURRENCY_KEY: &str = "upload_max_concurrency";
pub const MIN_UPLOAD_CONCURRENCY: usize = 1;
pub const MAX_UPLOAD_CONCURRENCY: usize = 16;
const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// 从设置表读取并行上传数；缺失时返回默认值，错误时透传。
pub fn get_upload_concurrency(storage: &Storage) -> Result<usize, String> {
    if let Some(value) = storage.get_setting(CONCURRENCY_KEY)? {
        return parse_and_clamp(&value);
    }
    Ok(DEFAULT_UPLOAD_CONCURRENCY)
}

/// 写入并校验并行上传数，限定在 [MIN, MAX] 区间。
pub fn set_upload_concurrency(storage: &Storage, value: usize) -> Result<usize, String> {
    if !(MIN_UPLOAD_CONCURRENCY..=MAX_UPLOAD_CONCURRENCY).contains(&value) {
        return Err(format!(
            "upload concurrency must be between {} and {}",
            MIN_UPLOAD_CONCURRENCY, MAX_UPLOAD_CONCURRENCY
        ));
    }
    storage.set_setting(CONCURRENCY_KEY, &value.to_string())?;
    Ok(value)
}

pub fn default_upload_concurrency() -> usize {
    DEFAULT_UPLOAD_CONCURRENCY
}

fn parse_and_clamp(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|e| format!("invalid upload concurrency value: {e}"))?;
    Ok(parsed.clamp(MIN_UPLOAD_CONCURRENCY, MAX_UPLOAD_CONCURRENCY))
}
