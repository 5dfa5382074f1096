use super::types::UploadResult;
use crate::error::ErrorKind;
use tracing::{info, warn};

/// 一次批处理的汇总结果，条目按完成顺序排列，与提交顺序无关。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    results: Vec<UploadResult>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个结果，并立即输出对应的结果行。
    pub fn record(&mut self, result: UploadResult) {
        if result.is_success() {
            info!("{}", result.outcome_line());
        } else {
            warn!("{}", result.outcome_line());
        }
        self.results.push(result);
    }

    pub fn results(&self) -> &[UploadResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<UploadResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &UploadResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// 空批次也算成功。
    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// 有任一文件失败时，整个批次归为部分失败。
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        (!self.is_success()).then_some(ErrorKind::PartialBatchFailure)
    }

    pub fn outcome_lines(&self) -> Vec<String> {
        self.results.iter().map(UploadResult::outcome_line).collect()
    }

    pub fn summary_line(&self) -> String {
        let total = self.len();
        let failed = self.failure_count();
        match self.failure_kind() {
            None => format!("All {total} file(s) uploaded."),
            Some(kind) => format!("{kind}: {failed} of {total} file(s) failed."),
        }
    }
}

impl FromIterator<UploadResult> for BatchReport {
    fn from_iter<I: IntoIterator<Item = UploadResult>>(iter: I) -> Self {
        let mut report = BatchReport::new();
        for result in iter {
            report.record(result);
        }
        report
    }
}
