use crate::api::auth::CredentialSnapshot;
use crate::api::drive::{DriveApi, DriveEndpoints, DriveSession};
use crate::error::ApiError;
use std::time::Duration;
use tracing::debug;

/// 为某个 worker 构造一个独占的 API 会话。
pub trait SessionFactory: Send + Sync {
    type Session: DriveApi;

    fn connect(&self, worker_id: usize, credentials: CredentialSnapshot) -> Result<Self::Session, ApiError>;
}

/// 生产环境的工厂：每个会话都有自己的 HTTP 连接池。
#[derive(Clone, Debug)]
pub struct HttpSessionFactory {
    endpoints: DriveEndpoints,
    timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(endpoints: DriveEndpoints, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = DriveSession;

    fn connect(&self, _worker_id: usize, credentials: CredentialSnapshot) -> Result<DriveSession, ApiError> {
        DriveSession::connect(credentials, self.endpoints.clone(), self.timeout)
    }
}

/// 持有只读凭据，并按 worker 懒加载会话。
pub struct SessionProvider<F> {
    factory: F,
    credentials: CredentialSnapshot,
}

impl<F: SessionFactory> SessionProvider<F> {
    pub fn new(factory: F, credentials: CredentialSnapshot) -> Self {
        Self {
            factory,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialSnapshot {
        &self.credentials
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// 返回某个 worker 的会话槽位；槽位由调用线程独占，会话在第一次使用时才建立。
    pub fn for_worker(&self, worker_id: usize) -> WorkerSession<'_, F> {
        WorkerSession {
            worker_id,
            provider: self,
            session: None,
        }
    }
}

pub struct WorkerSession<'a, F: SessionFactory> {
    worker_id: usize,
    provider: &'a SessionProvider<F>,
    session: Option<F::Session>,
}

impl<'a, F: SessionFactory> WorkerSession<'a, F> {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// 首次调用时用凭据副本建立会话，之后一直复用同一个实例。
    pub fn get(&mut self) -> Result<&mut F::Session, ApiError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                debug!(worker = self.worker_id, "creating drive session");
                self.provider
                    .factory
                    .connect(self.worker_id, self.provider.credentials.clone())?
            }
        };
        Ok(self.session.insert(session))
    }

    /// 丢弃当前会话（例如任务中途崩溃后），下次使用时重新建立。
    pub fn reset(&mut self) {
        self.session = None;
    }
}
