//! 고정 크기 워커 풀
//!
//! - 슬롯 수는 프로세스 수명 동안 고정 (`tokio::sync::Semaphore`)
//! - FIFO 입장: 단일 디스패처가 슬롯을 먼저 확보한 뒤에만 큐에서 꺼냄
//! - 포화 시 거부하지 않고 큐에 쌓음 (backpressure)
//! - [`WorkerPool::drain`]: 입장 중단, 대기 작업 거부, 실행 중 작업은 유예 시간까지 대기
//!
//! ```text
//! submit ──> VecDeque ──> dispatcher ──(permit)──> tokio::spawn(job.run())
//!                            ▲                             │
//!                            └────── permit 반환 ──────────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::gauge;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ironvuln_core::metrics as m;

/// `Send` 박스 퓨처
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 유예 시간 경과 후 취소 신호를 받은 작업이 스스로 끝나기를 기다리는 시간
const ABORT_SETTLE: Duration = Duration::from_millis(100);

/// 풀에서 실행되는 작업
pub trait PoolJob: Send + 'static {
    /// 로그와 드레인 보고서에 쓰이는 이름
    fn label(&self) -> String;

    /// 슬롯을 확보한 뒤 실행할 퓨처를 만듭니다.
    fn run(self: Box<Self>) -> BoxFuture<'static, ()>;

    /// 실행되지 못하고 거부될 때 호출됩니다 (드레인, 닫힌 풀).
    fn reject(self: Box<Self>);
}

/// 드레인 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 슬롯을 얻지 못해 거부된 작업
    pub rejected: Vec<String>,
    /// 유예 시간 안에 끝나지 않아 취소된 작업
    pub abandoned: Vec<String>,
}

impl DrainReport {
    /// 거부/포기된 작업이 없는지 여부
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.abandoned.is_empty()
    }

    /// 다른 보고서를 합칩니다.
    pub fn merge(&mut self, other: DrainReport) {
        self.rejected.extend(other.rejected);
        self.abandoned.extend(other.abandoned);
    }
}

struct LiveJob {
    label: String,
    abort: Option<AbortHandle>,
}

struct PoolInner {
    size: usize,
    slots: Arc<Semaphore>,
    queue: Mutex<VecDeque<Box<dyn PoolJob>>>,
    notify: Notify,
    closed: CancellationToken,
    live: Mutex<HashMap<u64, LiveJob>>,
    live_count: watch::Sender<usize>,
    next_id: AtomicU64,
    peak_active: AtomicUsize,
}

/// 고정 크기 워커 풀
///
/// 생성 시 디스패처 태스크를 스폰하므로 tokio 런타임 안에서 만들어야 합니다.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// `size`개의 슬롯을 가진 풀을 만듭니다 (최소 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (live_count, _) = watch::channel(0);
        let inner = Arc::new(PoolInner {
            size,
            slots: Arc::new(Semaphore::new(size)),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: CancellationToken::new(),
            live: Mutex::new(HashMap::new()),
            live_count,
            next_id: AtomicU64::new(0),
            peak_active: AtomicUsize::new(0),
        });
        tokio::spawn(dispatch(Arc::clone(&inner)));
        debug!(size, "worker pool started");
        Self { inner }
    }

    /// 작업을 큐에 넣습니다. 풀이 닫혔으면 즉시 `reject`하고 `false`를 반환합니다.
    pub fn submit(&self, job: Box<dyn PoolJob>) -> bool {
        let mut queue = lock(&self.inner.queue);
        if self.inner.closed.is_cancelled() {
            drop(queue);
            debug!(job = %job.label(), "worker pool closed, rejecting job");
            job.reject();
            return false;
        }
        queue.push_back(job);
        let depth = queue.len();
        drop(queue);

        gauge!(m::POOL_QUEUED_JOBS).set(depth as f64);
        self.inner.notify.notify_one();
        true
    }

    /// 입장을 중단하고 대기 중인 작업을 모두 거부합니다.
    ///
    /// 여러 번 호출해도 안전하며, 거부된 작업 이름을 반환합니다.
    pub fn close(&self) -> Vec<String> {
        let pending: Vec<Box<dyn PoolJob>> = {
            let mut queue = lock(&self.inner.queue);
            self.inner.closed.cancel();
            queue.drain(..).collect()
        };
        gauge!(m::POOL_QUEUED_JOBS).set(0.0);

        let mut rejected = Vec::with_capacity(pending.len());
        for job in pending {
            rejected.push(job.label());
            job.reject();
        }
        rejected
    }

    /// 실행 중인 작업이 모두 끝날 때까지 최대 `timeout` 동안 기다립니다.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.live_count.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        )
    }

    /// 실행 중인 모든 작업을 중단시킵니다. 중단 요청한 수를 반환합니다.
    pub fn abort_all(&self) -> usize {
        let live = lock(&self.inner.live);
        let mut aborted = 0;
        for job in live.values() {
            if let Some(handle) = &job.abort {
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }

    /// 풀을 드레인합니다.
    ///
    /// 1. 입장 중단, 대기 작업 거부
    /// 2. 실행 중 작업을 `grace`까지 대기
    /// 3. 남은 작업이 있으면 `on_deadline` 호출 후 잠시 기다렸다가 중단
    pub async fn drain<F>(&self, grace: Duration, on_deadline: F) -> DrainReport
    where
        F: FnOnce(),
    {
        let rejected = self.close();
        if !rejected.is_empty() {
            info!(count = rejected.len(), "rejected queued jobs on drain");
        }

        if self.wait_idle(grace).await {
            return DrainReport {
                rejected,
                abandoned: Vec::new(),
            };
        }

        let abandoned: Vec<String> = lock(&self.inner.live)
            .values()
            .map(|job| job.label.clone())
            .collect();
        warn!(
            count = abandoned.len(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "grace period elapsed with jobs still running"
        );

        on_deadline();
        if !self.wait_idle(ABORT_SETTLE).await {
            let aborted = self.abort_all();
            warn!(count = aborted, "aborted unfinished jobs");
        }

        DrainReport {
            rejected,
            abandoned,
        }
    }

    /// 슬롯 수
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// 현재 실행 중인 작업 수
    pub fn active(&self) -> usize {
        *self.inner.live_count.borrow()
    }

    /// 슬롯을 기다리는 작업 수
    pub fn queued(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// 지금까지 동시에 실행된 최대 작업 수
    pub fn peak_active(&self) -> usize {
        self.inner.peak_active.load(Ordering::Relaxed)
    }

    /// 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // 디스패처 종료
        self.inner.closed.cancel();
    }
}

impl PoolInner {
    fn pop_front(&self) -> Option<Box<dyn PoolJob>> {
        let mut queue = lock(&self.queue);
        if self.closed.is_cancelled() {
            return None;
        }
        let job = queue.pop_front();
        gauge!(m::POOL_QUEUED_JOBS).set(queue.len() as f64);
        job
    }

    fn launch(self: &Arc<Self>, job: Box<dyn PoolJob>, permit: OwnedSemaphorePermit) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = job.label();
        debug!(job = %label, id, "launching job");

        // 태스크가 먼저 끝나도 가드가 항목을 지울 수 있도록 스폰 전에 등록
        let active = {
            let mut live = lock(&self.live);
            live.insert(id, LiveJob { label, abort: None });
            live.len()
        };
        self.live_count.send_replace(active);
        self.peak_active.fetch_max(active, Ordering::Relaxed);
        gauge!(m::POOL_ACTIVE_WORKERS).set(active as f64);

        let future = job.run();
        let guard = LiveGuard {
            pool: Arc::clone(self),
            id,
        };
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            future.await;
        });

        if let Some(entry) = lock(&self.live).get_mut(&id) {
            entry.abort = Some(handle.abort_handle());
        }
    }
}

/// 작업 종료(정상, 패닉, 중단) 시 live 테이블에서 제거
struct LiveGuard {
    pool: Arc<PoolInner>,
    id: u64,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let active = {
            let mut live = lock(&self.pool.live);
            live.remove(&self.id);
            live.len()
        };
        self.pool.live_count.send_replace(active);
        gauge!(m::POOL_ACTIVE_WORKERS).set(active as f64);
    }
}

async fn dispatch(inner: Arc<PoolInner>) {
    'outer: loop {
        let permit = tokio::select! {
            biased;
            _ = inner.closed.cancelled() => break,
            permit = Arc::clone(&inner.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let job = loop {
            if let Some(job) = inner.pop_front() {
                break job;
            }
            tokio::select! {
                biased;
                _ = inner.closed.cancelled() => break 'outer,
                _ = inner.notify.notified() => {}
            }
        };

        inner.launch(job, permit);
    }
    debug!("worker pool dispatcher stopped");
}

/// 독이 든(poisoned) 락도 계속 사용합니다. 보호 대상은 항상 일관된 상태로 갱신됩니다.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
