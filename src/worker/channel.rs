//! # 后台任务通道
//!
//! ## 设计思路
//!
//! 调用方与后台线程之间的双向消息通道，状态机：
//!
//! ```text
//! Uninitialized → Initializing → Ready → (Faulted)
//! ```
//!
//! - 每个在途任务在 `pending` 表中恰好有一项，由 `oneshot` 保证只结算一次。
//! - 传输层故障会拒绝所有等待中的任务并进入 `Faulted`，通道不会自动重启。
//! - 超时只清理调用侧记录，不会打断后台正在进行的分片处理。
//!
//! ## 实现思路
//!
//! 1. `open` 启动名为 `base64-worker` 的专用线程，在 `init_timeout` 内等待 `ready` 握手。
//! 2. 握手成功后在 tokio 运行时上启动分发任务，按任务 ID 把事件路由到 `pending` 表。
//! 3. 进度回调在锁外调用；同一任务的进度按到达顺序派发且不回退。
//! 4. 后台线程在未销毁的情况下消失视为传输层故障。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::backend::{BackendFactory, WorkerPort, run_request};
use super::protocol::{
    Action, ConversionResult, RequestData, TaskId, WorkerEvent, WorkerMessage, WorkerRequest,
    generate_task_id,
};
use crate::config::ConverterConfig;
use crate::error::ConvertError;

const WORKER_THREAD_NAME: &str = "base64-worker";

/// 进度回调：`(百分比 0..=100, 阶段描述)`，可能在分发任务所在线程上调用。
pub type ProgressCallback = Arc<dyn Fn(u8, &str) + Send + Sync>;

type Settlement = Result<ConversionResult, ConvertError>;

/// 通道状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Initializing,
    Ready,
    Faulted,
}

struct PendingTask {
    action: Action,
    on_progress: Option<ProgressCallback>,
    last_progress: u8,
    settle: oneshot::Sender<Settlement>,
}

struct Shared {
    pending: Mutex<HashMap<TaskId, PendingTask>>,
    state: Mutex<(ChannelState, Option<String>)>,
    terminated: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("⚠️ 通道锁已中毒，继续使用内部数据");
        poisoned.into_inner()
    })
}

impl Shared {
    fn route(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Ready => log::debug!("🔁 忽略重复的 ready 信号"),
            WorkerMessage::Progress {
                id,
                progress,
                message,
            } => {
                let progress = progress.min(100);
                let callback = {
                    let mut pending = lock(&self.pending);
                    let Some(task) = pending.get_mut(&id) else {
                        log::debug!("🕳️ 丢弃未知或已结束任务 {} 的进度消息", id);
                        return;
                    };
                    if progress < task.last_progress {
                        log::debug!(
                            "↩️ 任务 {} 进度回退（{} < {}），已忽略",
                            id,
                            progress,
                            task.last_progress
                        );
                        return;
                    }
                    task.last_progress = progress;
                    task.on_progress.clone()
                };

                if let Some(callback) = callback {
                    callback(progress, &message);
                }
            }
            WorkerMessage::Result { id, result } => self.settle(&id, Ok(result)),
            WorkerMessage::Error { id, error } => self.settle(&id, Err(ConvertError::Task(error))),
        }
    }

    fn settle(&self, id: &str, outcome: Settlement) {
        let Some(task) = lock(&self.pending).remove(id) else {
            log::debug!("🕳️ 丢弃未知或已结束任务 {} 的终结消息", id);
            return;
        };

        log::debug!(
            "📬 任务 {}（{}）已结算：{}",
            id,
            task.action,
            if outcome.is_ok() { "result" } else { "error" }
        );
        if task.settle.send(outcome).is_err() {
            log::debug!("任务 {} 的调用方已不再等待", id);
        }
    }

    fn forget(&self, id: &str) {
        lock(&self.pending).remove(id);
    }

    fn fault(&self, reason: String) {
        log::error!("❌ 后台通道故障：{}", reason);
        *lock(&self.state) = (ChannelState::Faulted, Some(reason.clone()));

        let rejected: Vec<(TaskId, PendingTask)> = lock(&self.pending).drain().collect();
        if !rejected.is_empty() {
            log::warn!("⚠️ 拒绝 {} 个等待中的任务", rejected.len());
        }
        for (_, task) in rejected {
            let _ = task.settle.send(Err(ConvertError::Channel(reason.clone())));
        }
    }
}

/// 后台任务通道：一条后台线程 + 一个分发任务 + 在途任务表。
pub struct TaskChannel {
    shared: Arc<Shared>,
    requests: Mutex<Option<mpsc::Sender<WorkerRequest>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    task_timeout: Duration,
}

impl TaskChannel {
    /// 启动后台线程并等待 `ready` 握手。
    ///
    /// 必须在 tokio 运行时内调用；握手失败返回 `WorkerUnavailable`。
    pub async fn open(
        config: &ConverterConfig,
        factory: BackendFactory,
    ) -> Result<Self, ConvertError> {
        let started = Instant::now();
        let (request_tx, request_rx) =
            mpsc::channel::<WorkerRequest>(config.request_queue_capacity.max(1));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WorkerEvent>();
        let port = WorkerPort::new(event_tx);

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(factory, request_rx, port))
            .map_err(|e| ConvertError::WorkerUnavailable(format!("无法启动后台线程：{}", e)))?;

        match tokio::time::timeout(config.init_timeout(), event_rx.recv()).await {
            Ok(Some(WorkerEvent::Message(WorkerMessage::Ready))) => {}
            Ok(Some(WorkerEvent::Fault(reason))) => {
                log::error!("❌ 后台初始化失败：{}", reason);
                return Err(ConvertError::WorkerUnavailable(reason));
            }
            Ok(Some(WorkerEvent::Message(other))) => {
                return Err(ConvertError::WorkerUnavailable(format!(
                    "握手前收到意外消息：{:?}",
                    other
                )));
            }
            Ok(None) => {
                return Err(ConvertError::WorkerUnavailable(
                    "后台线程在就绪前退出".to_string(),
                ));
            }
            Err(_) => {
                log::error!("⏰ {}ms 内未收到后台 ready 信号", config.init_timeout_ms);
                return Err(ConvertError::WorkerUnavailable(format!(
                    "{}ms 内未收到 ready 信号",
                    config.init_timeout_ms
                )));
            }
        }

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            state: Mutex::new((ChannelState::Ready, None)),
            terminated: AtomicBool::new(false),
        });

        let dispatcher = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    match event {
                        WorkerEvent::Message(message) => shared.route(message),
                        WorkerEvent::Fault(reason) => {
                            shared.fault(reason);
                            return;
                        }
                    }
                }
                if !shared.terminated.load(Ordering::Acquire) {
                    shared.fault("后台线程意外退出".to_string());
                }
            })
        };

        log::info!(
            "✅ 后台通道已就绪，耗时 {}ms",
            started.elapsed().as_millis()
        );

        Ok(Self {
            shared,
            requests: Mutex::new(Some(request_tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            task_timeout: config.task_timeout(),
        })
    }

    /// 派发一个任务并等待其终结消息。
    ///
    /// 超时从派发起算；超时后该任务的迟到消息会被静默丢弃。
    pub async fn submit(
        &self,
        action: Action,
        data: RequestData,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionResult, ConvertError> {
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(ConvertError::Terminated);
        }
        if let (ChannelState::Faulted, reason) = self.state_with_reason() {
            return Err(ConvertError::WorkerUnavailable(
                reason.unwrap_or_else(|| "后台通道已故障".to_string()),
            ));
        }
        let sender = lock(&self.requests)
            .clone()
            .ok_or(ConvertError::Terminated)?;

        let id = generate_task_id(action);
        let (settle_tx, settle_rx) = oneshot::channel();
        lock(&self.shared.pending).insert(
            id.clone(),
            PendingTask {
                action,
                on_progress,
                last_progress: 0,
                settle: settle_tx,
            },
        );
        // 登记与故障清理之间可能交错，登记后再确认一次。
        if let (ChannelState::Faulted, reason) = self.state_with_reason() {
            self.shared.forget(&id);
            return Err(ConvertError::WorkerUnavailable(
                reason.unwrap_or_else(|| "后台通道已故障".to_string()),
            ));
        }

        log::debug!("📤 派发任务 {}（{}）", id, action);
        let request = WorkerRequest {
            id: id.clone(),
            action,
            data,
        };

        let started = Instant::now();
        let waited = tokio::time::timeout(self.task_timeout, async move {
            if sender.send(request).await.is_err() {
                return Err(ConvertError::Channel("后台请求队列已关闭".to_string()));
            }
            drop(sender);
            match settle_rx.await {
                Ok(settlement) => settlement,
                Err(_) => Err(ConvertError::Terminated),
            }
        })
        .await;

        match waited {
            Ok(Ok(result)) => {
                log::debug!(
                    "⏱️ 任务 {} 完成 total={}ms",
                    id,
                    started.elapsed().as_millis()
                );
                Ok(result)
            }
            Ok(Err(err)) => {
                self.shared.forget(&id);
                Err(err)
            }
            Err(_) => {
                self.shared.forget(&id);
                let timeout_ms = self.task_timeout.as_millis() as u64;
                log::warn!("⏰ 任务 {}（{}）超时：{}ms", id, action, timeout_ms);
                Err(ConvertError::Timeout(timeout_ms))
            }
        }
    }

    /// 销毁通道：关闭请求队列、停止分发，等待中的任务以 `Terminated` 结束。可重复调用。
    pub fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        lock(&self.requests).take();
        if let Some(dispatcher) = lock(&self.dispatcher).take() {
            dispatcher.abort();
        }
        let dropped = {
            let mut pending = lock(&self.shared.pending);
            let count = pending.len();
            pending.clear();
            count
        };

        log::info!("🧹 后台通道已销毁，丢弃 {} 个等待中的任务", dropped);
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.shared.state).0
    }

    pub fn fault_reason(&self) -> Option<String> {
        lock(&self.shared.state).1.clone()
    }

    fn state_with_reason(&self) -> (ChannelState, Option<String>) {
        lock(&self.shared.state).clone()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }
}

impl Drop for TaskChannel {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// 后台线程主循环：顺序处理请求，直到请求队列关闭或发生传输层故障。
fn worker_loop(
    factory: BackendFactory,
    mut requests: mpsc::Receiver<WorkerRequest>,
    port: WorkerPort,
) {
    let mut backend = match factory() {
        Ok(backend) => backend,
        Err(fault) => {
            log::error!("❌ 创建后台处理器失败：{}", fault);
            port.fault(fault.0);
            return;
        }
    };

    port.post(WorkerMessage::Ready);
    log::debug!("🧵 后台线程已就绪");

    while let Some(request) = requests.blocking_recv() {
        if let Err(fault) = run_request(backend.as_mut(), request, &port) {
            log::error!("❌ 后台处理器故障，线程退出：{}", fault);
            port.fault(fault.0);
            return;
        }
    }

    log::debug!("🛑 请求队列已关闭，后台线程退出");
}
