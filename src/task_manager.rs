//! # 任务管理器（调用侧门面）
//!
//! ## 设计思路
//!
//! `TaskManager` 是显式构造、显式持有的服务对象，替代模块级全局单例：
//! 1. 生命周期由调用方管理，测试可创建互不干扰的独立实例
//! 2. 每个实例独占自己的后台通道与在途任务表
//! 3. 后台处理器通过 `BackendFactory` 注入，便于替换
//!
//! ## 实现思路
//!
//! - 首次调用时才懒加载后台通道；`destroy` 之后的下一次调用会重新创建。
//! - 当前环境不支持后台执行（未配置处理器，或调用线程不在 tokio 运行时内）时，
//!   所有方法返回 `Failure { "Worker not available" }`，而不是报错。
//! - 后台启动失败或传输层故障后，后续调用以 `WorkerUnavailable` 拒绝，直到 `destroy`。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;

use crate::codec::{BinarySource, EncodeOptions};
use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::worker::{
    Action, BackendFactory, ChannelState, CodecWorker, ConversionResult, ProgressCallback,
    RequestData, TaskChannel,
};

enum Slot {
    Idle,
    Active(Arc<TaskChannel>),
    Faulted(String),
}

/// Base64 转换任务管理器。
pub struct TaskManager {
    config: ConverterConfig,
    factory: Option<BackendFactory>,
    slot: Mutex<Slot>,
    initializing: AtomicBool,
}

impl TaskManager {
    /// 使用默认后台处理器创建管理器。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use base64_workbench::{ConverterConfig, TaskManager};
    ///
    /// # async fn demo() -> Result<(), base64_workbench::ConvertError> {
    /// let manager = TaskManager::new(ConverterConfig::default())?;
    /// let result = manager.base64_to_blob("SGVsbG8=", None).await?;
    /// assert!(result.is_success());
    /// manager.destroy().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ConverterConfig) -> Result<Self, ConvertError> {
        let factory = CodecWorker::factory(config.clone());
        Self::with_backend(config, factory)
    }

    /// 使用自定义后台处理器创建管理器。
    ///
    /// 主要用于测试或替换后台实现。
    pub fn with_backend(
        config: ConverterConfig,
        factory: BackendFactory,
    ) -> Result<Self, ConvertError> {
        config.validate()?;
        Ok(Self {
            config,
            factory: Some(factory),
            slot: Mutex::new(Slot::Idle),
            initializing: AtomicBool::new(false),
        })
    }

    /// 创建不具备后台执行能力的管理器，所有方法都返回降级结果。
    ///
    /// 配置同样经过校验，`config()` 返回的值与其他构造方式一致。
    pub fn without_worker(config: ConverterConfig) -> Result<Self, ConvertError> {
        config.validate()?;
        Ok(Self {
            config,
            factory: None,
            slot: Mutex::new(Slot::Idle),
            initializing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// 将文件编码为 Data URL（`data:<mime>;base64,...`）。
    pub async fn file_to_base64(
        &self,
        source: BinarySource,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionResult, ConvertError> {
        self.file_to_base64_with(source, EncodeOptions::data_url(), on_progress)
            .await
    }

    /// 按指定选项编码文件：可输出纯 Base64，或限定期望的 MIME 类别。
    pub async fn file_to_base64_with(
        &self,
        source: BinarySource,
        options: EncodeOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionResult, ConvertError> {
        self.dispatch(
            Action::FileToBase64,
            RequestData::File { source, options },
            on_progress,
        )
        .await
    }

    /// 将 Base64 / Data URL 解码为二进制对象。
    pub async fn base64_to_blob(
        &self,
        base64: impl Into<String>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionResult, ConvertError> {
        self.dispatch(
            Action::Base64ToBlob,
            RequestData::Base64 {
                base64: base64.into(),
            },
            on_progress,
        )
        .await
    }

    /// 校验 Base64 图片；结论在成功结果的 `validation` 字段中。
    pub async fn validate_base64_image(
        &self,
        base64: impl Into<String>,
    ) -> Result<ConversionResult, ConvertError> {
        self.dispatch(
            Action::ValidateBase64,
            RequestData::Base64 {
                base64: base64.into(),
            },
            None,
        )
        .await
    }

    /// 按协议动作名派发任务；未知动作返回 `UnknownAction` 失败结果。
    pub async fn run(
        &self,
        action: &str,
        data: RequestData,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionResult, ConvertError> {
        match action.parse::<Action>() {
            Ok(action) => self.dispatch(action, data, on_progress).await,
            Err(err) => {
                log::warn!("⚠️ {}", err);
                Ok(ConversionResult::failure(&err))
            }
        }
    }

    /// 销毁后台通道。可重复调用，未初始化时调用也安全。
    pub async fn destroy(&self) {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Active(channel) => {
                let pending = channel.pending_count();
                channel.terminate();
                log::info!("🧹 任务管理器已销毁后台通道（等待中任务 {} 个）", pending);
            }
            Slot::Faulted(reason) => {
                log::info!("🧹 清除故障状态：{}", reason);
            }
            Slot::Idle => log::debug!("任务管理器尚未初始化，无需销毁"),
        }
    }

    /// 当前通道状态。
    pub async fn state(&self) -> ChannelState {
        if self.initializing.load(Ordering::Acquire) {
            return ChannelState::Initializing;
        }
        match &*self.slot.lock().await {
            Slot::Idle => ChannelState::Uninitialized,
            Slot::Active(channel) => channel.state(),
            Slot::Faulted(_) => ChannelState::Faulted,
        }
    }

    async fn dispatch(
        &self,
        action: Action,
        data: RequestData,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionResult, ConvertError> {
        let Some(channel) = self.channel().await? else {
            log::warn!("⚠️ 当前环境不支持后台任务，{} 返回降级结果", action);
            return Ok(ConversionResult::worker_unavailable());
        };

        let started = Instant::now();
        let outcome = channel.submit(action, data, on_progress).await;
        match &outcome {
            Ok(result) if result.is_success() => log::info!(
                "✅ {} 完成，耗时 {}ms",
                action,
                started.elapsed().as_millis()
            ),
            Ok(result) => log::info!(
                "❎ {} 失败：{}",
                action,
                result.error_message().unwrap_or_default()
            ),
            Err(err) => log::warn!("⚠️ {} 被拒绝：{}", action, err),
        }
        outcome
    }

    /// 取得可用通道；`Ok(None)` 表示当前环境不支持后台执行。
    async fn channel(&self) -> Result<Option<Arc<TaskChannel>>, ConvertError> {
        let Some(factory) = &self.factory else {
            return Ok(None);
        };
        if tokio::runtime::Handle::try_current().is_err() {
            return Ok(None);
        }

        let mut slot = self.slot.lock().await;
        let faulted = match &*slot {
            Slot::Active(channel) if channel.state() == ChannelState::Faulted => Some(
                channel
                    .fault_reason()
                    .unwrap_or_else(|| "后台通道已故障".to_string()),
            ),
            Slot::Active(channel) => return Ok(Some(Arc::clone(channel))),
            Slot::Faulted(reason) => return Err(ConvertError::WorkerUnavailable(reason.clone())),
            Slot::Idle => None,
        };
        if let Some(reason) = faulted {
            *slot = Slot::Faulted(reason.clone());
            return Err(ConvertError::WorkerUnavailable(reason));
        }

        log::info!("🚀 首次使用，启动后台通道");
        self.initializing.store(true, Ordering::Release);
        let opened = TaskChannel::open(&self.config, Arc::clone(factory)).await;
        self.initializing.store(false, Ordering::Release);

        match opened {
            Ok(channel) => {
                let channel = Arc::new(channel);
                *slot = Slot::Active(Arc::clone(&channel));
                Ok(Some(channel))
            }
            Err(err) => {
                let reason = match &err {
                    ConvertError::WorkerUnavailable(reason) => reason.clone(),
                    other => other.to_string(),
                };
                *slot = Slot::Faulted(reason);
                Err(err)
            }
        }
    }
}
