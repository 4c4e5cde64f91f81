//! # 后台执行侧
//!
//! ## 设计思路
//!
//! `WorkerBackend` 是后台执行环境里的消息处理器，也是可替换的接缝：
//! 生产环境使用 `CodecWorker` 运行分块编解码，测试可以注入慢速或故障实现。
//!
//! ## 实现思路
//!
//! - 处理器通过 `WorkerPort` 回发 `progress` / `result` 消息。
//! - 任务级错误（编解码失败）转为 `Failure` 结果；处理器 panic 被捕获后转为 `error` 消息，
//!   任何异常都不会逃出消息处理循环。
//! - 处理器返回 `Err(WorkerFault)` 表示执行环境本身已损坏（传输层故障），循环随即退出。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::protocol::{
    Action, ConversionResult, ConversionSuccess, RequestData, TaskId, WorkerEvent, WorkerMessage,
    WorkerRequest,
};
use crate::codec::{self, Base64Payload, format_size};
use crate::config::ConverterConfig;
use crate::error::ConvertError;

/// 执行环境级故障（非任务级）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct WorkerFault(pub String);

/// 构造后台处理器的工厂；在后台线程内调用。
pub type BackendFactory =
    Arc<dyn Fn() -> Result<Box<dyn WorkerBackend>, WorkerFault> + Send + Sync>;

/// 后台消息处理器。
pub trait WorkerBackend: Send + 'static {
    /// 处理单个请求，并通过 `port` 回发恰好一条终结消息。
    fn handle(&mut self, request: WorkerRequest, port: &WorkerPort) -> Result<(), WorkerFault>;
}

/// 后台 → 调用方的发送端。
#[derive(Clone)]
pub struct WorkerPort {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerPort {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    /// 发送消息；接收端已关闭时返回 `false`。
    pub fn post(&self, message: WorkerMessage) -> bool {
        self.tx.send(WorkerEvent::Message(message)).is_ok()
    }

    pub fn progress(&self, id: &str, progress: u8, message: &str) -> bool {
        self.post(WorkerMessage::Progress {
            id: id.to_string(),
            progress,
            message: message.to_string(),
        })
    }

    pub fn result(&self, id: TaskId, result: ConversionResult) -> bool {
        self.post(WorkerMessage::Result { id, result })
    }

    pub(crate) fn fault(&self, reason: String) -> bool {
        self.tx.send(WorkerEvent::Fault(reason)).is_ok()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 运行单个请求，捕获处理器 panic 并转为 `error` 消息。
pub(crate) fn run_request(
    backend: &mut dyn WorkerBackend,
    request: WorkerRequest,
    port: &WorkerPort,
) -> Result<(), WorkerFault> {
    let id = request.id.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| backend.handle(request, port))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("💥 后台任务 {} 处理时 panic：{}", id, message);
            port.post(WorkerMessage::Error { id, error: message });
            Ok(())
        }
    }
}

/// 默认后台处理器：运行分块编解码。
pub struct CodecWorker {
    config: ConverterConfig,
}

impl CodecWorker {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// 以默认处理器构造工厂。
    pub fn factory(config: ConverterConfig) -> BackendFactory {
        Arc::new(move || {
            let backend: Box<dyn WorkerBackend> = Box::new(CodecWorker::new(config.clone()));
            Ok::<_, WorkerFault>(backend)
        })
    }

    fn convert(
        &self,
        id: &str,
        action: Action,
        data: RequestData,
        port: &WorkerPort,
    ) -> Result<ConversionResult, ConvertError> {
        let mut on_progress = |percent: u8, message: &str| {
            port.progress(id, percent, message);
        };

        match (action, data) {
            (Action::FileToBase64, RequestData::File { source, options }) => {
                let out = codec::encode(source, &options, &self.config, &mut on_progress)?;
                Ok(ConversionResult::Success(ConversionSuccess {
                    data: Some(out.data),
                    url: None,
                    blob: None,
                    size: out.size,
                    mime_type: out.mime_type,
                    validation: None,
                }))
            }
            (Action::Base64ToBlob, RequestData::Base64 { base64 }) => {
                let out = codec::decode(&base64, &self.config, &mut on_progress)?;
                Ok(ConversionResult::Success(ConversionSuccess {
                    data: None,
                    url: Some(format!("blob:{}", id)),
                    mime_type: out.blob.mime_type.clone(),
                    blob: Some(out.blob),
                    size: out.size,
                    validation: None,
                }))
            }
            (Action::ValidateBase64, RequestData::Base64 { base64 }) => {
                let report = codec::validate_base64_image(&base64);
                let size_hint = Base64Payload::parse(&base64)
                    .map(|parsed| parsed.decoded_len_hint())
                    .unwrap_or(0);
                Ok(ConversionResult::Success(ConversionSuccess {
                    data: None,
                    url: None,
                    blob: None,
                    size: format_size(size_hint),
                    mime_type: report.declared_mime.clone().unwrap_or_default(),
                    validation: Some(report),
                }))
            }
            (action, _) => Err(ConvertError::InvalidFormat(format!(
                "{} 不接受该类型的请求数据",
                action
            ))),
        }
    }
}

impl WorkerBackend for CodecWorker {
    fn handle(&mut self, request: WorkerRequest, port: &WorkerPort) -> Result<(), WorkerFault> {
        let WorkerRequest { id, action, data } = request;
        log::debug!("🧵 后台开始处理任务 {}（{}）", id, action);

        let result = match self.convert(&id, action, data, port) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("⚠️ 任务 {}（{}）失败：{}", id, action, err);
                ConversionResult::failure(&err)
            }
        };

        port.result(id, result);
        Ok(())
    }
}
