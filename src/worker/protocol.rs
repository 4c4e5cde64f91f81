//! # 消息协议
//!
//! ## 设计思路
//!
//! 调用方与后台执行环境之间只通过消息交互，不共享可变状态。
//! 出站消息（后台 → 调用方）的 JSON 形状是稳定契约，与两侧实现语言无关：
//!
//! ```text
//! { "type": "ready" }
//! { "type": "progress", "id": "...", "progress": 40, "message": "..." }
//! { "type": "result",   "id": "...", "result": { "status": "success", ... } }
//! { "type": "error",    "id": "...", "error": "..." }
//! ```
//!
//! 入站请求同样有稳定的 JSON 形状：
//!
//! ```text
//! { "id": "...", "action": "base64ToBlob", "data": { "base64": "..." } }
//! ```
//!
//! 只有 `fileToBase64` 的数据源（读取器）无法序列化，该变体只在进程内传递，
//! 序列化它会返回错误。

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::codec::{BinarySource, Blob, EncodeOptions, SizeInfo, ValidationReport};
use crate::error::{ConvertError, ErrorKind};

/// 任务 ID：同一时刻在途任务之间唯一。
pub type TaskId = String;

pub const WORKER_NOT_AVAILABLE: &str = "Worker not available";

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 请求动作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    FileToBase64,
    Base64ToBlob,
    ValidateBase64,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileToBase64 => "fileToBase64",
            Self::Base64ToBlob => "base64ToBlob",
            Self::ValidateBase64 => "validateBase64",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ConvertError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action.trim() {
            "fileToBase64" => Ok(Self::FileToBase64),
            "base64ToBlob" => Ok(Self::Base64ToBlob),
            "validateBase64" => Ok(Self::ValidateBase64),
            other => Err(ConvertError::UnknownAction(other.to_string())),
        }
    }
}

/// 请求数据。
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestData {
    /// 进程内数据源，不参与序列化。
    #[serde(skip)]
    File {
        source: BinarySource,
        options: EncodeOptions,
    },
    Base64 {
        base64: String,
    },
}

/// 调用方 → 后台的请求。
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: TaskId,
    pub action: Action,
    pub data: RequestData,
}

/// 成功结果。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSuccess {
    /// Base64 文本（编码结果）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// 解码结果的句柄，形如 `blob:<task-id>`。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 句柄对应的二进制对象，所有权随结果消息交回调用方。
    #[serde(skip)]
    pub blob: Option<Blob>,
    pub size: SizeInfo,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

/// 转换结果：成功或失败，生成后不再修改。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConversionResult {
    Success(ConversionSuccess),
    #[serde(rename_all = "camelCase")]
    Failure {
        error_message: String,
        kind: ErrorKind,
    },
}

impl ConversionResult {
    pub fn failure(error: &ConvertError) -> Self {
        Self::Failure {
            error_message: error.to_string(),
            kind: error.kind(),
        }
    }

    /// 执行环境不支持后台任务时的统一结果。
    pub fn worker_unavailable() -> Self {
        Self::Failure {
            error_message: WORKER_NOT_AVAILABLE.to_string(),
            kind: ErrorKind::WorkerUnavailable,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn as_success(&self) -> Option<&ConversionSuccess> {
        match self {
            Self::Success(success) => Some(success),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_success(self) -> Option<ConversionSuccess> {
        match self {
            Self::Success(success) => Some(success),
            Self::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error_message, .. } => Some(error_message),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// 后台 → 调用方的消息。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    Ready,
    Progress {
        id: TaskId,
        progress: u8,
        message: String,
    },
    Result {
        id: TaskId,
        result: ConversionResult,
    },
    Error {
        id: TaskId,
        error: String,
    },
}

impl WorkerMessage {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Ready => None,
            Self::Progress { id, .. } | Self::Result { id, .. } | Self::Error { id, .. } => {
                Some(id.as_str())
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

/// 传输层事件：正常消息，或执行环境本身的故障。
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Message(WorkerMessage),
    Fault(String),
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// 生成任务 ID：`<action>-<毫秒时间戳>-<序号>-<随机后缀>`（数字均为 36 进制）。
pub fn generate_task_id(action: Action) -> TaskId {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let sequence = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(sequence);
    hasher.write_u64(millis);
    let suffix = hasher.finish();

    format!(
        "{}-{}-{}-{}",
        action.as_str(),
        to_base36(millis),
        to_base36(sequence),
        to_base36(suffix)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::format_size;
    use std::collections::HashSet;

    #[test]
    fn base64_requests_use_the_wire_shape() {
        let text = r#"{"id":"base64ToBlob-1","action":"base64ToBlob","data":{"base64":"QUJD"}}"#;
        let request: WorkerRequest = serde_json::from_str(text).expect("deserialize");
        assert_eq!(request.id, "base64ToBlob-1");
        assert_eq!(request.action, Action::Base64ToBlob);
        assert!(matches!(request.data, RequestData::Base64 { ref base64 } if base64 == "QUJD"));

        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value, serde_json::from_str::<serde_json::Value>(text).expect("json"));
    }

    #[test]
    fn file_requests_stay_in_process() {
        let request = WorkerRequest {
            id: "fileToBase64-1".to_string(),
            action: Action::FileToBase64,
            data: RequestData::File {
                source: BinarySource::from_bytes("a.txt", "text/plain", b"A".to_vec()),
                options: EncodeOptions::default(),
            },
        };
        assert!(serde_json::to_string(&request).is_err());
    }

    #[test]
    fn action_names_follow_protocol() {
        assert_eq!(Action::FileToBase64.as_str(), "fileToBase64");
        assert_eq!("base64ToBlob".parse::<Action>(), Ok(Action::Base64ToBlob));
        assert_eq!(
            serde_json::to_string(&Action::ValidateBase64).expect("serialize"),
            "\"validateBase64\""
        );
        assert!(matches!(
            "compress".parse::<Action>(),
            Err(ConvertError::UnknownAction(_))
        ));
    }

    #[test]
    fn messages_serialize_to_stable_shapes() {
        let ready = serde_json::to_value(WorkerMessage::Ready).expect("serialize");
        assert_eq!(ready, serde_json::json!({ "type": "ready" }));

        let progress = serde_json::to_value(WorkerMessage::Progress {
            id: "t1".into(),
            progress: 40,
            message: "half".into(),
        })
        .expect("serialize");
        assert_eq!(
            progress,
            serde_json::json!({ "type": "progress", "id": "t1", "progress": 40, "message": "half" })
        );

        let error = serde_json::to_value(WorkerMessage::Error {
            id: "t2".into(),
            error: "boom".into(),
        })
        .expect("serialize");
        assert_eq!(error, serde_json::json!({ "type": "error", "id": "t2", "error": "boom" }));
    }

    #[test]
    fn result_messages_carry_discriminated_union() {
        let success = WorkerMessage::Result {
            id: "t3".into(),
            result: ConversionResult::Success(ConversionSuccess {
                data: Some("SGk=".into()),
                url: None,
                blob: None,
                size: format_size(2),
                mime_type: "text/plain".into(),
                validation: None,
            }),
        };
        let value = serde_json::to_value(&success).expect("serialize");
        assert_eq!(value["type"], "result");
        assert_eq!(value["result"]["status"], "success");
        assert_eq!(value["result"]["data"], "SGk=");
        assert_eq!(value["result"]["mimeType"], "text/plain");
        assert_eq!(value["result"]["size"]["unit"], "B");
        assert!(value["result"].get("url").is_none());

        let failure =
            serde_json::to_value(ConversionResult::worker_unavailable()).expect("serialize");
        assert_eq!(
            failure,
            serde_json::json!({
                "status": "failure",
                "errorMessage": "Worker not available",
                "kind": "workerUnavailable"
            })
        );
    }

    #[test]
    fn task_ids_are_unique_and_tagged_with_action() {
        let ids: HashSet<TaskId> = (0..1000)
            .map(|_| generate_task_id(Action::Base64ToBlob))
            .collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("base64ToBlob-")));
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
