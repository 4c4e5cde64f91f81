//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `ConvertError` 枚举，覆盖编解码、后台通道与任务管理三层的全部失败来源，
//! 替代字符串拼接式错误处理。调用侧既可以按分支匹配，也可以直接展示人类可读消息。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - `ErrorKind` 是可序列化的稳定错误码，随 `result` 消息跨越后台边界。
//! - 实现 `Serialize` 将错误序列化为字符串，满足消息协议要求。

use serde::{Deserialize, Serialize};

/// 转换链路统一错误类型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    /// 输入不符合 Base64 字母表 / 填充规则，或 Data URL 头不完整。
    #[error("格式错误：{0}")]
    InvalidFormat(String),

    /// 通过格式校验后，底层解码仍然失败（截断、损坏）。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 数据源超过配置的体积上限。
    #[error("文件过大：{size}（限制：{limit}）")]
    TooLarge { size: String, limit: String },

    /// 数据源 MIME 类型与调用方期望的类别不符。
    #[error("类型不匹配：期望 {expected}，实际为 {actual}")]
    WrongType { expected: String, actual: String },

    /// 读取数据源失败。
    #[error("读取失败：{0}")]
    Read(String),

    /// 后台执行环境不可用或已故障。
    #[error("{0}")]
    WorkerUnavailable(String),

    /// 在时限内没有收到终结消息。
    #[error("任务超时：{0}ms 内未收到结果")]
    Timeout(u64),

    /// 后台通道的传输层错误（非任务级）。
    #[error("后台通道错误：{0}")]
    Channel(String),

    /// 任务仍在等待时通道已被销毁。
    #[error("后台通道已销毁")]
    Terminated,

    /// 后台任务以 `error` 消息结束。
    #[error("后台任务失败：{0}")]
    Task(String),

    /// 不支持的动作。
    #[error("未知操作：{0}")]
    UnknownAction(String),

    /// 配置参数越界。
    #[error("配置错误：{0}")]
    InvalidConfig(String),
}

/// 稳定错误码，用于跨后台边界传递错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidFormat,
    DecodeError,
    TooLarge,
    WrongType,
    ReadError,
    WorkerUnavailable,
    Timeout,
    Channel,
    Terminated,
    Task,
    UnknownAction,
    InvalidConfig,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::WrongType { .. } => ErrorKind::WrongType,
            Self::Read(_) => ErrorKind::ReadError,
            Self::WorkerUnavailable(_) => ErrorKind::WorkerUnavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Channel(_) => ErrorKind::Channel,
            Self::Terminated => ErrorKind::Terminated,
            Self::Task(_) => ErrorKind::Task,
            Self::UnknownAction(_) => ErrorKind::UnknownAction,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// 该错误是否源自后台执行环境本身（而非某个任务的输入）。
    pub fn is_worker_fault(&self) -> bool {
        matches!(
            self,
            Self::WorkerUnavailable(_) | Self::Channel(_) | Self::Terminated
        )
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(error: std::io::Error) -> Self {
        Self::Read(error.to_string())
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for ConvertError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ConvertError::Timeout(30_000).kind(), ErrorKind::Timeout);
        assert_eq!(
            ConvertError::Decode("bad".into()).kind(),
            ErrorKind::DecodeError
        );
        assert_eq!(
            ConvertError::from(std::io::Error::other("disk gone")).kind(),
            ErrorKind::ReadError
        );
    }

    #[test]
    fn error_serializes_as_display_string() {
        let err = ConvertError::InvalidFormat("非法字符".into());
        let json = serde_json::to_string(&err).expect("serialize error");
        assert_eq!(json, "\"格式错误：非法字符\"");

        let kind = serde_json::to_string(&ErrorKind::WorkerUnavailable).expect("serialize kind");
        assert_eq!(kind, "\"workerUnavailable\"");
    }

    #[test]
    fn worker_faults_are_flagged() {
        assert!(ConvertError::Terminated.is_worker_fault());
        assert!(ConvertError::Channel("gone".into()).is_worker_fault());
        assert!(!ConvertError::Timeout(1).is_worker_fault());
    }
}
