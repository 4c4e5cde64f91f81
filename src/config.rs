//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ConverterConfig`：分块大小、体积上限、任务超时等。
//! 分块大小只是调优常量，不属于消息协议的一部分。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置（1 MiB 解码分块、100 MiB 上限、30 秒超时）。
//! - `validate` 按区间校验，越界返回 `ConvertError::InvalidConfig`。
//! - `apply_settings` 从前端设置 JSON 中读取已知键并钳制到合法区间。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

pub const DEFAULT_DECODE_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_READ_CHUNK_SIZE: usize = 768 * 1024;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_QUEUE_CAPACITY: usize = 64;

const CHUNK_SIZE_MIN: usize = 4;
const CHUNK_SIZE_MAX: usize = 64 * 1024 * 1024;
const TIMEOUT_MIN_MS: u64 = 10;
const TIMEOUT_MAX_MS: u64 = 10 * 60 * 1000;
const QUEUE_CAPACITY_MAX: usize = 4096;
/// `max_file_size` 的上限（4 GiB）。
pub const MAX_FILE_SIZE_LIMIT: u64 = 4 * 1024 * 1024 * 1024;

/// 转换器配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConverterConfig {
    /// 每个解码分片包含的 Base64 字符数（向下取整到 4 的倍数）。
    pub decode_chunk_size: usize,
    /// 编码时每次读取的字节数（向下取整到 3 的倍数）。
    pub read_chunk_size: usize,
    /// 编码允许的最大源文件体积（字节）。
    pub max_file_size: u64,
    /// 单个任务从派发起算的超时时间（毫秒）。
    pub task_timeout_ms: u64,
    /// 等待后台 `ready` 信号的超时时间（毫秒）。
    pub init_timeout_ms: u64,
    /// 发往后台的请求队列容量。
    pub request_queue_capacity: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            decode_chunk_size: DEFAULT_DECODE_CHUNK_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            task_timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            request_queue_capacity: DEFAULT_REQUEST_QUEUE_CAPACITY,
        }
    }
}

impl ConverterConfig {
    /// 校验各项参数是否在合法区间内。
    ///
    /// # 示例
    /// ```rust
    /// use base64_workbench::ConverterConfig;
    ///
    /// let mut config = ConverterConfig::default();
    /// config.task_timeout_ms = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConvertError> {
        if !(CHUNK_SIZE_MIN..=CHUNK_SIZE_MAX).contains(&self.decode_chunk_size) {
            return Err(ConvertError::InvalidConfig(format!(
                "decode_chunk_size 必须在 {}~{} 之间",
                CHUNK_SIZE_MIN, CHUNK_SIZE_MAX
            )));
        }
        if !(CHUNK_SIZE_MIN..=CHUNK_SIZE_MAX).contains(&self.read_chunk_size) {
            return Err(ConvertError::InvalidConfig(format!(
                "read_chunk_size 必须在 {}~{} 之间",
                CHUNK_SIZE_MIN, CHUNK_SIZE_MAX
            )));
        }
        if !(1..=MAX_FILE_SIZE_LIMIT).contains(&self.max_file_size) {
            return Err(ConvertError::InvalidConfig(format!(
                "max_file_size 必须在 1~{} 字节之间",
                MAX_FILE_SIZE_LIMIT
            )));
        }
        if !(TIMEOUT_MIN_MS..=TIMEOUT_MAX_MS).contains(&self.task_timeout_ms) {
            return Err(ConvertError::InvalidConfig(format!(
                "task_timeout_ms 必须在 {}~{} 毫秒之间",
                TIMEOUT_MIN_MS, TIMEOUT_MAX_MS
            )));
        }
        if !(TIMEOUT_MIN_MS..=TIMEOUT_MAX_MS).contains(&self.init_timeout_ms) {
            return Err(ConvertError::InvalidConfig(format!(
                "init_timeout_ms 必须在 {}~{} 毫秒之间",
                TIMEOUT_MIN_MS, TIMEOUT_MAX_MS
            )));
        }
        if !(1..=QUEUE_CAPACITY_MAX).contains(&self.request_queue_capacity) {
            return Err(ConvertError::InvalidConfig(format!(
                "request_queue_capacity 必须在 1~{} 之间",
                QUEUE_CAPACITY_MAX
            )));
        }
        Ok(())
    }

    /// 从 JSON 文本解析配置，缺失字段使用默认值，并执行区间校验。
    pub fn from_json_str(text: &str) -> Result<Self, ConvertError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConvertError::InvalidConfig(format!("解析配置失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 将前端设置对象中的已知键覆盖到当前配置，数值钳制到合法区间。
    ///
    /// 未知键与类型不符的值会被忽略。
    pub fn apply_settings(&mut self, settings: &serde_json::Value) {
        let read_u64 = |key: &str| settings.get(key).and_then(|v| v.as_u64());

        if let Some(v) = read_u64("decodeChunkSize") {
            self.decode_chunk_size = clamp_usize(v, CHUNK_SIZE_MIN, CHUNK_SIZE_MAX);
        }
        if let Some(v) = read_u64("readChunkSize") {
            self.read_chunk_size = clamp_usize(v, CHUNK_SIZE_MIN, CHUNK_SIZE_MAX);
        }
        if let Some(v) = read_u64("maxFileSize") {
            self.max_file_size = v.clamp(1, MAX_FILE_SIZE_LIMIT);
        }
        if let Some(v) = read_u64("taskTimeoutMs") {
            self.task_timeout_ms = v.clamp(TIMEOUT_MIN_MS, TIMEOUT_MAX_MS);
        }
        if let Some(v) = read_u64("initTimeoutMs") {
            self.init_timeout_ms = v.clamp(TIMEOUT_MIN_MS, TIMEOUT_MAX_MS);
        }
        if let Some(v) = read_u64("requestQueueCapacity") {
            self.request_queue_capacity = clamp_usize(v, 1, QUEUE_CAPACITY_MAX);
        }

        log::debug!(
            "⚙️ 转换配置已更新：decode_chunk={} read_chunk={} max_file={} timeout={}ms",
            self.decode_chunk_size,
            self.read_chunk_size,
            self.max_file_size,
            self.task_timeout_ms
        );
    }

    /// 实际使用的解码分片大小：4 的倍数，保证每片都是完整的 Base64 分组。
    pub fn effective_decode_chunk_size(&self) -> usize {
        (self.decode_chunk_size / 4).max(1) * 4
    }

    /// 实际使用的读取分块大小：3 的倍数，保证中间分块编码后不带填充。
    pub fn effective_read_chunk_size(&self) -> usize {
        (self.read_chunk_size / 3).max(1) * 3
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

fn clamp_usize(value: u64, min: usize, max: usize) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX).clamp(min, max)
}
