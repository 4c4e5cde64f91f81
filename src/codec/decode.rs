//! # 分块解码模块
//!
//! ## 设计思路
//!
//! 将大体积 Base64 文本按固定长度切片解码，每片结束后上报一次进度，
//! 避免单次巨型解码长时间占用执行线程且无任何反馈。
//!
//! ## 实现思路
//!
//! 1. 拆分可选的 Data URL 头，记录 MIME 类型
//! 2. 字母表 / 填充校验（失败时不触发任何进度回调）
//! 3. 按 4 的倍数切片，逐片解码并累积到同一个缓冲区
//! 4. 组装为带 MIME 标签的 `Blob`，附带体积信息

use std::time::Instant;

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;

use super::ProgressFn;
use super::data_url::Base64Payload;
use super::size::{SizeInfo, format_size};
use crate::config::ConverterConfig;
use crate::error::ConvertError;

/// 带 MIME 标签的二进制对象。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 解码输出。
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub blob: Blob,
    pub size: SizeInfo,
    /// 输入是否带有 Data URL 头。
    pub had_data_url_prefix: bool,
}

/// 按估算上界预留容量：每 4 个字符最多 3 个字节。
fn estimate_decoded_upper_bound(payload_len: usize) -> usize {
    payload_len.div_ceil(4).saturating_mul(3)
}

/// 分块解码 Base64（可带 Data URL 头）。
///
/// 进度单调不减，且最后一次回调恰好为 100。
///
/// # 示例
/// ```rust
/// use base64_workbench::ConverterConfig;
/// use base64_workbench::codec::decode;
///
/// let out = decode("data:text/plain;base64,SGVsbG8=", &ConverterConfig::default(), &mut |_, _| {})?;
/// assert_eq!(&out.blob.bytes[..], b"Hello");
/// assert_eq!(out.blob.mime_type, "text/plain");
/// # Ok::<(), base64_workbench::ConvertError>(())
/// ```
pub fn decode(
    input: &str,
    config: &ConverterConfig,
    on_progress: &mut ProgressFn<'_>,
) -> Result<DecodeOutput, ConvertError> {
    let start = Instant::now();
    let parsed = Base64Payload::parse_validated(input)?;
    let payload = parsed.payload();
    let chunk_size = config.effective_decode_chunk_size();

    let total_slices = payload.len().div_ceil(chunk_size);
    let mut buffer = Vec::with_capacity(estimate_decoded_upper_bound(payload.len()));

    log::debug!(
        "📝 开始分块解码 - 输入 {} 字符，{} 片，MIME={}",
        payload.len(),
        total_slices,
        parsed.mime_type()
    );

    // 切片边界都落在 4 的倍数上，字母表已校验为 ASCII，按字节切片不会截断字符。
    for (index, slice) in payload.as_bytes().chunks(chunk_size).enumerate() {
        general_purpose::STANDARD
            .decode_vec(slice, &mut buffer)
            .map_err(|e| ConvertError::Decode(format!("Base64 解码失败：{}", e)))?;

        let done = index + 1;
        let percent = (done * 100 / total_slices) as u8;
        on_progress(percent, &format!("正在解码 {}/{} 片...", done, total_slices));
    }

    if total_slices == 0 {
        on_progress(100, "解码完成（空输入）");
    }

    let size = format_size(buffer.len() as u64);
    log::info!(
        "✅ Base64 解码完成 - 输出 {} total={}ms",
        size,
        start.elapsed().as_millis()
    );

    Ok(DecodeOutput {
        had_data_url_prefix: parsed.has_prefix(),
        blob: Blob::new(parsed.mime_type(), buffer),
        size,
    })
}
