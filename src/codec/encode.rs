//! # 增量编码模块
//!
//! ## 设计思路
//!
//! 在“尽可能早”的阶段执行输入校验（体积、类型），再增量读取数据源并逐块编码，
//! 读取进度按 0–100 换算后上报。
//!
//! ## 实现思路
//!
//! - 读取分块为 3 的倍数，中间分块编码结果不含填充，可直接拼接。
//! - 进度只在百分比变化时上报，读取完成后恰好上报一次 100。
//! - 实际读到的字节超过上限时中止（声明长度可能不可信）。

use std::io::{ErrorKind as IoErrorKind, Read};
use std::time::Instant;

use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;

use super::ProgressFn;
use super::data_url::to_data_url;
use super::size::{SizeInfo, format_size};
use super::source::BinarySource;
use crate::config::ConverterConfig;
use crate::error::ConvertError;

/// 编码缓冲区最多按多少个读取分块预分配。
const PREALLOC_CHUNKS: u64 = 16;

/// 编码选项。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeOptions {
    /// 期望的类型类别，如 `image`、`image/*`、`application/pdf`；`None` 表示不限。
    pub expected_type: Option<String>,
    /// 是否输出带 `data:<mime>;base64,` 头的 Data URL。
    pub data_url: bool,
}

impl EncodeOptions {
    pub fn data_url() -> Self {
        Self {
            expected_type: None,
            data_url: true,
        }
    }

    pub fn expecting(mut self, category: impl Into<String>) -> Self {
        self.expected_type = Some(category.into());
        self
    }
}

/// 编码输出。
#[derive(Debug, Clone)]
pub struct EncodeOutput {
    pub data: String,
    pub size: SizeInfo,
    pub mime_type: String,
    pub name: String,
}

/// 判断实际 MIME 是否属于期望类别。
///
/// - `image` / `image/*`：主类型匹配
/// - `application/pdf`：完整匹配（忽略参数与大小写）
/// - 空串 / `*` / `*/*`：不限
pub fn mime_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim().to_ascii_lowercase();
    let actual = actual
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if expected.is_empty() || expected == "*" || expected == "*/*" {
        return true;
    }

    let category = expected.strip_suffix("/*").unwrap_or(&expected);
    if category.contains('/') {
        actual == category
    } else {
        actual
            .split_once('/')
            .is_some_and(|(major, _)| major == category)
    }
}

/// 尽量填满缓冲区；返回 0 表示已到 EOF。
fn fill_buffer(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// 为 `raw_len` 字节的编码结果预留空间，分配失败转为 `Read` 错误而不是中止进程。
fn reserve_encoded(encoded: &mut String, raw_len: u64, name: &str) -> Result<(), ConvertError> {
    let additional = usize::try_from(raw_len.div_ceil(3).saturating_mul(4)).unwrap_or(usize::MAX);
    encoded
        .try_reserve(additional)
        .map_err(|e| ConvertError::Read(format!("无法为 {} 分配编码缓冲区：{}", name, e)))
}

fn too_large(size: u64, limit: u64) -> ConvertError {
    ConvertError::TooLarge {
        size: format_size(size).to_string(),
        limit: format_size(limit).to_string(),
    }
}

/// 增量读取数据源并编码为 Base64。
///
/// # 示例
/// ```rust
/// use base64_workbench::ConverterConfig;
/// use base64_workbench::codec::{BinarySource, EncodeOptions, encode};
///
/// let source = BinarySource::from_bytes("hi.txt", "text/plain", b"Hello".to_vec());
/// let out = encode(source, &EncodeOptions::data_url(), &ConverterConfig::default(), &mut |_, _| {})?;
/// assert_eq!(out.data, "data:text/plain;base64,SGVsbG8=");
/// # Ok::<(), base64_workbench::ConvertError>(())
/// ```
pub fn encode(
    source: BinarySource,
    options: &EncodeOptions,
    config: &ConverterConfig,
    on_progress: &mut ProgressFn<'_>,
) -> Result<EncodeOutput, ConvertError> {
    let start = Instant::now();

    if source.len() > config.max_file_size {
        return Err(too_large(source.len(), config.max_file_size));
    }

    if let Some(expected) = options.expected_type.as_deref() {
        if !mime_matches(expected, source.mime_type()) {
            return Err(ConvertError::WrongType {
                expected: expected.to_string(),
                actual: source.mime_type().to_string(),
            });
        }
    }

    let (name, mime_type, declared_len, mut reader) = source.into_parts();
    let chunk_size = config.effective_read_chunk_size();
    let mut buf = vec![0u8; chunk_size];
    // 声明长度不可信，预分配最多覆盖若干个读取分块，其余随读取增长。
    let capacity_hint = declared_len
        .min(config.max_file_size)
        .min((chunk_size as u64).saturating_mul(PREALLOC_CHUNKS));
    let mut encoded = String::new();
    reserve_encoded(&mut encoded, capacity_hint, &name)?;
    let mut total_read: u64 = 0;
    let mut last_percent: Option<u8> = None;

    log::debug!(
        "📂 开始编码 {}（声明 {} 字节，分块 {} 字节）",
        name,
        declared_len,
        chunk_size
    );

    loop {
        let n = fill_buffer(reader.as_mut(), &mut buf)
            .map_err(|e| ConvertError::Read(format!("读取 {} 失败：{}", name, e)))?;
        if n == 0 {
            break;
        }

        total_read += n as u64;
        if total_read > config.max_file_size {
            return Err(too_large(total_read, config.max_file_size));
        }

        reserve_encoded(&mut encoded, n as u64, &name)?;
        general_purpose::STANDARD.encode_string(&buf[..n], &mut encoded);

        // 读取阶段未结束前封顶 99，100 只在完成时上报一次。
        let percent = if declared_len == 0 {
            0
        } else {
            (total_read.saturating_mul(100) / declared_len).min(99) as u8
        };
        if last_percent.is_none_or(|last| percent > last) {
            last_percent = Some(percent);
            on_progress(percent, &format!("正在读取 {}：{}%", name, percent));
        }
    }

    on_progress(100, &format!("{} 编码完成", name));

    let size = format_size(total_read);
    let data = if options.data_url {
        to_data_url(&mime_type, &encoded)
    } else {
        encoded
    };

    log::info!(
        "✅ 文件编码完成 - {} {} total={}ms",
        name,
        size,
        start.elapsed().as_millis()
    );

    Ok(EncodeOutput {
        data,
        size,
        mime_type,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::other("device unplugged"));
            }
            self.served = true;
            buf[0] = 42;
            Ok(1)
        }
    }

    fn config_with(read_chunk: usize, max: u64) -> ConverterConfig {
        ConverterConfig {
            read_chunk_size: read_chunk,
            max_file_size: max,
            ..ConverterConfig::default()
        }
    }

    #[test]
    fn encodes_in_chunks_matching_single_pass_output() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let source = BinarySource::from_bytes("data.bin", "application/octet-stream", data.clone());
        let mut progress = Vec::new();

        let out = encode(
            source,
            &EncodeOptions::default(),
            &config_with(300, 1 << 20),
            &mut |p, _| progress.push(p),
        )
        .expect("encode should succeed");

        assert_eq!(out.data, general_purpose::STANDARD.encode(&data));
        assert_eq!(out.size.raw_bytes, 10_000);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.iter().any(|p| *p > 0 && *p < 100));
    }

    #[test]
    fn rejects_oversized_source_before_reading() {
        let source =
            BinarySource::from_bytes("big.bin", "application/octet-stream", vec![0u8; 1025]);
        let mut calls = 0;
        let result = encode(
            source,
            &EncodeOptions::default(),
            &config_with(300, 1024),
            &mut |_, _| calls += 1,
        );

        assert!(matches!(result, Err(ConvertError::TooLarge { .. })));
        assert_eq!(calls, 0);
    }

    #[test]
    fn accepts_source_exactly_at_limit() {
        let source =
            BinarySource::from_bytes("edge.bin", "application/octet-stream", vec![7u8; 1024]);
        let out = encode(
            source,
            &EncodeOptions::default(),
            &config_with(300, 1024),
            &mut |_, _| {},
        )
        .expect("limit is inclusive");
        assert_eq!(out.size.raw_bytes, 1024);
    }

    #[test]
    fn rejects_reader_that_exceeds_declared_length() {
        let source = BinarySource::from_reader(
            "liar.bin",
            "application/octet-stream",
            10,
            std::io::repeat(1).take(5000),
        );
        let result = encode(
            source,
            &EncodeOptions::default(),
            &config_with(300, 1024),
            &mut |_, _| {},
        );
        assert!(matches!(result, Err(ConvertError::TooLarge { .. })));
    }

    #[test]
    fn huge_declared_length_over_empty_reader_is_not_preallocated() {
        let limit = crate::config::MAX_FILE_SIZE_LIMIT;
        let mut progress = Vec::new();
        let source = BinarySource::from_reader(
            "stream.bin",
            "application/octet-stream",
            limit,
            std::io::empty(),
        );
        let out = encode(
            source,
            &EncodeOptions::default(),
            &config_with(300, limit),
            &mut |p, _| progress.push(p),
        )
        .expect("empty stream encodes");

        assert_eq!(out.data, "");
        assert_eq!(out.size.raw_bytes, 0);
        assert_eq!(progress, vec![100]);
    }

    #[test]
    fn declared_length_beyond_any_limit_is_rejected_before_reading() {
        let mut config = ConverterConfig::default();
        config.apply_settings(&serde_json::json!({ "maxFileSize": u64::MAX }));
        assert!(config.validate().is_ok());

        let source = BinarySource::from_reader(
            "stream.bin",
            "application/octet-stream",
            1 << 61,
            std::io::empty(),
        );
        let mut calls = 0;
        let result = encode(source, &EncodeOptions::default(), &config, &mut |_, _| calls += 1);

        assert!(matches!(result, Err(ConvertError::TooLarge { .. })));
        assert_eq!(calls, 0);
    }

    #[test]
    fn rejects_wrong_type_for_image_tool() {
        let source = BinarySource::from_bytes("doc.pdf", "application/pdf", vec![1u8, 2, 3]);
        let result = encode(
            source,
            &EncodeOptions::data_url().expecting("image"),
            &ConverterConfig::default(),
            &mut |_, _| {},
        );
        assert!(matches!(result, Err(ConvertError::WrongType { .. })));
    }

    #[test]
    fn read_failure_surfaces_read_error() {
        let reader = FailingReader { served: false };
        let source = BinarySource::from_reader("flaky.bin", "image/png", 100, reader);
        let result = encode(
            source,
            &EncodeOptions::default(),
            &config_with(3, 1024),
            &mut |_, _| {},
        );
        assert!(matches!(result, Err(ConvertError::Read(_))));
    }

    #[test]
    fn empty_source_reports_single_completion() {
        let source = BinarySource::from_bytes("empty.png", "image/png", Vec::new());
        let mut progress = Vec::new();
        let out = encode(
            source,
            &EncodeOptions::data_url(),
            &ConverterConfig::default(),
            &mut |p, _| progress.push(p),
        )
        .expect("empty encode");

        assert_eq!(out.data, "data:image/png;base64,");
        assert_eq!(progress, vec![100]);
    }

    #[test]
    fn mime_category_matching() {
        assert!(mime_matches("image", "image/png"));
        assert!(mime_matches("image/*", "IMAGE/JPEG"));
        assert!(mime_matches("application/pdf", "application/pdf; version=1.7"));
        assert!(mime_matches("*", "anything/else"));
        assert!(!mime_matches("image", "application/pdf"));
        assert!(!mime_matches("application/pdf", "application/json"));
        assert!(!mime_matches("image", "imagery"));
    }
}
