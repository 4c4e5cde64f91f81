//! # 分块编解码模块（codec）
//!
//! ## 设计思路
//!
//! 只包含纯函数，不感知线程与消息通道，便于单独测试：
//!
//! - `size`：字节数 → 人类可读体积
//! - `data_url`：Data URL / 纯 Base64 的显式解析
//! - `decode`：分片解码 + 进度上报
//! - `source`：类文件数据源
//! - `encode`：增量读取编码 + 体积 / 类型校验
//! - `validate`：Base64 图片校验
//!
//! ## 实现思路
//!
//! 进度通过 `ProgressFn` 回调同步上报；由后台 worker 负责把回调转成 `progress` 消息。
//! 分块大小来自 `ConverterConfig`，不是协议的一部分。

mod data_url;
mod decode;
mod encode;
mod size;
mod source;
mod validate;

pub use data_url::{Base64Payload, DEFAULT_MIME_TYPE, is_base64_alphabet, to_data_url};
pub use decode::{Blob, DecodeOutput, decode};
pub use encode::{EncodeOptions, EncodeOutput, encode, mime_matches};
pub use size::{SizeInfo, format_size};
pub use source::BinarySource;
pub use validate::{IMAGE_MIME_TYPES, ValidationReport, validate_base64_image};

/// 进度回调：`(百分比 0..=100, 阶段描述)`。
pub type ProgressFn<'a> = dyn FnMut(u8, &str) + 'a;
