//! # Base64 工作台 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      调用方 (UI 组件)                      │
//! │                                                          │
//! │   TaskManager::file_to_base64 / base64_to_blob /         │
//! │               validate_base64_image / destroy            │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ WorkerRequest ⇄ progress / result / error
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后台线程 (base64-worker)               │
//! │                                                          │
//! │  ┌─ worker ─────── 消息协议 · 通道状态机 · 超时           │
//! │  │                                                       │
//! │  ├─ codec ──────── 分块编解码 · Data URL · 图片校验       │
//! │  │   ├─ size       字节数 → 人类可读体积                  │
//! │  │   └─ source     类文件数据源 (内存 / 路径)             │
//! │  │                                                       │
//! │  ├─ config         分块大小 · 体积上限 · 超时             │
//! │  └─ error          统一错误类型 ConvertError              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `ConvertError` 与可序列化错误码 `ErrorKind` |
//! | [`config`] | 可调参数 `ConverterConfig`：默认值、区间校验、设置覆盖 |
//! | [`codec`] | 纯函数分块编解码、Data URL 解析、体积格式化、图片校验 |
//! | [`worker`] | 后台线程、消息协议、在途任务表与超时 |
//! | [`task_manager`] | 调用侧门面 `TaskManager`：懒加载、降级、销毁 |

pub mod codec;
pub mod config;
pub mod error;
pub mod task_manager;
pub mod worker;

pub use codec::{BinarySource, Blob, EncodeOptions, SizeInfo, ValidationReport, format_size};
pub use config::ConverterConfig;
pub use error::{ConvertError, ErrorKind};
pub use task_manager::TaskManager;
pub use worker::{ChannelState, ConversionResult, ConversionSuccess, ProgressCallback};
