//! # 后台任务模块（worker）
//!
//! ## 设计思路
//!
//! 把分块编解码放到独立的后台线程执行，调用方只通过消息与之交互：
//!
//! ```text
//! TaskManager ──WorkerRequest──▶ [base64-worker 线程] CodecWorker
//!      ▲                                   │
//!      └──── progress / result / error ────┘
//! ```
//!
//! - `protocol`：双向消息的形状与任务 ID
//! - `backend`：后台侧的消息处理器（可注入）
//! - `channel`：调用侧的状态机、在途任务表与超时

mod backend;
mod channel;
mod protocol;

pub use backend::{BackendFactory, CodecWorker, WorkerBackend, WorkerFault, WorkerPort};
pub use channel::{ChannelState, ProgressCallback, TaskChannel};
pub use protocol::{
    Action, ConversionResult, ConversionSuccess, RequestData, TaskId, WORKER_NOT_AVAILABLE,
    WorkerMessage, WorkerRequest, generate_task_id,
};
