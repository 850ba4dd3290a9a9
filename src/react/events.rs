//! 处理过程事件：供前端实时展示步数、工具调用、观察结果与拦截情况

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 第几次模型往返
    StepUpdate { step: usize, max_steps: usize },
    /// 正在等待模型
    Thinking,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        tool: String,
        success: bool,
        preview: String,
    },
    /// 重复输出防护拦截了一次调用
    Blocked { tool: String },
    /// 从文本中恢复出工具调用
    SelfHealed { tool: String },
    /// 最终回复已产生
    MessageDone,
    Error { text: String },
}
