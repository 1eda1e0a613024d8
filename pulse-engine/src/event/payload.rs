use serde::Serialize;
use serde::de::DeserializeOwned;

/// 类型化事件载荷
///
/// 为某个事件类型约定载荷结构。`Event` 本身以 `serde_json::Value` 承载载荷，
/// 未建模的数据可以直接使用 `Value`；已建模的事件通过本 trait 在发射与处理两端
/// 进行类型化转换（见 `Event::from_payload` 与 `Event::payload_as`）。
///
/// 通常由 `#[event_payload]` 宏生成实现。
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync {
    /// 事件类型（处理器据此匹配）
    const EVENT_TYPE: &'static str;

    /// 事件分类
    const CATEGORY: &'static str = super::DEFAULT_CATEGORY;
}
