use proc_macro::TokenStream;

mod event_payload;
mod utils;

/// 类型化事件载荷宏
/// - 合并/追加派生：Debug, Clone, Serialize, Deserialize
/// - 自动实现 `::pulse_engine::event::EventPayload`
/// - 参数：`#[event_payload(event_type = "...", category = "...")]`，
///   `event_type` 缺省为结构体名，`category` 缺省沿用 trait 默认值
#[proc_macro_attribute]
pub fn event_payload(attr: TokenStream, item: TokenStream) -> TokenStream {
    event_payload::expand(attr, item)
}
