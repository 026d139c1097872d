//! Built-in adapters.

pub mod http;
pub mod notification;
pub mod transform;
pub mod trigger;

pub use http::HttpRequestAdapter;
pub use notification::{
    Notification, NotificationSink, RecordingSink, SendNotificationAdapter, TracingSink,
};
pub use transform::TransformAdapter;
pub use trigger::ManualTriggerAdapter;
