pub mod dispatcher;
pub mod native_push;
pub mod payload;
pub mod subscription_store;
pub mod web_push_sender;

pub use dispatcher::Dispatcher;
pub use native_push::NativePushSender;
pub use subscription_store::{InMemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore};
pub use web_push_sender::WebPushSender;
