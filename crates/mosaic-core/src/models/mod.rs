pub mod conversation;
pub mod message;
pub mod message_store;
pub mod notification_store;
pub mod session;

pub use conversation::{Conversation, PLACEHOLDER_TITLE, now_millis};
pub use message::{Message, MessageId, Part, Role};
pub use message_store::MessageStore;
pub use notification_store::{Notice, NoticeLevel, NotificationStore};
pub use session::{
    ChatSession, ImageMeta, MAX_INLINE_IMAGE_BYTES, MessageRenderer, NullRenderer, history_digest,
    parse_image_data_url,
};
