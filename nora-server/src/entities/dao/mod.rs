pub mod conversation;
pub mod message;
pub mod saved_chat;
pub mod user;

pub use conversation::Conversation;
pub use message::StoredMessage;
pub use saved_chat::SavedChat;
pub use user::UserRecord;
