// Service exports
pub mod memory;
pub mod postgres;
pub mod store;
pub mod telegram;
pub mod transport;

pub use memory::{MemoryConversationStore, MemoryProfileStore};
pub use postgres::PostgresClient;
pub use store::{ConversationStore, ProfileStore, StoreError};
pub use telegram::TelegramClient;
pub use transport::{deliver_all, LogTransport, Transport, TransportError};
