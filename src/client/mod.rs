//! Client-side coordination on top of the platform: session, presence,
//! conversation list, user search and the live message channel.

mod channel;
mod conversations;
mod notify;
mod presence;
mod search;
mod session;

pub use channel::MessageChannel;
pub use conversations::{Conversations, Resolved, fetch_conversations, resolve};
pub use notify::{LogNotifier, Notification, Notifier};
pub use presence::PresenceTracker;
pub use search::{DEFAULT_SEARCH_LIMIT, search_users};
pub use session::{SessionState, SessionStore};
