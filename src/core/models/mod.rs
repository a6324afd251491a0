mod calendar;
mod chat;
mod directory;
mod message;
mod notification;
mod role;

pub use calendar::{CalendarEvent, EventKind, EventUpdate, NewCalendarEvent};
pub use chat::{Chat, ChatKind};
pub use directory::{Organization, User};
pub use message::{Mention, MentionKind, Message, SenderKind};
pub use notification::{DeliveryStatus, NotificationChannel, NotificationLog};
pub use role::{AgentType, Role};

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
