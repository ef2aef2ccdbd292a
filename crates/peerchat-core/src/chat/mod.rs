//! Conversation engine: storage, the reply simulator, the optional message
//! log, and the `Session` that ties them together.

pub mod log;
pub mod session;
pub mod simulator;
pub mod store;

pub use log::{MemoryMessageLog, MessageLog, NullMessageLog};
pub use session::{Session, SessionSnapshot};
pub use simulator::{ReplyPlan, ReplySimulator, ReplySink};
pub use store::{ConversationSnapshot, ConversationStore};
