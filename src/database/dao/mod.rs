//! 数据访问对象

pub mod conversations;
pub mod initiated;

pub use conversations::ConversationDao;
pub use initiated::InitiatedDao;
