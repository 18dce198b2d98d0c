pub mod messages;
pub mod oracle;
pub mod traits;
pub mod user_state;
pub mod wallet;
