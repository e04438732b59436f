pub mod messages;
pub mod spot;
pub mod traits;
