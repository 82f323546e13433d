pub mod dashboard;
pub mod frame;
pub mod identity;
pub mod notification;
pub mod vehicle;

pub use dashboard::*;
pub use frame::*;
pub use identity::*;
pub use notification::*;
pub use vehicle::*;
