pub mod category;
pub mod item;
pub mod notification;
pub mod subscription;

pub use category::*;
pub use item::*;
pub use notification::*;
pub use subscription::*;
