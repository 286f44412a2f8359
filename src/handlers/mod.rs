pub mod clipboard;
pub mod diagnostics;
pub mod execute;
pub mod health;
pub mod paste;
pub mod room;
pub mod user;

pub use clipboard::*;
pub use diagnostics::*;
pub use execute::*;
pub use health::*;
pub use paste::*;
pub use room::*;
pub use user::*;
