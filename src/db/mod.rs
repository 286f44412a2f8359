pub mod clipboards;
pub mod pastes;
pub mod pool;
pub mod rooms;
pub mod users;

pub use clipboards::*;
pub use pastes::*;
pub use pool::*;
pub use rooms::*;
pub use users::*;
