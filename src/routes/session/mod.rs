mod handler;
mod model;

pub use handler::{get_session, login, logout};
pub use model::{LogoutResponse, SessionInfo};
