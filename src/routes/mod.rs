pub mod map;
pub mod session;
