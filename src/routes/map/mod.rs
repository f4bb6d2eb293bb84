mod handler;
mod model;

pub use handler::{get_map, map_events, report_position, shell};
pub use model::PositionAccepted;
