pub mod location;
pub mod map;

pub use location::{
    JoinedLocationRow, LocationRecord, LocationRow, PeerLocation, ProfileRef, UNKNOWN_USER,
};
pub use map::{MapFrame, MapSnapshot, Marker};
