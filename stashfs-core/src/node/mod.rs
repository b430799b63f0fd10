pub mod placement;
pub mod service;

pub use placement::{HeadroomPlacement, PlacementStrategy};
pub use service::StorageNodeService;
