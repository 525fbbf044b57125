mod geoms;
mod io;
mod layer;
mod metric;
mod unit_id;
mod unit_type;

pub use geoms::Geometries;
pub use layer::UnitLayer;
pub use metric::MetricFrame;
pub use unit_id::UnitId;
pub use unit_type::UnitType;
