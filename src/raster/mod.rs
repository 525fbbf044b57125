mod collection;
mod grid;
mod io;
mod mask;
mod normalize;
mod reflectance;
mod transform;

pub use collection::{ImageCollection, Observation, YearWindow};
pub use grid::Raster;
pub use io::{read_geotiff, write_geotiff};
pub use mask::{clip, polygon_mask};
pub(crate) use mask::scanline_spans;
pub use normalize::{composite_vegetation, normalize, normalize_light, NormalizedLayers, DMSP_MAX_DN};
pub use reflectance::reflectance_ndvi;
pub use transform::GeoTransform;
