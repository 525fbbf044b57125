use anyhow::{ensure, Result};
use ndarray::Array2;

use super::transform::GeoTransform;

/// A single-band georeferenced grid; NaN marks missing data.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    data: Array2<f64>, // (rows, cols)
    transform: GeoTransform,
    epsg: Option<u32>,
}

impl Raster {
    pub fn new(data: Array2<f64>, transform: GeoTransform, epsg: Option<u32>) -> Self {
        Self { data, transform, epsg }
    }

    /// Grid of `rows` × `cols` filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: f64, transform: GeoTransform, epsg: Option<u32>) -> Self {
        Self::new(Array2::from_elem((rows, cols), value), transform, epsg)
    }

    /// Row-major values into a grid.
    pub fn from_vec(values: Vec<f64>, rows: usize, cols: usize, transform: GeoTransform, epsg: Option<u32>) -> Result<Self> {
        ensure!(values.len() == rows * cols,
            "[raster] {} values do not fill a {rows}x{cols} grid", values.len());
        Ok(Self::new(Array2::from_shape_vec((rows, cols), values)?, transform, epsg))
    }

    #[inline] pub fn data(&self) -> &Array2<f64> { &self.data }

    #[inline] pub fn data_mut(&mut self) -> &mut Array2<f64> { &mut self.data }

    #[inline] pub fn transform(&self) -> &GeoTransform { &self.transform }

    #[inline] pub fn epsg(&self) -> Option<u32> { self.epsg }

    #[inline] pub fn rows(&self) -> usize { self.data.nrows() }

    #[inline] pub fn cols(&self) -> usize { self.data.ncols() }

    #[inline] pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// `[min_x, min_y, max_x, max_y]` in map units.
    pub fn bounds(&self) -> [f64; 4] {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Value of the pixel containing map point `(x, y)`; `None` outside the grid or on missing data.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !(col >= 0.0 && row >= 0.0) { return None }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        self.data.get((row, col)).copied().filter(|v| !v.is_nan())
    }

    /// Whether both rasters share shape and transform.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.data.dim() == other.data.dim() && self.transform.approx_eq(&other.transform)
    }

    /// Same grid, values mapped element-wise.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Raster {
        Raster::new(self.data.mapv(f), self.transform, self.epsg)
    }

    /// Number of non-NaN pixels.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}
