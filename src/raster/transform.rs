use serde::{Deserialize, Serialize};

/// Affine pixel ⇄ map transform:
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
/// North-up images have no rotation and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform from the upper-left corner and cell sizes.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self { origin_x, origin_y, pixel_width, pixel_height, row_rotation: 0.0, col_rotation: 0.0 }
    }

    /// From GDAL order `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self { origin_x: c[0], pixel_width: c[1], row_rotation: c[2], origin_y: c[3], col_rotation: c[4], pixel_height: c[5] }
    }

    /// Map coordinates of a pixel center.
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_geo_f(col as f64 + 0.5, row as f64 + 0.5)
    }

    fn pixel_to_geo_f(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates `(col, row)` of a map point; NaN for a degenerate transform.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 { return (f64::NAN, f64::NAN) }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        (
            (self.pixel_height * dx - self.row_rotation * dy) / det,
            (-self.col_rotation * dx + self.pixel_width * dy) / det,
        )
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-12 && self.col_rotation.abs() < 1e-12 && self.pixel_height < 0.0
    }

    /// `[min_x, min_y, max_x, max_y]` covered by a `width` × `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> [f64; 4] {
        let corners = [
            self.pixel_to_geo_f(0.0, 0.0),
            self.pixel_to_geo_f(width as f64, 0.0),
            self.pixel_to_geo_f(0.0, height as f64),
            self.pixel_to_geo_f(width as f64, height as f64),
        ];
        corners.iter().fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |[x0, y0, x1, y1], &(x, y)| [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        )
    }

    /// Equal within a tolerance relative to the cell size.
    pub fn approx_eq(&self, other: &Self) -> bool {
        let tol = 1e-9 * self.pixel_width.abs().max(self.pixel_height.abs()).max(1.0);
        [
            (self.origin_x, other.origin_x),
            (self.origin_y, other.origin_y),
            (self.pixel_width, other.pixel_width),
            (self.pixel_height, other.pixel_height),
            (self.row_rotation, other.row_rotation),
            (self.col_rotation, other.col_rotation),
        ].iter().all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for GeoTransform {
    fn default() -> Self { Self::new(0.0, 0.0, 1.0, -1.0) }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn pixel_geo_round_trip() {
        let gt = GeoTransform::new(-124.0, 42.0, 0.5, -0.25);
        let (x, y) = gt.pixel_to_geo(2, 4);
        assert_relative_eq!(x, -122.75);
        assert_relative_eq!(y, 40.875);

        let (col, row) = gt.geo_to_pixel(x, y);
        assert_relative_eq!(col, 2.5);
        assert_relative_eq!(row, 4.5);
    }

    #[test]
    fn bounds_of_grid() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        assert_eq!(gt.bounds(3, 2), [100.0, 180.0, 130.0, 200.0]);
        assert!(gt.is_north_up());
        assert!(!GeoTransform::from_gdal([0.0, 1.0, 0.1, 0.0, 0.0, -1.0]).is_north_up());
    }
}
