use anyhow::{ensure, Result};
use geo::{BoundingRect, MultiPolygon, Polygon};
use ndarray::{parallel::prelude::*, Array2, Axis};

use super::{grid::Raster, transform::GeoTransform};

/// X-intervals where the horizontal line at `y` lies inside `polygon` (even-odd over all rings).
pub(crate) fn scanline_spans(polygon: &Polygon<f64>, y: f64) -> Vec<(f64, f64)> {
    let mut crossings: Vec<f64> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .flat_map(|ring| ring.lines())
        .filter(|line| (line.start.y > y) != (line.end.y > y))
        .map(|line| {
            let (a, b) = (line.start, line.end);
            a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y)
        })
        .collect();
    crossings.sort_by(f64::total_cmp);
    crossings.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Cells of a `rows` × `cols` north-up grid whose centers fall inside `region`.
pub fn polygon_mask(rows: usize, cols: usize, transform: &GeoTransform, region: &MultiPolygon<f64>) -> Result<Array2<bool>> {
    ensure!(transform.is_north_up() && transform.pixel_width > 0.0,
        "[mask] only north-up rasters can be masked");

    let polygons: Vec<(&Polygon<f64>, f64, f64)> = region.0.iter()
        .filter_map(|p| p.bounding_rect().map(|r| (p, r.min().y, r.max().y)))
        .collect();

    let mut mask = Array2::from_elem((rows, cols), false);
    mask.axis_iter_mut(Axis(0)).into_par_iter().enumerate().for_each(|(row, mut line)| {
        let (_, y) = transform.pixel_to_geo(0, row);
        for &(polygon, min_y, max_y) in &polygons {
            if y < min_y || y > max_y { continue }
            for (x0, x1) in scanline_spans(polygon, y) {
                // first / one-past-last column whose center lies in [x0, x1)
                let start = ((x0 - transform.origin_x) / transform.pixel_width - 0.5).ceil().max(0.0) as usize;
                let end = ((x1 - transform.origin_x) / transform.pixel_width - 0.5).ceil().max(0.0) as usize;
                for col in start..end.min(cols) {
                    line[col] = true;
                }
            }
        }
    });

    Ok(mask)
}

/// Copy of `raster` with every pixel outside `region` set to NaN.
pub fn clip(raster: &Raster, region: &MultiPolygon<f64>) -> Result<Raster> {
    let mask = polygon_mask(raster.rows(), raster.cols(), raster.transform(), region)?;
    let mut clipped = raster.clone();
    ndarray::Zip::from(clipped.data_mut()).and(&mask).for_each(|v, &inside| {
        if !inside { *v = f64::NAN }
    });
    Ok(clipped)
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    #[test]
    fn spans_respect_holes() {
        let donut = Polygon::new(
            geo::LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![geo::LineString::from(vec![(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0)])],
        );
        assert_eq!(scanline_spans(&donut, 5.0), vec![(0.0, 4.0), (6.0, 10.0)]);
        assert_eq!(scanline_spans(&donut, 2.0), vec![(0.0, 10.0)]);
        assert!(scanline_spans(&donut, 11.0).is_empty());
    }

    #[test]
    fn mask_and_clip_triangle() {
        // 4x4 unit cells, origin at (0, 4)
        let gt = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        let tri = MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)]]);

        let mask = polygon_mask(4, 4, &gt, &tri).unwrap();
        // bottom row (y = 0.5) covers centers x < 3.5
        assert_eq!(mask.row(3).to_vec(), vec![true, true, true, false]);
        assert_eq!(mask.row(2).to_vec(), vec![true, true, false, false]);
        // top row (y = 3.5) ends exactly at the first center, which is excluded
        assert_eq!(mask.row(0).to_vec(), vec![false; 4]);

        let raster = Raster::filled(4, 4, 7.0, gt, None);
        let clipped = clip(&raster, &tri).unwrap();
        assert_eq!(clipped.valid_count(), 3 + 2 + 1);
        assert!(clipped.data()[[0, 3]].is_nan());
    }

    #[test]
    fn rotated_grid_rejected() {
        let gt = GeoTransform::from_gdal([0.0, 1.0, 0.5, 0.0, 0.0, -1.0]);
        assert!(polygon_mask(2, 2, &gt, &MultiPolygon(vec![])).is_err());
    }
}
