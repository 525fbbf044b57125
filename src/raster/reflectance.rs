use anyhow::{ensure, Result};
use ndarray::Zip;

use super::grid::Raster;

/// NDVI of a reflectance composite: `(nir - red) / (nir + red)`.
/// Pixels where the product of `quality` bands is zero are masked out,
/// as are pixels with a zero denominator.
pub fn reflectance_ndvi(nir: &Raster, red: &Raster, quality: &[&Raster]) -> Result<Raster> {
    ensure!(nir.same_grid(red), "[reflectance] NIR and red bands are on different grids");
    for band in quality {
        ensure!(nir.same_grid(band), "[reflectance] quality band is on a different grid");
    }

    let mut ndvi = Zip::from(nir.data()).and(red.data())
        .map_collect(|&n, &r| {
            let sum = n + r;
            if sum == 0.0 { f64::NAN } else { (n - r) / sum }
        });

    for band in quality {
        Zip::from(&mut ndvi).and(band.data()).for_each(|v, &q| if q == 0.0 { *v = f64::NAN });
    }

    Ok(Raster::new(ndvi, *nir.transform(), nir.epsg()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::raster::GeoTransform;
    use super::*;

    fn band(values: Vec<f64>) -> Raster {
        Raster::from_vec(values, 1, 4, GeoTransform::default(), None).unwrap()
    }

    #[test]
    fn masks_bad_pixels() {
        let nir = band(vec![0.5, 0.3, 0.0, 0.4]);
        let red = band(vec![0.1, 0.3, 0.0, 0.2]);
        let blue = band(vec![0.1, 0.1, 0.1, 0.0]);
        let swir = band(vec![0.2, 0.2, 0.2, 0.2]);

        let ndvi = reflectance_ndvi(&nir, &red, &[&blue, &swir]).unwrap();
        let v = ndvi.data();
        assert_relative_eq!(v[[0, 0]], 0.4 / 0.6);
        assert_eq!(v[[0, 1]], 0.0);
        assert!(v[[0, 2]].is_nan()); // zero denominator
        assert!(v[[0, 3]].is_nan()); // zero in a quality band
    }

    #[test]
    fn bands_must_align() {
        let nir = band(vec![0.5; 4]);
        let red = Raster::filled(2, 2, 0.1, GeoTransform::default(), None);
        assert!(reflectance_ndvi(&nir, &red, &[]).is_err());
    }
}
