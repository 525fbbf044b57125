use anyhow::{ensure, Context, Result};
use geo::MultiPolygon;
use tracing::{debug, warn};

use super::{collection::{ImageCollection, YearWindow}, grid::Raster, mask::clip};

/// Saturation value of the DMSP-OLS stable-lights band.
pub const DMSP_MAX_DN: f64 = 63.0;

/// Clamp to `[0, max_dn]` and rescale into `[0, 1]`; missing pixels stay missing.
pub fn normalize_light(raw: &Raster, max_dn: f64) -> Result<Raster> {
    ensure!(max_dn > 0.0 && max_dn.is_finite(), "[normalize] max_dn must be positive, got {max_dn}");
    Ok(raw.map(|v| v.clamp(0.0, max_dn) / max_dn))
}

/// Mean composite of the observations inside `window`.
/// With none inside, every pixel is missing on the collection's grid.
pub fn composite_vegetation(collection: &ImageCollection, window: &YearWindow) -> Result<Raster> {
    let in_window = collection.filter_window(window);
    if !in_window.is_empty() {
        debug!("[normalize] compositing {} vegetation observations for {window}", in_window.len());
        return in_window.mean_composite();
    }

    let first = collection.observations().first()
        .with_context(|| format!("[normalize] no vegetation observations at all (window {window})"))?;
    warn!("[normalize] no vegetation observations in {window}; vegetation layer is empty");
    Ok(first.raster.map(|_| f64::NAN))
}

/// Both analysis layers, clipped to the region of interest.
#[derive(Debug, Clone)]
pub struct NormalizedLayers {
    pub light: Raster,
    pub vegetation: Raster,
}

/// Build the light and vegetation layers for one year.
pub fn normalize(
    raw_light: &Raster,
    vegetation: &ImageCollection,
    region: &MultiPolygon<f64>,
    window: &YearWindow,
    max_dn: f64,
) -> Result<NormalizedLayers> {
    let light = clip(&normalize_light(raw_light, max_dn)?, region)
        .context("[normalize] clipping light layer")?;
    let vegetation = clip(&composite_vegetation(vegetation, window)?, region)
        .context("[normalize] clipping vegetation layer")?;

    debug!("[normalize] {window}: {} light pixels, {} vegetation pixels inside the region",
        light.valid_count(), vegetation.valid_count());
    Ok(NormalizedLayers { light, vegetation })
}
