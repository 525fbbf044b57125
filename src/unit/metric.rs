use anyhow::{anyhow, Context, Result};
use geo::Coord;
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// A lon/lat ⇄ UTM pair used to sample geographic layers on a metric grid.
pub struct MetricFrame {
    geog: Proj4,
    utm: Proj4,
    utm_string: String,
}

impl MetricFrame {
    /// Build PROJ.4 string for the source geographic CRS (degrees → radians handled in code).
    #[inline]
    fn geog_proj4(epsg: u32) -> &'static str {
        match epsg {
            4269 | 4937 => "+proj=longlat +datum=NAD83 +no_defs +type=crs",
            4267        => "+proj=longlat +datum=NAD27 +no_defs +type=crs",
            _           => "+proj=longlat +datum=WGS84 +no_defs +type=crs",
        }
    }

    /// UTM zone for a lon/lat center.
    /// - WGS84: north / south
    /// - NAD83: north only; if south, fall back to WGS84 UTM-S
    fn utm_proj4(center: Coord<f64>, epsg: u32) -> String {
        let zone = (((center.x + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u32;
        let north = center.y >= 0.0;
        let datum = if matches!(epsg, 4269 | 4937) && north { "NAD83" } else { "WGS84" };
        let south = if north { "" } else { " +south" };

        format!("+proj=utm +zone={zone}{south} +datum={datum} +units=m +no_defs +type=crs")
    }

    /// Frame for the UTM zone containing `center` (lon/lat degrees).
    pub fn for_center(center: Coord<f64>, epsg: u32) -> Result<Self> {
        let geog = {
            let proj_string = Self::geog_proj4(epsg);
            Proj4::from_proj_string(proj_string)
                .with_context(|| anyhow!("[metric] failed to build source PROJ.4: {proj_string}"))?
        };

        let utm_string = Self::utm_proj4(center, epsg);
        let utm = Proj4::from_proj_string(&utm_string)
            .with_context(|| anyhow!("[metric] failed to build target PROJ.4: {utm_string}"))?;

        Ok(Self { geog, utm, utm_string })
    }

    #[inline] pub fn proj_string(&self) -> &str { &self.utm_string }

    /// Degrees in, meters out.
    pub fn to_metric(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(&self.geog, &self.utm, &mut point)
            .map_err(|e| anyhow!("[metric] forward transform failed at ({}, {}): {e:?}", coord.x, coord.y))?;
        Ok(Coord { x: point.0, y: point.1 })
    }

    /// Meters in, degrees out.
    pub fn to_geog(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = (coord.x, coord.y, 0.0);
        transform(&self.utm, &self.geog, &mut point)
            .map_err(|e| anyhow!("[metric] inverse transform failed at ({}, {}): {e:?}", coord.x, coord.y))?;
        Ok(Coord { x: point.0.to_degrees(), y: point.1.to_degrees() })
    }
}
