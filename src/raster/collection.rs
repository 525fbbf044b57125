use std::fmt;

use anyhow::{bail, ensure, Result};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, Zip};

use super::grid::Raster;

/// A calendar year, Jan 1 through Dec 31 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearWindow {
    year: i32,
}

impl YearWindow {
    pub fn new(year: i32) -> Self { Self { year } }

    #[inline] pub fn year(&self) -> i32 { self.year }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year
    }
}

impl fmt::Display for YearWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.year)
    }
}

/// One timestamped image.
#[derive(Debug, Clone)]
pub struct Observation {
    pub date: NaiveDate,
    pub raster: Raster,
}

/// Timestamped images of one quantity, all on the same grid.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    observations: Vec<Observation>,
}

impl ImageCollection {
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        let mut collection = Self::default();
        for observation in observations {
            collection.push(observation)?;
        }
        Ok(collection)
    }

    /// Add an image; its grid must match the images already held.
    pub fn push(&mut self, observation: Observation) -> Result<()> {
        if let Some(first) = self.observations.first() {
            ensure!(first.raster.same_grid(&observation.raster),
                "[collection] observation of {} is on a different grid than {}", observation.date, first.date);
        }
        self.observations.push(observation);
        Ok(())
    }

    #[inline] pub fn len(&self) -> usize { self.observations.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.observations.is_empty() }

    #[inline] pub fn observations(&self) -> &[Observation] { &self.observations }

    /// Observations dated within `window`.
    pub fn filter_window(&self, window: &YearWindow) -> ImageCollection {
        ImageCollection {
            observations: self.observations.iter()
                .filter(|o| window.contains(o.date))
                .cloned()
                .collect(),
        }
    }

    /// Per-pixel mean over the observations with data at that pixel; NaN where none do.
    pub fn mean_composite(&self) -> Result<Raster> {
        let Some(first) = self.observations.first() else {
            bail!("[collection] cannot composite an empty collection");
        };

        let shape = first.raster.data().dim();
        let mut sum = Array2::<f64>::zeros(shape);
        let mut count = Array2::<u32>::zeros(shape);
        for observation in &self.observations {
            Zip::from(&mut sum).and(&mut count).and(observation.raster.data())
                .for_each(|s, c, &v| if !v.is_nan() { *s += v; *c += 1 });
        }

        let mean = Zip::from(&sum).and(&count)
            .map_collect(|&s, &c| if c == 0 { f64::NAN } else { s / c as f64 });
        Ok(Raster::new(mean, *first.raster.transform(), first.raster.epsg()))
    }
}
