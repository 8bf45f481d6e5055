//! Binary inclusion mask from a categorical land-cover time series

use crate::geometry::Region;
use crate::io::CategoricalSource;
use crate::raster::{Band, Raster};
use crate::types::{CarbonResult, DateRange, Grid, PixelValue};
use std::collections::BTreeMap;

pub const COVER_MASK_BAND: &str = "cover_mask";

/// Keeps pixels whose most frequent class over time is the target class
#[derive(Debug, Clone, Copy)]
pub struct CoverMaskBuilder {
    target_class: u16,
}

impl CoverMaskBuilder {
    pub fn new(target_class: u16) -> Self {
        Self { target_class }
    }

    pub fn target_class(&self) -> u16 {
        self.target_class
    }

    /// Fetch the series from `source` and build the mask on `grid`
    pub fn from_source(
        &self,
        source: &dyn CategoricalSource,
        region: &Region,
        range: &DateRange,
        grid: &Grid,
    ) -> CarbonResult<Band> {
        let series = source.fetch(region, range)?;
        self.build(&series, grid)
    }

    /// Mask band: 1 where the mode equals the target class, 0 elsewhere,
    /// invalid where no period has an observation.
    ///
    /// An empty series gives an all-invalid mask on `grid`.
    pub fn build(&self, series: &[Raster], grid: &Grid) -> CarbonResult<Band> {
        if series.is_empty() {
            log::warn!(
                "No land cover coverage; mask for class {} is empty",
                self.target_class
            );
            return Ok(Band::invalid(COVER_MASK_BAND, grid.shape()));
        }
        for period in series {
            grid.ensure_same(period.grid())?;
        }

        let modes = mode_composite(series)?;
        let target = self.target_class;
        let mask = Band::from_fn(COVER_MASK_BAND, grid.shape(), |row, col| {
            let class = modes.value(row, col)?;
            Some(if class as u16 == target { 1.0 } else { 0.0 })
        });
        log::info!(
            "Cover mask keeps {} of {} observed pixel(s) (class {}, {} period(s))",
            mask.data.iter().filter(|&&v| v == 1.0).count(),
            mask.valid_count(),
            target,
            series.len()
        );
        Ok(mask)
    }
}

/// Per-pixel most frequent class over the first band of each period.
///
/// Values are rounded to the nearest class id; values outside the u16
/// range count as missing. Ties go to the lowest class id.
pub fn mode_composite(series: &[Raster]) -> CarbonResult<Band> {
    let layers: Vec<&Band> = series
        .iter()
        .map(|r| r.first_band())
        .collect::<CarbonResult<_>>()?;
    let shape = match layers.first() {
        Some(band) => band.dim(),
        None => (0, 0),
    };

    Ok(Band::from_fn("mode", shape, |row, col| {
        let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
        for layer in &layers {
            if let Some(class) = layer.value(row, col).and_then(class_id) {
                *counts.entry(class).or_default() += 1;
            }
        }
        let mut best: Option<(u16, usize)> = None;
        for (class, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((class, count));
            }
        }
        best.map(|(class, _)| class as PixelValue)
    }))
}

fn class_id(value: PixelValue) -> Option<u16> {
    let rounded = value.round();
    if (0.0..=f32::from(u16::MAX)).contains(&rounded) {
        Some(rounded as u16)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::Array2;

    fn grid() -> Grid {
        Grid::new(1, 4, GeoTransform::north_up(0.0, 1.0, 1.0), "EPSG:4326")
    }

    fn period(values: [f32; 4]) -> Raster {
        let data = Array2::from_shape_vec((1, 4), values.to_vec()).unwrap();
        Raster::single(grid(), Band::from_data("label", data)).unwrap()
    }

    #[test]
    fn mode_with_lowest_id_tie_break() {
        let series = vec![
            period([1.0, 2.0, 5.0, f32::NAN]),
            period([1.0, 1.0, 3.0, f32::NAN]),
            period([4.0, 2.0, 5.0, f32::NAN]),
            period([1.0, 1.0, 3.0, f32::NAN]),
        ];
        let modes = mode_composite(&series).unwrap();
        assert_eq!(modes.value(0, 0), Some(1.0));
        // 1 and 2 both appear twice
        assert_eq!(modes.value(0, 1), Some(1.0));
        assert_eq!(modes.value(0, 2), Some(3.0));
        assert_eq!(modes.value(0, 3), None);
    }

    #[test]
    fn mask_marks_target_class() {
        let series = vec![period([1.0, 0.0, 1.0, f32::NAN])];
        let mask = CoverMaskBuilder::new(1).build(&series, &grid()).unwrap();
        assert_eq!(mask.name, COVER_MASK_BAND);
        assert_eq!(mask.value(0, 0), Some(1.0));
        assert_eq!(mask.value(0, 1), Some(0.0));
        assert_eq!(mask.value(0, 2), Some(1.0));
        assert_eq!(mask.value(0, 3), None);
    }

    #[test]
    fn empty_series_is_all_invalid() {
        let mask = CoverMaskBuilder::new(1).build(&[], &grid()).unwrap();
        assert_eq!(mask.dim(), (1, 4));
        assert_eq!(mask.valid_count(), 0);
    }

    #[test]
    fn series_on_another_grid_fails() {
        let other = Grid::new(1, 4, GeoTransform::north_up(5.0, 1.0, 1.0), "EPSG:4326");
        let series = vec![period([1.0; 4])];
        assert!(CoverMaskBuilder::new(1).build(&series, &other).is_err());
    }
}
