//! Multi-band rasters with per-band validity masks
//!
//! A [`Raster`] is value-like: every transform returns a new raster and
//! leaves its input untouched. All bands share the raster's [`Grid`].
//! Invalid pixels store `0.0` so rasters always serialise to plain JSON;
//! the validity mask, never the stored value, decides whether a pixel counts.

use crate::dataset::FeatureSchema;
use crate::geometry::Polygon;
use crate::parallel::*;
use crate::types::{CarbonError, CarbonResult, Grid, PixelValue};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// One named layer of a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub data: Array2<PixelValue>,
    pub valid: Array2<bool>,
}

impl Band {
    /// Build a band; non-finite values are marked invalid.
    pub fn new(
        name: impl Into<String>,
        mut data: Array2<PixelValue>,
        mut valid: Array2<bool>,
    ) -> CarbonResult<Self> {
        let name = name.into();
        if data.dim() != valid.dim() {
            return Err(CarbonError::GridMismatch(format!(
                "band '{}' data {:?} vs mask {:?}",
                name,
                data.dim(),
                valid.dim()
            )));
        }
        Zip::from(&mut data).and(&mut valid).for_each(|v, ok| {
            if !*ok || !v.is_finite() {
                *ok = false;
                *v = 0.0;
            }
        });
        Ok(Self { name, data, valid })
    }

    /// Band whose validity is "value is finite"
    pub fn from_data(name: impl Into<String>, data: Array2<PixelValue>) -> Self {
        let valid = data.mapv(|v| v.is_finite());
        let mut data = data;
        data.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
        Self {
            name: name.into(),
            data,
            valid,
        }
    }

    /// Band with every pixel invalid
    pub fn invalid(name: impl Into<String>, shape: (usize, usize)) -> Self {
        Self {
            name: name.into(),
            data: Array2::zeros(shape),
            valid: Array2::from_elem(shape, false),
        }
    }

    /// Evaluate `f` per pixel; `None` marks the pixel invalid.
    /// Rows are computed independently (in parallel with the `parallel` feature).
    pub fn from_fn<F>(name: impl Into<String>, shape: (usize, usize), f: F) -> Self
    where
        F: Fn(usize, usize) -> Option<PixelValue> + Send + Sync,
    {
        let (rows, cols) = shape;
        let values: Vec<Option<PixelValue>> = (0..rows)
            .into_par_iter()
            .flat_map(|row| (0..cols).map(|col| f(row, col)).collect::<Vec<_>>())
            .collect();

        let mut data = Array2::<PixelValue>::zeros(shape);
        let mut valid = Array2::from_elem(shape, false);
        for (idx, value) in values.into_iter().enumerate() {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                let (r, c) = (idx / cols, idx % cols);
                data[[r, c]] = v;
                valid[[r, c]] = true;
            }
        }
        Self {
            name: name.into(),
            data,
            valid,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }

    #[inline]
    pub fn value(&self, row: usize, col: usize) -> Option<PixelValue> {
        if self.valid[[row, col]] {
            Some(self.data[[row, col]])
        } else {
            None
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// An immutable grid of one or more named bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    grid: Grid,
    bands: Vec<Band>,
}

impl Raster {
    pub fn new(grid: Grid, bands: Vec<Band>) -> CarbonResult<Self> {
        for (i, band) in bands.iter().enumerate() {
            if band.dim() != grid.shape() {
                return Err(CarbonError::GridMismatch(format!(
                    "band '{}' is {:?}, grid is {:?}",
                    band.name,
                    band.dim(),
                    grid.shape()
                )));
            }
            if bands[..i].iter().any(|b| b.name == band.name) {
                return Err(CarbonError::Processing(format!(
                    "duplicate band name '{}'",
                    band.name
                )));
            }
        }
        Ok(Self { grid, bands })
    }

    pub fn single(grid: Grid, band: Band) -> CarbonResult<Self> {
        Self::new(grid, vec![band])
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.band_names())
    }

    pub fn band(&self, name: &str) -> CarbonResult<&Band> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| CarbonError::MissingBand(name.to_string()))
    }

    /// First band; rasters are never empty once built by this crate
    pub fn first_band(&self) -> CarbonResult<&Band> {
        self.bands
            .first()
            .ok_or_else(|| CarbonError::MissingBand("<first>".to_string()))
    }

    /// True when the pixel is valid in every band
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        !self.bands.is_empty() && self.bands.iter().all(|b| b.is_valid(row, col))
    }

    /// Combined validity across all bands
    pub fn valid_mask(&self) -> Array2<bool> {
        let mut mask = Array2::from_elem(self.shape(), !self.bands.is_empty());
        for band in &self.bands {
            Zip::from(&mut mask).and(&band.valid).for_each(|m, &v| *m = *m && v);
        }
        mask
    }

    pub fn valid_count(&self) -> usize {
        self.valid_mask().iter().filter(|&&v| v).count()
    }

    /// Band values at a pixel in band order, `None` if any band is invalid
    pub fn pixel_vector(&self, row: usize, col: usize) -> Option<Vec<f64>> {
        if self.bands.is_empty() {
            return None;
        }
        self.bands
            .iter()
            .map(|b| b.value(row, col).map(f64::from))
            .collect()
    }

    /// Bands in the requested order
    pub fn select(&self, names: &[String]) -> CarbonResult<Raster> {
        let bands = names
            .iter()
            .map(|n| self.band(n).cloned())
            .collect::<CarbonResult<Vec<_>>>()?;
        Raster::new(self.grid.clone(), bands)
    }

    /// Rename bands positionally
    pub fn rename(&self, names: &[String]) -> CarbonResult<Raster> {
        if names.len() != self.bands.len() {
            return Err(CarbonError::Processing(format!(
                "rename needs {} names, got {}",
                self.bands.len(),
                names.len()
            )));
        }
        let bands = self
            .bands
            .iter()
            .zip(names)
            .map(|(b, n)| b.clone().renamed(n.clone()))
            .collect();
        Raster::new(self.grid.clone(), bands)
    }

    /// Concatenate the bands of `other` after ours
    pub fn add_bands(&self, other: &Raster) -> CarbonResult<Raster> {
        self.grid.ensure_same(&other.grid)?;
        let mut bands = self.bands.clone();
        bands.extend(other.bands.iter().cloned());
        Raster::new(self.grid.clone(), bands)
    }

    pub fn with_band(&self, band: Band) -> CarbonResult<Raster> {
        let mut bands = self.bands.clone();
        bands.push(band);
        Raster::new(self.grid.clone(), bands)
    }

    /// Invalidate pixels where `mask` is invalid or zero
    pub fn update_mask(&self, mask: &Band) -> CarbonResult<Raster> {
        if mask.dim() != self.shape() {
            return Err(CarbonError::GridMismatch(format!(
                "mask is {:?}, raster is {:?}",
                mask.dim(),
                self.shape()
            )));
        }
        let keep = Zip::from(&mask.data)
            .and(&mask.valid)
            .map_collect(|&v, &ok| ok && v != 0.0);
        Ok(self.retain(&keep))
    }

    /// Invalidate pixels whose centre lies outside the polygon
    pub fn clip(&self, polygon: &Polygon) -> Raster {
        let transform = self.grid.transform;
        let keep = Array2::from_shape_fn(self.shape(), |(r, c)| {
            polygon.contains(transform.pixel_center(r, c))
        });
        self.retain(&keep)
    }

    fn retain(&self, keep: &Array2<bool>) -> Raster {
        let bands = self
            .bands
            .iter()
            .map(|b| {
                let mut band = b.clone();
                Zip::from(&mut band.valid)
                    .and(&mut band.data)
                    .and(keep)
                    .for_each(|ok, v, &k| {
                        if !k {
                            *ok = false;
                            *v = 0.0;
                        }
                    });
                band
            })
            .collect();
        Raster {
            grid: self.grid.clone(),
            bands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;

    fn grid(rows: usize, cols: usize) -> Grid {
        Grid::new(rows, cols, GeoTransform::north_up(0.0, rows as f64, 1.0), "EPSG:4326")
    }

    #[test]
    fn non_finite_values_become_invalid() {
        let data = Array2::from_shape_vec((1, 3), vec![1.0, f32::NAN, f32::INFINITY]).unwrap();
        let band = Band::from_data("b", data);
        assert_eq!(band.valid_count(), 1);
        assert_eq!(band.value(0, 1), None);
        assert_eq!(band.data[[0, 2]], 0.0);
    }

    #[test]
    fn duplicate_band_names_rejected() {
        let g = grid(2, 2);
        let a = Band::from_data("x", Array2::zeros((2, 2)));
        let b = Band::from_data("x", Array2::ones((2, 2)));
        assert!(Raster::new(g, vec![a, b]).is_err());
    }

    #[test]
    fn update_mask_drops_zero_and_invalid_pixels() {
        let g = grid(1, 3);
        let raster = Raster::single(g, Band::from_data("x", Array2::ones((1, 3)))).unwrap();
        let mut mask = Band::from_data(
            "m",
            Array2::from_shape_vec((1, 3), vec![1.0, 0.0, 1.0]).unwrap(),
        );
        mask.valid[[0, 2]] = false;
        let masked = raster.update_mask(&mask).unwrap();
        assert!(masked.is_valid(0, 0));
        assert!(!masked.is_valid(0, 1));
        assert!(!masked.is_valid(0, 2));
        // input untouched
        assert_eq!(raster.valid_count(), 3);
    }

    #[test]
    fn clip_uses_pixel_centres() {
        let g = grid(2, 2);
        let raster = Raster::single(g, Band::from_data("x", Array2::ones((2, 2)))).unwrap();
        // covers only the top-left pixel centre (0.5, 1.5)
        let clipped = raster.clip(&Polygon::rectangle(0.0, 1.0, 1.0, 2.0));
        assert_eq!(clipped.valid_count(), 1);
        assert!(clipped.is_valid(0, 0));
    }

    #[test]
    fn pixel_vector_requires_all_bands() {
        let g = grid(1, 2);
        let a = Band::from_data("a", Array2::from_elem((1, 2), 2.0));
        let b = Band::from_data(
            "b",
            Array2::from_shape_vec((1, 2), vec![3.0, f32::NAN]).unwrap(),
        );
        let raster = Raster::new(g, vec![a, b]).unwrap();
        assert_eq!(raster.pixel_vector(0, 0), Some(vec![2.0, 3.0]));
        assert_eq!(raster.pixel_vector(0, 1), None);
    }

    #[test]
    fn from_fn_marks_none_invalid() {
        let band = Band::from_fn("f", (2, 2), |r, c| if r == c { Some(1.0) } else { None });
        assert_eq!(band.valid_count(), 2);
        assert!(band.is_valid(1, 1));
        assert!(!band.is_valid(0, 1));
    }
}
