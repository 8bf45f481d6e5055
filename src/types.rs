use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pixel value type used for every raster band
pub type PixelValue = f32;

/// Metres per degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A location in map coordinates (longitude/latitude for geographic grids)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lon, self.lat)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Smallest box enclosing all points; `None` for an empty slice
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_lon: first.lon,
            max_lon: first.lon,
            min_lat: first.lat,
            max_lat: first.lat,
        };
        for p in &points[1..] {
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.max_lon = bbox.max_lon.max(p.lon);
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
        }
        Some(bbox)
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// Affine transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> GeoPoint {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        GeoPoint {
            lon: self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            lat: self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        }
    }

    /// Isotropic pixel size in map units (mean of |width| and |height|)
    pub fn pixel_size(&self) -> f64 {
        (self.pixel_width.abs() + self.pixel_height.abs()) / 2.0
    }
}

/// Shared grid geometry of every band in a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    /// Coordinate reference system, e.g. "EPSG:4326"
    pub crs: String,
}

impl Grid {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, crs: impl Into<String>) -> Self {
        Self {
            rows,
            cols,
            transform,
            crs: crs.into(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_geographic(&self) -> bool {
        self.crs.eq_ignore_ascii_case("EPSG:4326")
    }

    /// Pixel size in metres; degrees are converted along the meridian
    pub fn ground_pixel_size(&self) -> f64 {
        let size = self.transform.pixel_size();
        if self.is_geographic() {
            size * METERS_PER_DEGREE
        } else {
            size
        }
    }

    /// Extent covered by the pixel centres
    pub fn bounding_box(&self) -> BoundingBox {
        let corners = [
            self.transform.pixel_center(0, 0),
            self.transform.pixel_center(0, self.cols.saturating_sub(1)),
            self.transform.pixel_center(self.rows.saturating_sub(1), 0),
            self.transform
                .pixel_center(self.rows.saturating_sub(1), self.cols.saturating_sub(1)),
        ];
        // corners is never empty
        BoundingBox::from_points(&corners).unwrap_or(BoundingBox {
            min_lon: 0.0,
            max_lon: 0.0,
            min_lat: 0.0,
            max_lat: 0.0,
        })
    }

    /// Error unless `other` has identical geometry
    pub fn ensure_same(&self, other: &Grid) -> CarbonResult<()> {
        if self == other {
            Ok(())
        } else {
            Err(CarbonError::GridMismatch(format!(
                "{}x{} {} vs {}x{} {}",
                self.rows, self.cols, self.crs, other.rows, other.cols, other.crs
            )))
        }
    }
}

/// Half-open acquisition window [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Error types for carbon stock estimation
#[derive(Debug, thiserror::Error)]
pub enum CarbonError {
    #[error("No region contains point ({lon}, {lat})")]
    NoRegionFound { lon: f64, lat: f64 },

    #[error("No scenes available for {range} below {cloud_threshold}% cloud cover")]
    NoScenesAvailable { range: DateRange, cloud_threshold: f32 },

    #[error("Retrieval of {what} timed out after {timeout:?}")]
    RetrievalTimeout { what: String, timeout: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Insufficient data: need at least {required} samples, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Degenerate fit: {0}")]
    DegenerateFit(String),

    #[error("No location is valid in both prediction and reference")]
    NoOverlap,

    #[error("Feature schema mismatch: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for carbon stock operations
pub type CarbonResult<T> = Result<T, CarbonError>;
