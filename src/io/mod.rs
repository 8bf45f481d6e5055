//! Collaborator interfaces, retrieval guards and backends

pub mod sources;
pub mod retrieval;
pub mod memory;
pub mod catalog;
#[cfg(feature = "gdal")]
pub mod gdal_export;

pub use sources::{
    BoundarySource, CategoricalSource, ExportRequest, ExportSink, LabelSource, LandCoverPeriod,
    Scene, SceneSource, TerrainSource,
};
pub use retrieval::{CancellationToken, Retriever};
pub use memory::{MemoryCatalog, MemorySink};
pub use catalog::{DirectoryCatalog, ExportedRaster, JsonExportSink};
#[cfg(feature = "gdal")]
pub use gdal_export::GdalExportSink;
