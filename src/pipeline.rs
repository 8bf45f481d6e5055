//! End-to-end run: Resolve → Composite → Mask → Sample → Split → Train →
//! Predict → Validate → Export.
//!
//! The first failing stage aborts the run and is reported together with the
//! input it was working on. Nothing is exported unless every earlier stage
//! succeeded, and every export request is checked by the sink before the
//! first write. A write failing part way through discards what the run had
//! already written.

use crate::config::PipelineConfig;
use crate::core::{
    compare_rasters, region, validate_raster, CoverMaskBuilder, DatasetSplitter, FeatureCompositor,
    Model, Predictor, Sampler, ValidationResult,
};
use crate::dataset::FeatureSchema;
use crate::geometry::Region;
use crate::io::{
    BoundarySource, CancellationToken, CategoricalSource, ExportRequest, ExportSink, LabelSource,
    Retriever, SceneSource, TerrainSource,
};
use crate::raster::{Band, Raster};
use crate::types::{CarbonError, CarbonResult};
use std::sync::Arc;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Composite,
    Mask,
    Sample,
    Split,
    Train,
    Predict,
    Validate,
    Export,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolve => "region resolution",
            Stage::Composite => "feature compositing",
            Stage::Mask => "cover masking",
            Stage::Sample => "sampling",
            Stage::Split => "splitting",
            Stage::Train => "training",
            Stage::Predict => "prediction",
            Stage::Validate => "validation",
            Stage::Export => "export",
        };
        write!(f, "{}", name)
    }
}

/// A run aborted at `stage` while processing `input`
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for {input}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub input: String,
    #[source]
    pub source: CarbonError,
}

fn fail(stage: Stage, input: &str) -> impl FnOnce(CarbonError) -> PipelineError + '_ {
    move |source| {
        log::error!("{} failed for {}: {}", stage, input, source);
        PipelineError {
            stage,
            input: input.to_string(),
            source,
        }
    }
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub region: Region,
    pub schema: FeatureSchema,
    pub sample_count: usize,
    pub train_count: usize,
    pub test_count: usize,
    pub model: Model,
    pub prediction: Raster,
    /// Model against the held-out split
    pub validation: ValidationResult,
    /// Prediction against the masked reference raster, when they overlap
    pub reference_validation: Option<ValidationResult>,
    /// Destinations handed to the export sink
    pub exported: Vec<String>,
}

pub struct Pipeline {
    config: PipelineConfig,
    boundaries: Arc<dyn BoundarySource>,
    scenes: Arc<dyn SceneSource>,
    land_cover: Arc<dyn CategoricalSource>,
    labels: Arc<dyn LabelSource>,
    terrain: Option<Arc<dyn TerrainSource>>,
    sink: Option<Arc<dyn ExportSink>>,
    retriever: Retriever,
}

impl Pipeline {
    /// Validates `config` and sets up the retrieval runtime
    pub fn new(
        config: PipelineConfig,
        boundaries: Arc<dyn BoundarySource>,
        scenes: Arc<dyn SceneSource>,
        land_cover: Arc<dyn CategoricalSource>,
        labels: Arc<dyn LabelSource>,
    ) -> CarbonResult<Self> {
        config.validate()?;
        let retriever = Retriever::new(config.retrieval_timeout())?;
        Ok(Self {
            config,
            boundaries,
            scenes,
            land_cover,
            labels,
            terrain: None,
            sink: None,
            retriever,
        })
    }

    /// One backend serving every source, terrain included
    pub fn from_catalog<C>(config: PipelineConfig, catalog: Arc<C>) -> CarbonResult<Self>
    where
        C: BoundarySource + SceneSource + CategoricalSource + TerrainSource + LabelSource + 'static,
    {
        let pipeline = Self::new(
            config,
            catalog.clone(),
            catalog.clone(),
            catalog.clone(),
            catalog.clone(),
        )?;
        Ok(pipeline.with_terrain(catalog))
    }

    pub fn with_terrain(mut self, terrain: Arc<dyn TerrainSource>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn with_export_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.retriever = self.retriever.with_cancellation(token);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that stops the run before its next retrieval or stage
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.retriever.token()
    }

    /// Execute every stage in order.
    ///
    /// Retrieval blocks on the pipeline's own tokio runtime, so this must be
    /// called from synchronous code. From inside an async runtime wrap it in
    /// `spawn_blocking`; a direct call fails at the first retrieval with
    /// `Processing`.
    pub fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let config = &self.config;

        // Resolve
        let point = config.point;
        let input = point.to_string();
        self.begin(Stage::Resolve, &input)?;
        let boundaries = Arc::clone(&self.boundaries);
        let candidates = self
            .retriever
            .fetch("boundaries", move || boundaries.candidates(point))
            .map_err(fail(Stage::Resolve, &input))?;
        let region = region::resolve(candidates, point).map_err(fail(Stage::Resolve, &input))?;

        // Composite
        let input = format!("region '{}' over {}", region.name, config.date_range);
        self.begin(Stage::Composite, &input)?;
        let compositor = FeatureCompositor::new(config.bands.clone(), config.features.clone());
        let features = self
            .composite(&compositor, &region)
            .map_err(fail(Stage::Composite, &input))?;

        // Mask
        let masked = match &config.cover {
            Some(cover) => {
                let input = format!("land cover class {} in '{}'", cover.target_class, region.name);
                self.begin(Stage::Mask, &input)?;
                let source = Arc::clone(&self.land_cover);
                let (r, range) = (region.clone(), config.date_range);
                let series = self
                    .retriever
                    .fetch("land cover", move || source.fetch(&r, &range))
                    .map_err(fail(Stage::Mask, &input))?;
                let mask = CoverMaskBuilder::new(cover.target_class)
                    .build(&series, features.grid())
                    .map_err(fail(Stage::Mask, &input))?;
                features.update_mask(&mask).map_err(fail(Stage::Mask, &input))?
            }
            None => features,
        };

        // Sample
        let input = format!("reference band '{}'", config.label_band);
        self.begin(Stage::Sample, &input)?;
        let source = Arc::clone(&self.labels);
        let r = region.clone();
        let reference = self
            .retriever
            .fetch("reference", move || source.reference(&r))
            .map_err(fail(Stage::Sample, &input))?;
        let dataset = Sampler::from_config(&config.sampling)
            .sample(&masked, &reference, &config.label_band)
            .map_err(fail(Stage::Sample, &input))?;

        // Split
        let input = format!("{} sample(s)", dataset.len());
        self.begin(Stage::Split, &input)?;
        let split = DatasetSplitter::from_config(&config.split).split(&dataset);

        // Train
        let input = format!("{} training sample(s)", split.train().len());
        self.begin(Stage::Train, &input)?;
        let model = Model::train(split.train(), &config.model).map_err(fail(Stage::Train, &input))?;

        // Predict
        let input = format!("feature stack {}", masked.schema());
        self.begin(Stage::Predict, &input)?;
        let prediction = Predictor::new(&model)
            .clamp_negative(config.clamp_negative)
            .predict(&masked)
            .map_err(fail(Stage::Predict, &input))?;

        // Validate
        let input = format!("{} test sample(s)", split.test().len());
        self.begin(Stage::Validate, &input)?;
        // Scored on the map that gets exported, clamping included
        let validation =
            validate_raster(&prediction, split.test()).map_err(fail(Stage::Validate, &input))?;
        let reference_masked = self
            .masked_reference(&reference, &masked, &region)
            .map_err(fail(Stage::Validate, &input))?;
        let reference_validation = match compare_rasters(&prediction, &reference_masked) {
            Ok(result) => Some(result),
            Err(CarbonError::NoOverlap) => None,
            Err(e) => return Err(fail(Stage::Validate, &input)(e)),
        };

        // Export
        let exported = self.export(&prediction, &reference_masked)?;

        log::info!(
            "Run complete for '{}': {} (test split)",
            region.name,
            validation
        );
        Ok(PipelineOutcome {
            region,
            schema: masked.schema(),
            sample_count: dataset.len(),
            train_count: split.train().len(),
            test_count: split.test().len(),
            model,
            prediction,
            validation,
            reference_validation,
            exported,
        })
    }

    fn begin(&self, stage: Stage, input: &str) -> Result<(), PipelineError> {
        self.retriever.check_cancelled().map_err(fail(stage, input))?;
        log::info!("Stage: {} ({})", stage, input);
        Ok(())
    }

    fn composite(&self, compositor: &FeatureCompositor, region: &Region) -> CarbonResult<Raster> {
        let config = &self.config;
        let source = Arc::clone(&self.scenes);
        let (r, range, threshold) = (region.clone(), config.date_range, config.cloud_threshold);
        let scenes = self
            .retriever
            .fetch("scenes", move || source.fetch(&r, &range, threshold))?;

        let elevation = if compositor.needs_terrain() {
            let terrain = self
                .terrain
                .clone()
                .ok_or_else(|| CarbonError::MissingBand("elevation (no terrain source)".to_string()))?;
            let r = region.clone();
            Some(self.retriever.fetch("elevation", move || terrain.elevation(&r))?)
        } else {
            None
        };
        compositor.compose(region, &config.date_range, config.cloud_threshold, scenes, elevation)
    }

    /// Label band restricted to the pixels the model was applied to
    fn masked_reference(
        &self,
        reference: &Raster,
        features: &Raster,
        region: &Region,
    ) -> CarbonResult<Raster> {
        let label = reference.select(&[self.config.label_band.clone()])?;
        features.grid().ensure_same(label.grid())?;
        let keep = Band::from_data("valid", features.valid_mask().mapv(|v| if v { 1.0 } else { 0.0 }));
        label.clip(&region.polygon).update_mask(&keep)
    }

    fn export(&self, prediction: &Raster, reference: &Raster) -> Result<Vec<String>, PipelineError> {
        let (export, sink) = match (&self.config.export, &self.sink) {
            (Some(export), Some(sink)) => (export, sink),
            (Some(_), None) => {
                log::info!("No export sink configured; skipping export");
                return Ok(Vec::new());
            }
            (None, _) => return Ok(Vec::new()),
        };

        let mut outputs = vec![(export.destination.clone(), prediction)];
        if export.include_reference {
            outputs.push((format!("{}_reference", export.destination), reference));
        }
        let requests: Vec<(ExportRequest, &Raster)> = outputs
            .into_iter()
            .map(|(destination, raster)| {
                let request = ExportRequest {
                    destination,
                    scale: export.scale,
                    crs: export.crs.clone(),
                    format: export.format,
                };
                (request, raster)
            })
            .collect();

        // Every request is checked before the first write
        for (request, raster) in &requests {
            self.begin(Stage::Export, &request.destination)?;
            sink.check(raster, request)
                .map_err(fail(Stage::Export, &request.destination))?;
        }

        let mut exported: Vec<String> = Vec::with_capacity(requests.len());
        for (request, raster) in &requests {
            let written = self
                .begin(Stage::Export, &request.destination)
                .and_then(|_| {
                    sink.write(raster, request)
                        .map_err(fail(Stage::Export, &request.destination))
                });
            if let Err(e) = written {
                rollback(sink.as_ref(), &exported);
                return Err(e);
            }
            log::info!("Exported {} as {} ({})", request.destination, export.format, export.crs);
            exported.push(request.destination.clone());
        }
        Ok(exported)
    }
}

/// Undo the writes of a failed export, newest first
fn rollback(sink: &dyn ExportSink, written: &[String]) {
    for destination in written.iter().rev() {
        match sink.discard(destination) {
            Ok(()) => log::warn!("Discarded partial export {}", destination),
            Err(e) => log::error!("Could not discard partial export {}: {}", destination, e),
        }
    }
}
