use anyhow::Result;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Context available to all pipeline steps
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    fn active_debug(&self) -> Option<&DebugConfig> {
        self.debug.as_ref().filter(|d| d.enabled)
    }
}

/// Trait that all image pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform one image into the next stage's image
    fn process(&self, image: RgbImage, context: &PipelineContext) -> Result<RgbImage>;

    /// Human-readable name for this step (used in logs and debug directories)
    fn name(&self) -> &str;
}

/// Composable image pipeline builder
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every step at info level instead of debug
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order. `item` numbers the debug images of a batch.
    pub fn run(&self, input: RgbImage, item: usize) -> Result<RgbImage> {
        self.run_partial(input, item, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, input: RgbImage, item: usize, num_steps: usize) -> Result<RgbImage> {
        self.save_debug(&input, "00_input", item)?;

        let mut image = input;
        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            if self.context.verbose {
                tracing::info!(step = step.name(), item, "running preprocessing step");
            } else {
                tracing::debug!(step = step.name(), item, "running preprocessing step");
            }

            image = step.process(image, &self.context)?;

            let step_dir = format!(
                "{:02}_{}",
                step_idx + 1,
                step.name().to_lowercase().replace(' ', "_")
            );
            self.save_debug(&image, &step_dir, item)?;
        }

        Ok(image)
    }

    fn save_debug(&self, image: &RgbImage, step_dir: &str, item: usize) -> Result<()> {
        let Some(debug_config) = self.context.active_debug() else {
            return Ok(());
        };

        let dir = debug_config.output_dir.join(step_dir);
        std::fs::create_dir_all(&dir)?;
        let filename = format!("{:02}.png", item + 1);
        image
            .save(dir.join(&filename))
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;

        tracing::debug!("saved debug image {}/{}", step_dir, filename);
        Ok(())
    }
}
