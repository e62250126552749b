use anyhow::anyhow;
use image::{ImageBuffer, Rgb, RgbImage};
use ripeness::models::BoundingBox;
use ripeness::{
    ClassNames, Config, Detection, InferenceParams, ModelRuntime, Point, RawDetection,
    RipenessClassifier, RipenessStage,
};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use time::OffsetDateTime;

/// Runtime returning canned frames, one per inference call.
/// Calls whose index is listed in `fail_on` return an error instead.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    pub class_names: Option<ClassNames>,
    pub frames: Vec<Vec<RawDetection>>,
    pub fail_on: Vec<usize>,
    calls: usize,
}

impl FakeRuntime {
    pub fn with_frames(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn single(frame: Vec<RawDetection>) -> Self {
        Self::with_frames(vec![frame])
    }

    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on.push(call);
        self
    }

    pub fn with_class_names(mut self, names: &[(u32, &str)]) -> Self {
        self.class_names = Some(
            names
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        );
        self
    }
}

impl ModelRuntime for FakeRuntime {
    fn class_names(&self) -> Option<ClassNames> {
        self.class_names.clone()
    }

    fn infer(&mut self, _image: &RgbImage, _params: &InferenceParams) -> anyhow::Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on.contains(&call) {
            return Err(anyhow!("runtime error on call {}", call));
        }
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.frames[call % self.frames.len()].clone())
    }
}

/// Loader handing out a fresh copy of `runtime`
pub fn loader_for(runtime: FakeRuntime) -> impl Fn(&Path) -> anyhow::Result<Box<dyn ModelRuntime>> {
    move |_: &Path| Ok(Box::new(runtime.clone()) as Box<dyn ModelRuntime>)
}

/// A throwaway weights file; its digest becomes the model version
pub fn weights_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp weights file");
    file.write_all(b"fake ripeness weights")
        .expect("Failed to write temp weights file");
    file
}

/// Default config pointing at `weights`
pub fn test_config(weights: &Path) -> Config {
    Config::default().with_weights_path(weights)
}

/// Ready classifier backed by `runtime`. Keep the temp file alive with it.
pub fn ready_classifier(runtime: FakeRuntime) -> (RipenessClassifier, NamedTempFile) {
    let weights = weights_file();
    let classifier = RipenessClassifier::new(test_config(weights.path()), &loader_for(runtime))
        .expect("Failed to build classifier");
    (classifier, weights)
}

/// Uniform mid-grey image
pub fn grey_image(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |_, _| Rgb([128u8, 128u8, 128u8]))
}

/// Box-only raw detection with top-left corner (x, y)
pub fn raw_box(class_id: u32, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> RawDetection {
    RawDetection::new(
        class_id,
        confidence,
        ripeness::CenterBox {
            cx: x + w / 2.0,
            cy: y + h / 2.0,
            w,
            h,
        },
    )
}

pub fn square(x: f32, y: f32, size: f32) -> Vec<Point> {
    vec![
        Point::new(x, y),
        Point::new(x + size, y),
        Point::new(x + size, y + size),
        Point::new(x, y + size),
    ]
}

/// Regular polygon approximating a circle
pub fn circle(cx: f32, cy: f32, radius: f32, points: usize) -> Vec<Point> {
    (0..points)
        .map(|i| {
            let angle = i as f32 / points as f32 * std::f32::consts::TAU;
            Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

/// Accepted detection built directly, for aggregation and monitor tests
pub fn make_detection(category: RipenessStage, confidence: f32, quality_score: f32) -> Detection {
    let polygon = square(0.0, 0.0, 100.0);
    Detection {
        category,
        class_name: category.display_name(),
        confidence,
        polygon,
        bbox: BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        },
        area: 10_000.0,
        centroid: Point::new(50.0, 50.0),
        quality_score,
        timestamp: OffsetDateTime::now_utc(),
    }
}
