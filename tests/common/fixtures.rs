use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fhedigit::{Classification, ClassifierClient, ClassifierError, NormalizedVector, PixelBuffer};
use image::Rgba;
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use tokio::sync::Notify;

pub const CANVAS_SIZE: u32 = 280;
pub const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Route the crate's `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A cleared 280x280 drawing surface
pub fn blank_canvas() -> PixelBuffer {
    PixelBuffer::blank(CANVAS_SIZE, CANVAS_SIZE)
}

/// Solid black square of side `size` centered on (`cx`, `cy`)
pub fn canvas_with_square(cx: i32, cy: i32, size: u32) -> PixelBuffer {
    let mut canvas = blank_canvas();
    let half = size as i32 / 2;
    draw_filled_rect_mut(
        canvas.as_image_mut(),
        Rect::at(cx - half, cy - half).of_size(size, size),
        INK,
    );
    canvas
}

/// Round-capped pen stroke through `points`, 15 units wide like the drawing surface
pub fn canvas_with_stroke(points: &[(i32, i32)]) -> PixelBuffer {
    let mut canvas = blank_canvas();
    let radius = 7;
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
        for i in 0..=steps {
            let x = x0 + (x1 - x0) * i / steps;
            let y = y0 + (y1 - y0) * i / steps;
            draw_filled_circle_mut(canvas.as_image_mut(), (x, y), radius, INK);
        }
    }
    canvas
}

/// A "7": top bar and a diagonal down to the bottom left
pub fn canvas_with_seven() -> PixelBuffer {
    canvas_with_stroke(&[(80, 70), (200, 70), (120, 220)])
}

/// Pipeline config with the default (simulated) stage delays
pub fn test_config() -> fhedigit::PipelineConfig {
    fhedigit::PipelineConfig::default()
}

#[derive(Debug, Clone)]
pub enum MockReply {
    Answer { label: u32, confidence: Option<f32> },
    Transport(&'static str),
    Service { status: u16, detail: &'static str },
}

/// Classifier double that always gives the same reply
#[derive(Debug)]
pub struct MockClassifier {
    reply: MockReply,
    calls: Arc<AtomicUsize>,
}

impl MockClassifier {
    pub fn answering(label: u32, confidence: Option<f32>) -> Self {
        Self::with_reply(MockReply::Answer { label, confidence })
    }

    pub fn failing_transport(message: &'static str) -> Self {
        Self::with_reply(MockReply::Transport(message))
    }

    pub fn failing_service(status: u16, detail: &'static str) -> Self {
        Self::with_reply(MockReply::Service { status, detail })
    }

    fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `classify` calls, readable after the mock is moved
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ClassifierClient for MockClassifier {
    async fn classify(&self, vector: &NormalizedVector) -> Result<Classification, ClassifierError> {
        assert_eq!(vector.len(), 784, "classifier must receive a full vector");
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            MockReply::Answer { label, confidence } => Ok(Classification {
                label: *label,
                confidence: *confidence,
            }),
            MockReply::Transport(message) => Err(ClassifierError::Transport((*message).into())),
            MockReply::Service { status, detail } => Err(ClassifierError::Service {
                status: *status,
                detail: detail.to_string(),
            }),
        }
    }
}

/// Classifier that holds every request until the test releases it
#[derive(Debug, Default)]
pub struct GatedClassifier {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
    pub label: u32,
}

impl ClassifierClient for GatedClassifier {
    async fn classify(&self, _vector: &NormalizedVector) -> Result<Classification, ClassifierError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Classification {
            label: self.label,
            confidence: Some(88.0),
        })
    }
}
