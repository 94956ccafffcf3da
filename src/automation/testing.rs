//! Test doubles for the actuator, capturer and recognizer seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::automation::config::{Point, Region, Rgb};
use crate::automation::input::InputActuator;
use crate::capture::ScreenCapturer;
use crate::error::{ActuatorError, RecognitionError};
use crate::ocr::{OcrLine, TextRecognizer};

/// Recorded actuator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Move(Point),
    Click(Point, bool),
}

/// Records actions instead of injecting them.
#[derive(Default)]
pub struct MockActuator {
    pub actions: Mutex<Vec<Action>>,
    pub pixel: Mutex<Rgb>,
    pub cursor: Mutex<Point>,
    /// Fail the n-th click (1-based); 0 = never
    pub fail_click_at: AtomicUsize,
    pub fail_pixel: AtomicBool,
    pub emergency: AtomicBool,
    clicks: AtomicUsize,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pixel(color: Rgb) -> Self {
        let mock = Self::default();
        *mock.pixel.lock().unwrap() = color;
        mock
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| match a {
                Action::Click(p, _) => Some(*p),
                Action::Move(_) => None,
            })
            .collect()
    }

    pub fn engage_emergency(&self) {
        self.emergency.store(true, Ordering::SeqCst);
    }
}

impl InputActuator for MockActuator {
    fn move_to(&self, point: Point) -> Result<(), ActuatorError> {
        self.actions.lock().unwrap().push(Action::Move(point));
        Ok(())
    }

    fn click(&self, point: Point, double: bool) -> Result<(), ActuatorError> {
        let n = self.clicks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_click_at.load(Ordering::SeqCst) == n {
            return Err(ActuatorError::Injection("access denied".to_string()));
        }
        self.actions.lock().unwrap().push(Action::Click(point, double));
        Ok(())
    }

    fn read_pixel(&self, point: Point) -> Result<Rgb, ActuatorError> {
        if self.fail_pixel.load(Ordering::SeqCst) {
            return Err(ActuatorError::PixelRead {
                x: point.x,
                y: point.y,
                reason: "mock failure".to_string(),
            });
        }
        Ok(*self.pixel.lock().unwrap())
    }

    fn cursor_position(&self) -> Result<Point, ActuatorError> {
        Ok(*self.cursor.lock().unwrap())
    }

    fn emergency_stop_engaged(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }
}

/// Returns a blank image of the requested size.
#[derive(Default)]
pub struct StaticCapturer {
    pub captures: AtomicUsize,
}

impl ScreenCapturer for StaticCapturer {
    fn capture(&self, region: &Region) -> Result<RgbaImage, RecognitionError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(ImageBuffer::from_pixel(
            region.width,
            region.height,
            Rgba([0, 0, 0, 255]),
        ))
    }
}

/// Plays back scripted recognition results, then repeats `fallback`.
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Result<Vec<String>, String>>>,
    fallback: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<Result<Vec<&str>, &str>>, fallback: &[&str]) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| {
                        r.map(|lines| lines.iter().map(|s| s.to_string()).collect())
                            .map_err(|e| e.to_string())
                    })
                    .collect(),
            ),
            fallback: fallback.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns the same lines.
    pub fn always(lines: &[&str]) -> Self {
        Self::new(Vec::new(), lines)
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<OcrLine>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let lines = match next {
            Some(Ok(lines)) => lines,
            Some(Err(e)) => return Err(RecognitionError::Engine(e)),
            None => self.fallback.clone(),
        };
        Ok(lines.iter().map(|l| OcrLine::new(l, 90.0)).collect())
    }
}

/// Blocks inside every call and records how many calls overlap.
pub struct SlowRecognizer {
    delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowRecognizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for SlowRecognizer {
    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<OcrLine>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}
