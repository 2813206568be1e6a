#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::PoseBackend;
use crate::frame::{Frame, BYTES_PER_PIXEL};
use crate::pose::{Arm, BodyLandmark, Landmark, PoseDetection, PoseLandmarks};

/// COCO-17 keypoint order used by single-pose keypoint models (MoveNet).
const COCO_KEYPOINTS: [BodyLandmark; 17] = [
    BodyLandmark::Nose,
    BodyLandmark::LeftEye,
    BodyLandmark::RightEye,
    BodyLandmark::LeftEar,
    BodyLandmark::RightEar,
    BodyLandmark::LeftShoulder,
    BodyLandmark::RightShoulder,
    BodyLandmark::LeftElbow,
    BodyLandmark::RightElbow,
    BodyLandmark::LeftWrist,
    BodyLandmark::RightWrist,
    BodyLandmark::LeftHip,
    BodyLandmark::RightHip,
    BodyLandmark::LeftKnee,
    BodyLandmark::RightKnee,
    BodyLandmark::LeftAnkle,
    BodyLandmark::RightAnkle,
];

/// Tract-based backend for single-person keypoint models in ONNX form.
///
/// Expects input `[1, H, W, 3]` f32 RGB in `0..=255` and output `[1, 1, 17, 3]`
/// holding normalized `(y, x, score)` per COCO keypoint. Frames of any size are
/// nearest-neighbour resampled to the model input. No network I/O; the model is
/// read from disk once.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    score_threshold: f32,
    arm: Arm,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if width == 0 || height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            score_threshold: 0.3,
            arm: Arm::Left,
        })
    }

    /// Mean keypoint score of the tracked arm below which the frame counts as
    /// "no person".
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Arm whose keypoint scores gate detection.
    pub fn with_arm(mut self, arm: Arm) -> Self {
        self.arm = arm;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let resized = resize_frame(frame, self.width, self.height)?;
        let pixels = resized.as_raw();
        let (dst_w, dst_h) = (self.width as usize, self.height as usize);
        let input = tract_ndarray::Array4::from_shape_fn((1, dst_h, dst_w, 3), |(_, y, x, c)| {
            pixels[(y * dst_w + x) * BYTES_PER_PIXEL + c] as f32
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<PoseDetection> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        if values.len() < COCO_KEYPOINTS.len() * 3 {
            return Err(anyhow!(
                "expected at least {} keypoint values, model produced {}",
                COCO_KEYPOINTS.len() * 3,
                values.len()
            ));
        }

        let mut pose = PoseLandmarks::new();
        for (kind, chunk) in COCO_KEYPOINTS.iter().zip(values.chunks_exact(3)) {
            let (y, x, score) = (chunk[0], chunk[1], chunk[2]);
            pose.insert(*kind, Landmark::new(x, y).with_visibility(score));
        }

        let arm_scores: Vec<f32> = self
            .arm
            .joints()
            .iter()
            .filter_map(|kind| pose.get(*kind).and_then(|lm| lm.visibility))
            .collect();
        let mean = arm_scores.iter().sum::<f32>() / arm_scores.len().max(1) as f32;
        if mean < self.score_threshold {
            log::debug!("tract: arm score {:.2} below threshold", mean);
            return Ok(PoseDetection::NotDetected);
        }
        Ok(PoseDetection::Detected(pose))
    }
}

/// Resample a frame to the model input size with a triangle (bilinear) filter.
fn resize_frame(frame: &Frame, width: u32, height: u32) -> Result<RgbImage> {
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!("empty frame"));
    }
    let view: ImageBuffer<Rgb<u8>, &[u8]> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.pixels())
            .context("frame buffer does not match its dimensions")?;
    Ok(imageops::resize(&view, width, height, FilterType::Triangle))
}

impl PoseBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<PoseDetection> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.width, self.height, 0, [0, 0, 0])?;
        self.detect(&blank).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_keeps_solid_color_at_model_size() {
        let frame = Frame::filled(64, 48, 1, [40, 80, 120]).unwrap();
        let resized = resize_frame(&frame, 16, 16).unwrap();
        assert_eq!(resized.dimensions(), (16, 16));
        assert!(resized.pixels().all(|p| p.0 == [40, 80, 120]));
    }

    #[test]
    fn resize_rejects_empty_frame() {
        let frame = Frame::new(0, 0, 1, Vec::new()).unwrap();
        assert!(resize_frame(&frame, 16, 16).is_err());
    }
}
