//! Frame annotation: skeleton, elbow angle and the REPS/STAGE status box.
//!
//! Drawing goes through `imageproc` on an `image` view over the frame's RGB24
//! bytes, so the capture buffer is annotated in place and clipped at its edges.
//! Styling lives here; the values drawn come from [`FrameReport`].

use ab_glyph::{FontRef, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use crate::counter::Stage;
use crate::frame::Frame;
use crate::pose::{PoseLandmarks, UPPER_BODY_CONNECTIONS};
use crate::session::FrameReport;

const FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

/// Mutable `image` view over a frame's pixel bytes.
type FrameView<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

pub mod colors {
    use image::Rgb;

    pub const STATUS_BOX: Rgb<u8> = Rgb([16, 117, 245]);
    pub const LANDMARK: Rgb<u8> = Rgb([66, 117, 245]);
    pub const CONNECTION: Rgb<u8> = Rgb([230, 66, 245]);
    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
}

/// Status box corners (pixels, inclusive).
pub const STATUS_BOX: (i32, i32, i32, i32) = (0, 0, 225, 73);

const LABEL_SCALE: f32 = 16.0;
const VALUE_SCALE: f32 = 36.0;
const ANGLE_SCALE: f32 = 20.0;
const LANDMARK_RADIUS: i32 = 3;

/// Overlay renderer holding the parsed label font.
pub struct Overlay {
    font: FontRef<'static>,
}

impl Overlay {
    pub fn new() -> Result<Self> {
        let font = FontRef::try_from_slice(FONT_DATA)
            .map_err(|e| anyhow!("invalid overlay font: {}", e))?;
        Ok(Self { font })
    }

    /// Draw the overlay for one processed frame.
    pub fn annotate(
        &self,
        frame: &mut Frame,
        report: &FrameReport,
        landmarks: Option<&PoseLandmarks>,
    ) -> Result<()> {
        let (width, height) = (frame.width, frame.height);
        let mut canvas: FrameView<'_> = ImageBuffer::from_raw(width, height, frame.pixels_mut())
            .context("frame buffer does not match its dimensions")?;

        if let Some(landmarks) = landmarks {
            draw_skeleton(&mut canvas, landmarks);
        }

        if let (Some(angle), Some(elbow)) = (report.angle, report.elbow) {
            let (x, y) = to_pixels(width, height, elbow.x, elbow.y);
            draw_text_mut(
                &mut canvas,
                colors::WHITE,
                x,
                y,
                PxScale::from(ANGLE_SCALE),
                &self.font,
                &format!("{}", angle as i64),
            );
        }

        let (x0, y0, x1, y1) = STATUS_BOX;
        let box_rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
        draw_filled_rect_mut(&mut canvas, box_rect, colors::STATUS_BOX);

        let label = PxScale::from(LABEL_SCALE);
        let value = PxScale::from(VALUE_SCALE);
        draw_text_mut(&mut canvas, colors::BLACK, 15, 5, label, &self.font, "REPS");
        draw_text_mut(
            &mut canvas,
            colors::WHITE,
            10,
            26,
            value,
            &self.font,
            &report.count.to_string(),
        );
        draw_text_mut(&mut canvas, colors::BLACK, 95, 5, label, &self.font, "STAGE");
        draw_text_mut(
            &mut canvas,
            colors::WHITE,
            80,
            26,
            value,
            &self.font,
            stage_label(report.stage),
        );
        Ok(())
    }
}

pub fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Unknown => "-",
        Stage::Down => "DOWN",
        Stage::Up => "UP",
    }
}

/// Normalized coordinates to pixel coordinates for a `width` x `height` frame.
pub fn to_pixels(width: u32, height: u32, x: f64, y: f64) -> (i32, i32) {
    ((x * width as f64) as i32, (y * height as f64) as i32)
}

fn draw_skeleton(canvas: &mut FrameView<'_>, landmarks: &PoseLandmarks) {
    let (width, height) = canvas.dimensions();
    for (from, to) in UPPER_BODY_CONNECTIONS.iter() {
        if let (Some(a), Some(b)) = (landmarks.get(*from), landmarks.get(*to)) {
            let start = to_pixels(width, height, a.x as f64, a.y as f64);
            let end = to_pixels(width, height, b.x as f64, b.y as f64);
            // Two pixels wide: the segment plus a copy shifted one pixel down-right.
            for offset in [0, 1] {
                draw_line_segment_mut(
                    canvas,
                    ((start.0 + offset) as f32, (start.1 + offset) as f32),
                    ((end.0 + offset) as f32, (end.1 + offset) as f32),
                    colors::CONNECTION,
                );
            }
        }
    }
    for (_, lm) in landmarks.iter() {
        let center = to_pixels(width, height, lm.x as f64, lm.y as f64);
        draw_filled_circle_mut(canvas, center, LANDMARK_RADIUS, colors::LANDMARK);
    }
}

/// Encode an RGB frame as baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    use image::codecs::jpeg::JpegEncoder;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(
            frame.pixels(),
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::Point2D;
    use crate::detect::landmarks_for_angle;
    use crate::pose::{Arm, BodyLandmark};
    use imageproc::drawing::text_size;

    const BACKGROUND: [u8; 3] = [10, 10, 10];

    fn blank() -> Frame {
        Frame::filled(320, 240, 1, BACKGROUND).unwrap()
    }

    fn report(stage: Stage, count: u32) -> FrameReport {
        FrameReport {
            stage,
            count,
            angle: None,
            elbow: None,
            rep_completed: false,
        }
    }

    /// True if any pixel in the region is near-white (text on box or background).
    fn has_white_text(frame: &Frame, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> bool {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter_map(|(x, y)| frame.pixel(x, y))
            .any(|[r, g, _]| r > 200 && g > 200)
    }

    #[test]
    fn status_box_is_filled() {
        let mut frame = blank();
        let overlay = Overlay::new().unwrap();
        overlay
            .annotate(&mut frame, &report(Stage::Unknown, 0), None)
            .unwrap();
        assert_eq!(frame.pixel(224, 72), Some(colors::STATUS_BOX.0));
        assert_eq!(frame.pixel(0, 0), Some(colors::STATUS_BOX.0));
        assert_eq!(frame.pixel(226, 74), Some(BACKGROUND));
    }

    #[test]
    fn count_and_stage_are_drawn_in_white() {
        let mut frame = blank();
        let overlay = Overlay::new().unwrap();
        overlay
            .annotate(&mut frame, &report(Stage::Down, 7), None)
            .unwrap();
        assert!(has_white_text(&frame, 10..80, 26..73));
        assert!(has_white_text(&frame, 80..226, 26..73));
    }

    #[test]
    fn angle_text_sits_at_elbow() {
        let mut frame = blank();
        let mut r = report(Stage::Down, 0);
        r.angle = Some(170.4);
        r.elbow = Some(Point2D::new(0.5, 0.5));
        let overlay = Overlay::new().unwrap();
        overlay.annotate(&mut frame, &r, None).unwrap();
        // Elbow pixel is (160, 120); text grows right and down from there.
        assert!(has_white_text(&frame, 160..200, 120..145));
        assert!(!has_white_text(&frame, 0..150, 80..240));
    }

    #[test]
    fn skeleton_marks_landmarks() {
        let mut frame = blank();
        let pose = landmarks_for_angle(Arm::Left, 90.0);
        let overlay = Overlay::new().unwrap();
        overlay
            .annotate(&mut frame, &report(Stage::Unknown, 0), Some(&pose))
            .unwrap();
        let elbow = pose.get(BodyLandmark::LeftElbow).unwrap();
        let (x, y) = to_pixels(320, 240, elbow.x as f64, elbow.y as f64);
        assert_eq!(frame.pixel(x as u32, y as u32), Some(colors::LANDMARK.0));
    }

    #[test]
    fn landmarks_off_frame_are_clipped() {
        let mut frame = Frame::filled(16, 16, 1, BACKGROUND).unwrap();
        let pose = PoseLandmarks::new()
            .with(
                BodyLandmark::LeftShoulder,
                crate::pose::Landmark::new(-1.0, -1.0),
            )
            .with(BodyLandmark::LeftElbow, crate::pose::Landmark::new(2.0, 2.0));
        let overlay = Overlay::new().unwrap();
        overlay
            .annotate(&mut frame, &report(Stage::Unknown, 0), Some(&pose))
            .unwrap();
        assert_eq!(frame.pixels().len(), 16 * 16 * 3);
    }

    #[test]
    fn widest_stage_label_fits_in_status_box() {
        let overlay = Overlay::new().unwrap();
        let (w, h) = text_size(PxScale::from(VALUE_SCALE), &overlay.font, "DOWN");
        assert!(80 + w as i32 <= STATUS_BOX.2, "DOWN is {w}px wide");
        assert!(26 + h as i32 <= STATUS_BOX.3);
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let jpeg = encode_jpeg(&blank(), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }
}
