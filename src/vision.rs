use std::path::Path;

use anyhow::Context;
use opencv::core::{Point, Rect, Scalar, Size, Vector};
use opencv::prelude::*;
use opencv::types::VectorOfRect;
use opencv::{core, imgcodecs, imgproc, objdetect, types};

pub const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;

/// OpenCV colors are BGR.
pub fn rgb(red: u8, green: u8, blue: u8) -> Scalar {
    Scalar::new(blue as f64, green as f64, red as f64, 0.0)
}

pub fn convert_to_grayscale(image: &Mat) -> anyhow::Result<Mat> {
    let mut gray: Mat = Mat::default();
    imgproc::cvt_color_def(&image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// Resize a grayscale image to `size`x`size` and scale it into `[0, 1]`.
/// Returns the pixels in row-major order.
pub fn prepare_model_input(gray: &Mat, size: i32) -> anyhow::Result<Vec<f32>> {
    let mut resized = Mat::default();
    imgproc::resize(
        gray,
        &mut resized,
        Size::new(size, size),
        0.0,
        0.0,
        imgproc::INTER_AREA,
    )?;
    let mut normalized = Mat::default();
    resized.convert_to(&mut normalized, core::CV_32F, 1.0 / 255.0, 0.0)?;
    Ok(normalized.data_typed::<f32>()?.to_vec())
}

pub struct FaceDetector {
    classifier: objdetect::CascadeClassifier,
}

impl FaceDetector {
    pub fn new(cascade: &str) -> anyhow::Result<Self> {
        let xml = core::find_file_def(cascade)?;
        let classifier = objdetect::CascadeClassifier::new(&xml)?;
        Ok(Self { classifier })
    }

    pub fn detect(&mut self, image: &Mat) -> anyhow::Result<VectorOfRect> {
        let mut faces = types::VectorOfRect::new();

        self.classifier.detect_multi_scale(
            &image,
            &mut faces,
            1.1,
            2,
            objdetect::CASCADE_SCALE_IMAGE,
            Size {
                width: 30,
                height: 30,
            },
            Size {
                width: 0,
                height: 0,
            },
        )?;
        Ok(faces)
    }

    /// Largest face in a grayscale frame, if any.
    pub fn locate(&mut self, gray: &Mat) -> anyhow::Result<Option<Rect>> {
        let faces = self.detect(gray)?;
        Ok(find_largest_face(&faces))
    }
}

pub fn find_largest_face(faces: &VectorOfRect) -> Option<Rect> {
    faces
        .into_iter()
        .max_by(|a, b| (a.height * a.width).cmp(&(b.height * b.width)))
}

/// Copy of the region of `image` covered by `area`.
pub fn crop(image: &Mat, area: Rect) -> anyhow::Result<Mat> {
    let region = Mat::roi(image, area)?;
    Ok(region.try_clone()?)
}

pub fn put_label(
    image: &mut Mat,
    text: &str,
    origin: Point,
    scale: f64,
    color: Scalar,
    thickness: i32,
) -> anyhow::Result<()> {
    imgproc::put_text(
        image,
        text,
        origin,
        FONT,
        scale,
        color,
        thickness,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

pub fn text_size(text: &str, scale: f64, thickness: i32) -> anyhow::Result<Size> {
    let mut baseline = 0;
    Ok(imgproc::get_text_size(
        text,
        FONT,
        scale,
        thickness,
        &mut baseline,
    )?)
}

/// Small image pasted into the top-right corner of camera frames.
pub struct Logo {
    image: Mat,
}

impl Logo {
    pub fn load(path: &Path, height: i32) -> anyhow::Result<Self> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Logo path is not valid UTF-8: {:?}", path))?;
        let original = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
        if original.empty() {
            anyhow::bail!("Failed to read logo from {:?}", path);
        }
        let size = original.size()?;
        let width = (size.width as f64 * height as f64 / size.height as f64).round() as i32;
        let mut image = Mat::default();
        imgproc::resize(
            &original,
            &mut image,
            Size::new(width.max(1), height),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;
        Ok(Self { image })
    }

    pub fn from_mat(image: Mat) -> Self {
        Self { image }
    }

    pub fn draw(&self, frame: &mut Mat) -> anyhow::Result<()> {
        if frame.typ() != core::CV_8UC3 || self.image.typ() != core::CV_8UC3 {
            return Ok(());
        }
        let Some(origin) = logo_origin(frame.size()?, self.image.size()?, LOGO_MARGIN) else {
            return Ok(());
        };
        let area = Rect::new(origin.x, origin.y, self.image.cols(), self.image.rows());
        let mut region = Mat::roi_mut(frame, area)?;
        self.image.copy_to(&mut *region)?;
        Ok(())
    }
}

const LOGO_MARGIN: i32 = 10;

/// Top-left corner of a logo anchored to the top-right of the frame.
/// `None` when the logo does not fit.
pub fn logo_origin(frame: Size, logo: Size, margin: i32) -> Option<Point> {
    let x = frame.width - logo.width - margin;
    let y = margin;
    if x < 0 || y + logo.height > frame.height || logo.width <= 0 || logo.height <= 0 {
        return None;
    }
    Some(Point::new(x, y))
}

/// Annotations drawn on every processed camera frame.
#[derive(Default)]
pub struct FrameOverlay {
    logo: Option<Logo>,
}

impl FrameOverlay {
    pub fn new(logo: Option<Logo>) -> Self {
        Self { logo }
    }

    pub fn draw(
        &self,
        frame: &mut Mat,
        status: &str,
        top: Option<(&str, f32)>,
        face: Option<Rect>,
    ) -> anyhow::Result<()> {
        let green = rgb(0, 255, 0);
        if let Some(face) = face {
            imgproc::rectangle_def(frame, face, green)?;
        }
        put_label(frame, status, Point::new(10, 30), 0.9, green, 2)?;
        if let Some((label, value)) = top {
            let line = format!("{} {}", label, crate::emotion::format_percent(value));
            put_label(frame, &line, Point::new(10, 60), 0.7, green, 2)?;
        }
        if let Some(logo) = &self.logo {
            logo.draw(frame)?;
        }
        Ok(())
    }
}

pub fn jpeg_to_mat(data: &[u8]) -> anyhow::Result<Mat> {
    let buffer = Vector::<u8>::from_slice(data);
    let frame = imgcodecs::imdecode(&buffer, imgcodecs::IMREAD_COLOR)?;
    if frame.empty() {
        anyhow::bail!("Failed to decode {} byte frame", data.len());
    }
    Ok(frame)
}

pub fn mat_to_jpeg(frame: &Mat) -> anyhow::Result<Vec<u8>> {
    let mut buffer: Vector<u8> = Default::default();
    imgcodecs::imencode_def(".jpg", frame, &mut buffer)?;
    Ok(buffer.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;

    fn solid(rows: i32, cols: i32, color: Scalar) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC3, color).unwrap()
    }

    #[test]
    fn largest_face_wins() {
        let mut faces = VectorOfRect::new();
        faces.push(Rect::new(0, 0, 10, 10));
        faces.push(Rect::new(5, 5, 40, 30));
        faces.push(Rect::new(50, 50, 20, 20));
        assert_eq!(find_largest_face(&faces), Some(Rect::new(5, 5, 40, 30)));
        assert_eq!(find_largest_face(&VectorOfRect::new()), None);
    }

    #[test]
    fn model_input_is_normalized() {
        let gray = Mat::new_rows_cols_with_default(120, 160, core::CV_8UC1, Scalar::all(255.0))
            .unwrap();
        let input = prepare_model_input(&gray, 48).unwrap();
        assert_eq!(input.len(), 48 * 48);
        assert!(input.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn grayscale_has_one_channel() {
        let frame = solid(10, 20, rgb(10, 20, 30));
        let gray = convert_to_grayscale(&frame).unwrap();
        assert_eq!(gray.channels(), 1);
        assert_eq!(gray.cols(), 20);
    }

    #[test]
    fn logo_anchors_top_right() {
        let origin = logo_origin(Size::new(640, 480), Size::new(100, 48), 10);
        assert_eq!(origin, Some(Point::new(530, 10)));
        assert_eq!(
            logo_origin(Size::new(100, 40), Size::new(100, 48), 10),
            None
        );
    }

    #[test]
    fn logo_pixels_are_pasted() {
        let mut frame = solid(100, 100, Scalar::all(0.0));
        let logo = Logo::from_mat(solid(10, 20, rgb(255, 0, 0)));
        logo.draw(&mut frame).unwrap();
        let pasted = *frame.at_2d::<Vec3b>(10, 70).unwrap();
        assert_eq!(pasted.0, [0, 0, 255]);
        let corner = *frame.at_2d::<Vec3b>(19, 89).unwrap();
        assert_eq!(corner.0, [0, 0, 255]);
        for (row, col) in [(50, 50), (20, 89), (19, 90), (9, 70)] {
            let untouched = *frame.at_2d::<Vec3b>(row, col).unwrap();
            assert_eq!(untouched.0, [0, 0, 0]);
        }
    }

    #[test]
    fn jpeg_codec_keeps_dimensions() {
        let frame = solid(48, 64, rgb(200, 100, 50));
        let data = mat_to_jpeg(&frame).unwrap();
        let decoded = jpeg_to_mat(&data).unwrap();
        assert_eq!(decoded.rows(), 48);
        assert_eq!(decoded.cols(), 64);
    }

    #[test]
    fn garbage_is_not_a_frame() {
        assert!(jpeg_to_mat(&[1, 2, 3, 4]).is_err());
    }
}
