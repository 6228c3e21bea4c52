//! Bar chart of an emotion distribution drawn with imgproc primitives.

use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;

use crate::emotion::{format_percent, EmotionDistribution};
use crate::vision::{put_label, rgb, text_size};

pub const CHART_TITLE: &str = "Detected Emotion Distribution";

const TITLE_HEIGHT: i32 = 50;
const LABEL_HEIGHT: i32 = 40;
const AXIS_WIDTH: i32 = 50;
const RIGHT_MARGIN: i32 = 20;
const BAR_FILL: f32 = 0.6;
const GRID_STEP: f32 = 0.2;
const DASH: i32 = 6;

const FALLBACK_COLORS: [(u8, u8, u8); 4] = [
    (0x79, 0x55, 0x48),
    (0x00, 0x96, 0x88),
    (0x3F, 0x51, 0xB5),
    (0xFF, 0xC1, 0x07),
];

pub fn bar_color(label: &str, index: usize) -> Scalar {
    match label {
        "Happy" => rgb(0x4C, 0xAF, 0x50),
        "Sad" => rgb(0x21, 0x96, 0xF3),
        "Angry" => rgb(0xF4, 0x43, 0x36),
        "Neutral" => rgb(0x9E, 0x9E, 0x9E),
        "Disgust" => rgb(0x8B, 0xC3, 0x4A),
        "Fear" => rgb(0x9C, 0x27, 0xB0),
        "Surprise" => rgb(0xFF, 0x98, 0x00),
        _ => {
            let (r, g, b) = FALLBACK_COLORS[index % FALLBACK_COLORS.len()];
            rgb(r, g, b)
        }
    }
}

/// Region inside `area` where bars are drawn, leaving room for the title,
/// the y axis ticks and the labels.
pub fn plot_area(area: Rect) -> Rect {
    Rect::new(
        area.x + AXIS_WIDTH,
        area.y + TITLE_HEIGHT,
        (area.width - AXIS_WIDTH - RIGHT_MARGIN).max(0),
        (area.height - TITLE_HEIGHT - LABEL_HEIGHT).max(0),
    )
}

/// One rectangle per value, y axis fixed to `[0, 1]`.
pub fn bar_rects(plot: Rect, values: &[f32]) -> Vec<Rect> {
    if values.is_empty() {
        return Vec::new();
    }
    let slot = plot.width as f32 / values.len() as f32;
    let bar_width = (slot * BAR_FILL).round() as i32;
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let height = (value.clamp(0.0, 1.0) * plot.height as f32).round() as i32;
            let x = plot.x + (index as f32 * slot + (slot - bar_width as f32) / 2.0).round() as i32;
            Rect::new(x, plot.y + plot.height - height, bar_width, height)
        })
        .collect()
}

pub struct BarChart {
    distribution: EmotionDistribution,
}

impl BarChart {
    pub fn new(distribution: EmotionDistribution) -> Self {
        Self { distribution }
    }

    pub fn distribution(&self) -> &EmotionDistribution {
        &self.distribution
    }

    pub fn update(&mut self, distribution: EmotionDistribution) {
        self.distribution = distribution;
    }

    pub fn draw(&self, canvas: &mut Mat, area: Rect) -> anyhow::Result<()> {
        let text_color = rgb(0x33, 0x33, 0x33);
        let plot = plot_area(area);

        let title_size = text_size(CHART_TITLE, 0.7, 2)?;
        put_label(
            canvas,
            CHART_TITLE,
            Point::new(area.x + (area.width - title_size.width) / 2, area.y + 30),
            0.7,
            text_color,
            2,
        )?;

        imgproc::rectangle(
            canvas,
            plot,
            rgb(0xE5, 0xE5, 0xE5),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;

        let steps = (1.0 / GRID_STEP).round() as i32;
        for step in 0..=steps {
            let fraction = step as f32 * GRID_STEP;
            let y = plot.y + plot.height - (fraction * plot.height as f32).round() as i32;
            dashed_line(canvas, plot.x, plot.x + plot.width, y, rgb(0xFF, 0xFF, 0xFF))?;
            put_label(
                canvas,
                &format!("{:.1}", fraction),
                Point::new(area.x + 10, y + 5),
                0.45,
                text_color,
                1,
            )?;
        }

        let bars = bar_rects(plot, self.distribution.values());
        for (index, ((label, value), bar)) in self.distribution.iter().zip(&bars).enumerate() {
            if bar.height > 0 {
                imgproc::rectangle(
                    canvas,
                    *bar,
                    bar_color(label, index),
                    imgproc::FILLED,
                    imgproc::LINE_8,
                    0,
                )?;
            }

            let center = bar.x + bar.width / 2;
            let percent = format_percent(value);
            let percent_size = text_size(&percent, 0.5, 1)?;
            put_label(
                canvas,
                &percent,
                Point::new(center - percent_size.width / 2, bar.y - 6),
                0.5,
                text_color,
                1,
            )?;

            let label_size = text_size(label, 0.5, 1)?;
            put_label(
                canvas,
                label,
                Point::new(center - label_size.width / 2, plot.y + plot.height + 22),
                0.5,
                text_color,
                1,
            )?;
        }
        Ok(())
    }
}

fn dashed_line(canvas: &mut Mat, from_x: i32, to_x: i32, y: i32, color: Scalar) -> anyhow::Result<()> {
    let mut x = from_x;
    while x < to_x {
        let end = (x + DASH).min(to_x);
        imgproc::line(
            canvas,
            Point::new(x, y),
            Point::new(end, y),
            color,
            1,
            imgproc::LINE_8,
            0,
        )?;
        x += DASH * 2;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::chat_labels;
    use opencv::core::{self, Vec3b};
    use opencv::prelude::*;

    #[test]
    fn plot_leaves_room_for_decorations() {
        let plot = plot_area(Rect::new(400, 0, 800, 600));
        assert_eq!(plot, Rect::new(450, 50, 730, 510));
    }

    #[test]
    fn bars_scale_with_values() {
        let plot = Rect::new(0, 0, 400, 100);
        let bars = bar_rects(plot, &[0.25, 0.25, 0.5, 0.0]);
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0], Rect::new(20, 75, 60, 25));
        assert_eq!(bars[2], Rect::new(220, 50, 60, 50));
        assert_eq!(bars[3].height, 0);
        assert_eq!(bars[3].y, 100);
    }

    #[test]
    fn bars_are_clamped_to_axis() {
        let bars = bar_rects(Rect::new(0, 0, 100, 100), &[1.5, -0.2]);
        assert_eq!(bars[0].height, 100);
        assert_eq!(bars[1].height, 0);
        assert!(bar_rects(Rect::new(0, 0, 100, 100), &[]).is_empty());
    }

    #[test]
    fn known_labels_have_fixed_colors() {
        assert_eq!(bar_color("Happy", 3), rgb(0x4C, 0xAF, 0x50));
        assert_eq!(bar_color("Neutral", 0), rgb(0x9E, 0x9E, 0x9E));
        assert_eq!(bar_color("Calm", 1), bar_color("Other", 5));
    }

    #[test]
    fn draw_paints_bars() {
        let distribution =
            EmotionDistribution::new(chat_labels(), vec![0.7, 0.1, 0.1, 0.1]).unwrap();
        let chart = BarChart::new(distribution);
        let area = Rect::new(0, 0, 600, 400);
        let mut canvas =
            Mat::new_rows_cols_with_default(400, 600, core::CV_8UC3, Scalar::all(240.0)).unwrap();
        chart.draw(&mut canvas, area).unwrap();

        let bar = bar_rects(plot_area(area), chart.distribution().values())[0];
        let pixel = *canvas
            .at_2d::<Vec3b>(bar.y + bar.height / 2, bar.x + bar.width / 2)
            .unwrap();
        assert_eq!(pixel.0, [0x50, 0xAF, 0x4C]);
    }
}
