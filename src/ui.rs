//! Main window: chat panel, emotion chart and camera controls.
//!
//! Everything is drawn into a single canvas shown with `highgui`. Mouse
//! clicks arrive through a callback and are queued until the next tick,
//! key presses come from `wait_key`. The camera feed gets its own window.

use std::path::Path;
use std::sync::{Arc, Mutex};

use opencv::core::{self, Mat, Point, Rect, Scalar};
use opencv::highgui;
use opencv::imgproc;
use opencv::prelude::*;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::camera::{
    CameraEvent, CameraSource, CameraWorker, FramePipeline, FrameSource, RemoteCameraSource,
    WorkerSettings,
};
use crate::chart::BarChart;
use crate::chat::{ChatSession, Sender};
use crate::config::{AppConfig, CameraKind};
use crate::emotion::{chat_labels, EmotionDistribution};
use crate::telemetry::{EmotionReading, ReadingPublisher, ReadingSource, ZenohSettings};
use crate::vision::{put_label, rgb, text_size};

pub const MAIN_WINDOW: &str = "MindCare Pro - Emotional Support System";
pub const CAMERA_WINDOW: &str = "MindCare Camera";
const PROMPT_WINDOW: &str = "MindCare Pro - Warning";

const UI_TICK_MS: i32 = 10;
const MARGIN: i32 = 10;
const CHAT_WIDTH: i32 = 400;
const ROW_HEIGHT: i32 = 40;
const LINE_HEIGHT: i32 = 22;
const TEXT_SCALE: f64 = 0.5;
const MAX_INPUT_LEN: usize = 200;

const KEY_NONE: i32 = -1;
const KEY_BACKSPACE: i32 = 8;
const KEY_DELETE: i32 = 127;
const KEY_ENTER: i32 = 13;
const KEY_NEWLINE: i32 = 10;
const KEY_ESCAPE: i32 = 27;

fn background() -> Scalar {
    rgb(0xF0, 0xF0, 0xF0)
}

fn text_color() -> Scalar {
    rgb(0x33, 0x33, 0x33)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Send,
    Clear,
    StartCamera,
    StopCamera,
}

#[derive(Debug, Clone, Copy)]
pub struct Button {
    pub id: ButtonId,
    pub label: &'static str,
    pub rect: Rect,
}

impl Button {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.rect.x
            && point.x < self.rect.x + self.rect.width
            && point.y >= self.rect.y
            && point.y < self.rect.y + self.rect.height
    }
}

/// Widget positions for a given window size.
#[derive(Debug, Clone)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
    pub chat_history: Rect,
    pub input: Rect,
    pub chart: Rect,
    pub status: Point,
    pub buttons: Vec<Button>,
}

impl Layout {
    pub fn new(width: i32, height: i32) -> Self {
        let input_y = height - MARGIN - ROW_HEIGHT;
        let chat_history = Rect::new(MARGIN, MARGIN, CHAT_WIDTH, input_y - 2 * MARGIN);
        let input = Rect::new(MARGIN, input_y, CHAT_WIDTH - 160, ROW_HEIGHT);

        let right_x = MARGIN + CHAT_WIDTH + 2 * MARGIN;
        let right_width = width - right_x - MARGIN;
        let chart = Rect::new(right_x, MARGIN, right_width, height - 2 * MARGIN - 110);
        let controls_y = chart.y + chart.height + 2 * MARGIN;

        let buttons = vec![
            Button {
                id: ButtonId::Send,
                label: "Send",
                rect: Rect::new(input.x + input.width + MARGIN, input_y, 70, ROW_HEIGHT),
            },
            Button {
                id: ButtonId::Clear,
                label: "Clear",
                rect: Rect::new(input.x + input.width + 90, input_y, 70, ROW_HEIGHT),
            },
            Button {
                id: ButtonId::StartCamera,
                label: "Start camera",
                rect: Rect::new(right_x, controls_y, 170, ROW_HEIGHT),
            },
            Button {
                id: ButtonId::StopCamera,
                label: "Stop camera",
                rect: Rect::new(right_x + 180, controls_y, 170, ROW_HEIGHT),
            },
        ];

        Self {
            width,
            height,
            chat_history,
            input,
            chart,
            status: Point::new(right_x, controls_y + ROW_HEIGHT + 30),
            buttons,
        }
    }

    pub fn button_at(&self, point: Point) -> Option<ButtonId> {
        self.buttons
            .iter()
            .find(|button| button.contains(point))
            .map(|button| button.id)
    }
}

/// Greedy word wrap. Words wider than `max_width` are split by character.
pub fn wrap_text(text: &str, max_width: i32, measure: impl Fn(&str) -> i32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure(&candidate) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if measure(word) <= max_width {
            current = word.to_string();
            continue;
        }
        for c in word.chars() {
            let mut extended = current.clone();
            extended.push(c);
            if measure(&extended) > max_width && !current.is_empty() {
                lines.push(std::mem::replace(&mut current, c.to_string()));
            } else {
                current = extended;
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Edited,
    Submit,
    Quit,
}

/// Single line text entry fed with `wait_key` codes.
#[derive(Debug, Default)]
pub struct InputLine {
    text: String,
}

impl InputLine {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    pub fn handle_key(&mut self, key: i32) -> KeyAction {
        match key {
            KEY_NONE => KeyAction::None,
            KEY_ESCAPE => KeyAction::Quit,
            KEY_ENTER | KEY_NEWLINE => KeyAction::Submit,
            KEY_BACKSPACE | KEY_DELETE => {
                if self.text.pop().is_some() {
                    KeyAction::Edited
                } else {
                    KeyAction::None
                }
            }
            // Hershey fonts only cover printable ASCII
            32..=126 if self.text.len() < MAX_INPUT_LEN => {
                self.text.push(key as u8 as char);
                KeyAction::Edited
            }
            _ => KeyAction::None,
        }
    }
}

enum CameraState {
    Idle(FramePipeline),
    Running(CameraWorker),
    /// The worker thread panicked and took the pipeline with it.
    Lost,
}

pub struct MindCareApp {
    config: AppConfig,
    layout: Layout,
    chat: ChatSession,
    input: InputLine,
    chart: BarChart,
    camera: CameraState,
    camera_window_open: bool,
    simulated: bool,
    /// Last error, shown in red until the camera changes state.
    error: Option<String>,
    clicks: Arc<Mutex<Vec<Point>>>,
    publisher: Option<ReadingPublisher>,
    runtime: Handle,
    zenoh: ZenohSettings,
}

impl MindCareApp {
    pub fn new(
        config: AppConfig,
        chat: ChatSession,
        pipeline: FramePipeline,
        runtime: Handle,
        zenoh: ZenohSettings,
    ) -> anyhow::Result<Self> {
        let publisher = if config.zenoh.publish_readings {
            Some(ReadingPublisher::spawn(
                &runtime,
                zenoh.clone(),
                config.zenoh.readings_key.clone(),
            ))
        } else {
            None
        };
        let layout = Layout::new(config.ui.window_width, config.ui.window_height);
        let chart = BarChart::new(EmotionDistribution::uniform(chat_labels())?);
        let simulated = pipeline.model().is_simulated();

        Ok(Self {
            config,
            layout,
            chat,
            input: InputLine::default(),
            chart,
            camera: CameraState::Idle(pipeline),
            camera_window_open: false,
            simulated,
            error: None,
            clicks: Arc::new(Mutex::new(Vec::new())),
            publisher,
            runtime,
            zenoh,
        })
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn chart(&self) -> &BarChart {
        &self.chart
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_camera_running(&self) -> bool {
        matches!(self.camera, CameraState::Running(_))
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        highgui::named_window(MAIN_WINDOW, highgui::WINDOW_AUTOSIZE)?;
        let clicks = self.clicks.clone();
        highgui::set_mouse_callback(
            MAIN_WINDOW,
            Some(Box::new(move |event: i32, x: i32, y: i32, _flags: i32| {
                if event == highgui::EVENT_LBUTTONDOWN {
                    if let Ok(mut clicks) = clicks.lock() {
                        clicks.push(Point::new(x, y));
                    }
                }
            })),
        )?;
        info!("Main window ready");

        loop {
            self.poll_camera()?;
            for point in self.take_clicks() {
                self.handle_click(point);
            }

            let canvas = self.render()?;
            highgui::imshow(MAIN_WINDOW, &canvas)?;

            let key = highgui::wait_key(UI_TICK_MS)?;
            if self.handle_key(key) == KeyAction::Quit {
                break;
            }
            if highgui::get_window_property(MAIN_WINDOW, highgui::WND_PROP_VISIBLE)? < 1.0 {
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn take_clicks(&self) -> Vec<Point> {
        self.clicks
            .lock()
            .map(|mut clicks| std::mem::take(&mut *clicks))
            .unwrap_or_default()
    }

    pub fn handle_key(&mut self, key: i32) -> KeyAction {
        let action = self.input.handle_key(key);
        if action == KeyAction::Submit {
            self.submit_message();
        }
        action
    }

    pub fn handle_click(&mut self, point: Point) {
        match self.layout.button_at(point) {
            Some(ButtonId::Send) => self.submit_message(),
            Some(ButtonId::Clear) => self.chat.clear(),
            Some(ButtonId::StartCamera) => self.start_camera(),
            Some(ButtonId::StopCamera) => self.stop_camera(),
            None => {}
        }
    }

    fn submit_message(&mut self) {
        let message = self.input.take();
        match self.chat.submit(&message) {
            Ok(Some(distribution)) => {
                self.publish(ReadingSource::Chat, &distribution);
                self.chart.update(distribution);
            }
            Ok(None) => {}
            Err(err) => {
                error!("Failed to analyze message: {err:#}");
                self.error = Some(format!("Could not analyze message: {err}"));
            }
        }
    }

    fn publish(&self, source: ReadingSource, distribution: &EmotionDistribution) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(EmotionReading::new(source, distribution));
        }
    }

    fn open_source(&self) -> anyhow::Result<Box<dyn FrameSource>> {
        let camera = &self.config.camera;
        Ok(match camera.source {
            CameraKind::Local => Box::new(CameraSource::open(
                &camera.device,
                camera.width,
                camera.height,
            )?),
            CameraKind::Remote => Box::new(RemoteCameraSource::subscribe(
                &self.runtime,
                self.zenoh.clone(),
                camera.remote_key.clone(),
            )),
        })
    }

    pub fn start_camera(&mut self) {
        if self.is_camera_running() {
            return;
        }
        match self.open_source() {
            Ok(source) => self.start_camera_with(source),
            Err(err) => {
                error!("Error starting camera: {err:#}");
                self.error = Some(format!("Could not start camera: {err}"));
            }
        }
    }

    /// Starts the camera loop on `source`. Does nothing while running.
    pub fn start_camera_with(&mut self, source: Box<dyn FrameSource>) {
        match std::mem::replace(&mut self.camera, CameraState::Lost) {
            CameraState::Running(worker) => self.camera = CameraState::Running(worker),
            CameraState::Lost => {
                self.error = Some("Camera pipeline is unavailable".to_string());
            }
            CameraState::Idle(pipeline) => {
                let settings = WorkerSettings::from(&self.config.camera);
                self.camera = CameraState::Running(CameraWorker::spawn(source, pipeline, settings));
                self.error = None;
            }
        }
    }

    pub fn stop_camera(&mut self) {
        match std::mem::replace(&mut self.camera, CameraState::Lost) {
            CameraState::Running(worker) => {
                match worker.stop() {
                    Ok(pipeline) => {
                        self.camera = CameraState::Idle(pipeline);
                        self.error = None;
                    }
                    Err(err) => {
                        error!("Camera worker ended badly: {err}");
                        self.error = Some(err.to_string());
                    }
                }
                if std::mem::take(&mut self.camera_window_open) {
                    if let Err(err) = highgui::destroy_window(CAMERA_WINDOW) {
                        warn!("Failed to close camera window: {err}");
                    }
                }
            }
            other => self.camera = other,
        }
    }

    fn poll_camera(&mut self) -> anyhow::Result<()> {
        let CameraState::Running(worker) = &self.camera else {
            return Ok(());
        };
        let event = worker.poll();
        match event {
            Some(CameraEvent::Frame(update)) => {
                highgui::imshow(CAMERA_WINDOW, &update.frame)?;
                self.camera_window_open = true;
                if let Some(distribution) = update.prediction.distribution {
                    self.publish(ReadingSource::Camera, &distribution);
                    self.chart.update(distribution);
                }
            }
            Some(CameraEvent::Failed(reason)) => {
                self.stop_camera();
                self.error = Some(reason);
            }
            None => {}
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.stop_camera();
        if let Err(err) = highgui::destroy_all_windows() {
            warn!("Failed to close windows: {err}");
        }
        info!("Goodbye");
    }

    /// Camera state and mode, followed by the last error if any.
    fn status_line(&self) -> (String, Scalar) {
        let camera = if self.is_camera_running() {
            "Camera running"
        } else {
            "Camera stopped"
        };
        let mode = if self.simulated { " (simulation mode)" } else { "" };
        let state = format!("{camera}{mode}");
        match &self.error {
            Some(error) => (format!("{state} | {error}"), rgb(0xF4, 0x43, 0x36)),
            None => (state, text_color()),
        }
    }

    pub fn render(&self) -> anyhow::Result<Mat> {
        let layout = &self.layout;
        let mut canvas = Mat::new_rows_cols_with_default(
            layout.height,
            layout.width,
            core::CV_8UC3,
            background(),
        )?;

        self.draw_chat(&mut canvas)?;
        self.draw_input(&mut canvas)?;
        for button in &layout.buttons {
            draw_button(&mut canvas, button)?;
        }
        self.chart.draw(&mut canvas, layout.chart)?;

        let (status, color) = self.status_line();
        put_label(&mut canvas, &status, layout.status, TEXT_SCALE, color, 1)?;
        Ok(canvas)
    }

    fn draw_chat(&self, canvas: &mut Mat) -> anyhow::Result<()> {
        let area = self.layout.chat_history;
        fill(canvas, area, rgb(0xFF, 0xFF, 0xFF))?;

        let max_width = area.width - 2 * MARGIN;
        let mut lines = Vec::new();
        for message in self.chat.log().iter() {
            let (color, thickness) = match message.sender {
                Sender::User => (rgb(0x00, 0x00, 0xFF), 2),
                Sender::Bot => (rgb(0x00, 0x80, 0x00), 1),
            };
            let measure = |text: &str| {
                text_size(text, TEXT_SCALE, thickness)
                    .map(|size| size.width)
                    .unwrap_or(i32::MAX)
            };
            for line in wrap_text(&message.display(), max_width, measure) {
                lines.push((line, color, thickness));
            }
        }

        // keep the end of the conversation in view
        let visible = ((area.height - MARGIN) / LINE_HEIGHT).max(0) as usize;
        let skip = lines.len().saturating_sub(visible);
        for (row, (line, color, thickness)) in lines.iter().skip(skip).enumerate() {
            let origin = Point::new(area.x + MARGIN, area.y + LINE_HEIGHT * (row as i32 + 1));
            put_label(canvas, line, origin, TEXT_SCALE, *color, *thickness)?;
        }
        Ok(())
    }

    fn draw_input(&self, canvas: &mut Mat) -> anyhow::Result<()> {
        let area = self.layout.input;
        fill(canvas, area, rgb(0xFF, 0xFF, 0xFF))?;
        outline(canvas, area, rgb(0x99, 0x99, 0x99))?;

        // show the tail when the text is wider than the box
        let max_width = area.width - 2 * MARGIN;
        let mut shown = format!("{}|", self.input.text());
        while shown.len() > 1 && text_size(&shown, TEXT_SCALE, 1)?.width > max_width {
            shown.remove(0);
        }
        put_label(
            canvas,
            &shown,
            Point::new(area.x + MARGIN, area.y + area.height / 2 + 6),
            TEXT_SCALE,
            text_color(),
            1,
        )
    }
}

fn fill(canvas: &mut Mat, area: Rect, color: Scalar) -> anyhow::Result<()> {
    imgproc::rectangle(canvas, area, color, imgproc::FILLED, imgproc::LINE_8, 0)?;
    Ok(())
}

fn outline(canvas: &mut Mat, area: Rect, color: Scalar) -> anyhow::Result<()> {
    imgproc::rectangle(canvas, area, color, 1, imgproc::LINE_8, 0)?;
    Ok(())
}

fn draw_button(canvas: &mut Mat, button: &Button) -> anyhow::Result<()> {
    fill(canvas, button.rect, rgb(0xE0, 0xE0, 0xE0))?;
    outline(canvas, button.rect, rgb(0xAA, 0xAA, 0xAA))?;
    let size = text_size(button.label, TEXT_SCALE, 1)?;
    let origin = Point::new(
        button.rect.x + (button.rect.width - size.width) / 2,
        button.rect.y + (button.rect.height + size.height) / 2,
    );
    put_label(canvas, button.label, origin, TEXT_SCALE, text_color(), 1)
}

/// Asks whether to continue without a model. Returns `false` on `n`, Esc
/// or when the prompt window is closed.
pub fn confirm_simulation_mode(model_path: &Path) -> anyhow::Result<bool> {
    let mut canvas = Mat::new_rows_cols_with_default(180, 720, core::CV_8UC3, background())?;
    let lines = [
        "Model not found.".to_string(),
        "Continue in simulation mode? (y/n)".to_string(),
        format!("Expected path: {}", model_path.display()),
    ];
    for (row, line) in lines.iter().enumerate() {
        put_label(
            &mut canvas,
            line,
            Point::new(20, 45 + 45 * row as i32),
            0.6,
            text_color(),
            1,
        )?;
    }

    highgui::named_window(PROMPT_WINDOW, highgui::WINDOW_AUTOSIZE)?;
    highgui::imshow(PROMPT_WINDOW, &canvas)?;
    let answer = loop {
        let key = highgui::wait_key(100)?;
        match key {
            k if k == 'y' as i32 || k == 'Y' as i32 => break true,
            k if k == 'n' as i32 || k == 'N' as i32 || k == KEY_ESCAPE => break false,
            _ => {}
        }
        if highgui::get_window_property(PROMPT_WINDOW, highgui::WND_PROP_VISIBLE)? < 1.0 {
            break false;
        }
    };
    highgui::destroy_window(PROMPT_WINDOW)?;
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{LexiconTextAnalyzer, Lexicon};
    use crate::emotion::camera_labels;
    use crate::model::EmotionModel;
    use crate::vision::FrameOverlay;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn char_width(text: &str) -> i32 {
        text.chars().count() as i32
    }

    fn app(runtime: &tokio::runtime::Runtime, config: AppConfig) -> MindCareApp {
        let chat = ChatSession::new(Box::new(LexiconTextAnalyzer::new(Lexicon::default())), 50);
        let pipeline = FramePipeline::new(
            EmotionModel::simulated(camera_labels()),
            None,
            FrameOverlay::default(),
        );
        MindCareApp::new(
            config,
            chat,
            pipeline,
            runtime.handle().clone(),
            ZenohSettings::default(),
        )
        .unwrap()
    }

    fn center_of(layout: &Layout, id: ButtonId) -> Point {
        let button = layout.buttons.iter().find(|b| b.id == id).unwrap();
        Point::new(
            button.rect.x + button.rect.width / 2,
            button.rect.y + button.rect.height / 2,
        )
    }

    #[test]
    fn wraps_on_words() {
        let lines = wrap_text("the quick brown fox", 10, char_width);
        assert_eq!(lines, vec!["the quick", "brown fox"]);
    }

    #[test]
    fn splits_long_words() {
        let lines = wrap_text("abcdefghij", 4, char_width);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn empty_text_is_one_line() {
        assert_eq!(wrap_text("", 10, char_width), vec![String::new()]);
    }

    #[test]
    fn input_line_editing() {
        let mut input = InputLine::default();
        assert_eq!(input.handle_key('h' as i32), KeyAction::Edited);
        assert_eq!(input.handle_key('i' as i32), KeyAction::Edited);
        assert_eq!(input.handle_key(KEY_BACKSPACE), KeyAction::Edited);
        assert_eq!(input.text(), "h");
        assert_eq!(input.handle_key(KEY_NONE), KeyAction::None);
        assert_eq!(input.handle_key(200), KeyAction::None);
        assert_eq!(input.handle_key(KEY_ENTER), KeyAction::Submit);
        assert_eq!(input.handle_key(KEY_ESCAPE), KeyAction::Quit);
        assert_eq!(input.take(), "h");
        assert_eq!(input.handle_key(KEY_BACKSPACE), KeyAction::None);
    }

    #[test]
    fn input_line_is_bounded() {
        let mut input = InputLine::default();
        for _ in 0..MAX_INPUT_LEN + 5 {
            input.handle_key('a' as i32);
        }
        assert_eq!(input.text().len(), MAX_INPUT_LEN);
    }

    #[test]
    fn layout_fits_window() {
        let layout = Layout::new(1200, 800);
        assert_eq!(layout.chat_history, Rect::new(10, 10, 400, 730));
        assert_eq!(layout.chart, Rect::new(430, 10, 760, 670));
        for button in &layout.buttons {
            assert!(button.rect.x + button.rect.width <= 1200);
            assert!(button.rect.y + button.rect.height <= 800);
        }
        let clear = layout.buttons.iter().find(|b| b.id == ButtonId::Clear).unwrap();
        assert_eq!(clear.rect.x + clear.rect.width, 10 + CHAT_WIDTH);
    }

    #[test]
    fn clicks_hit_buttons() {
        let layout = Layout::new(1200, 800);
        for id in [
            ButtonId::Send,
            ButtonId::Clear,
            ButtonId::StartCamera,
            ButtonId::StopCamera,
        ] {
            assert_eq!(layout.button_at(center_of(&layout, id)), Some(id));
        }
        assert_eq!(layout.button_at(Point::new(5, 5)), None);
    }

    #[test]
    fn typing_and_sending_updates_chat_and_chart() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = app(&runtime, AppConfig::default());
        for c in "estoy feliz".chars() {
            app.handle_key(c as i32);
        }
        assert_eq!(app.handle_key(KEY_ENTER), KeyAction::Submit);
        assert_eq!(app.chat().log().len(), 2);
        assert_eq!(app.chart().distribution().top(), Some(("Happy", 0.8)));

        let layout = Layout::new(1200, 800);
        app.handle_click(center_of(&layout, ButtonId::Clear));
        assert!(app.chat().log().is_empty());
    }

    #[test]
    fn blank_send_does_nothing() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = app(&runtime, AppConfig::default());
        let layout = Layout::new(1200, 800);
        app.handle_click(center_of(&layout, ButtonId::Send));
        assert!(app.chat().log().is_empty());
        assert_eq!(app.chart().distribution().values(), &[0.25; 4]);
    }

    #[test]
    fn missing_camera_is_reported() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut config = AppConfig::default();
        config.camera.device = "no/such/recording.avi".to_string();
        let mut app = app(&runtime, config);
        app.start_camera();
        assert!(!app.is_camera_running());
        assert!(app.error().unwrap().starts_with("Could not start camera"));
        // stopping an idle camera is a no-op
        app.stop_camera();
        assert!(!app.is_camera_running());
    }

    struct CountingSource {
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> anyhow::Result<Option<Mat>> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            let frame =
                Mat::new_rows_cols_with_default(120, 160, core::CV_8UC3, Scalar::all(60.0))?;
            Ok(Some(frame))
        }
    }

    #[test]
    fn starting_a_running_camera_is_a_no_op() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut config = AppConfig::default();
        config.camera.device = "no/such/recording.avi".to_string();
        let mut app = app(&runtime, config);

        let first = Arc::new(AtomicUsize::new(0));
        app.start_camera_with(Box::new(CountingSource {
            reads: first.clone(),
        }));
        assert!(app.is_camera_running());

        let second = Arc::new(AtomicUsize::new(0));
        app.start_camera_with(Box::new(CountingSource {
            reads: second.clone(),
        }));
        // would fail on the missing device if it tried to open it
        app.start_camera();
        assert!(app.is_camera_running());
        assert_eq!(app.error(), None);

        std::thread::sleep(std::time::Duration::from_millis(100));
        app.stop_camera();
        assert!(!app.is_camera_running());
        assert!(first.load(Ordering::Relaxed) > 0);
        assert_eq!(second.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn status_shows_camera_state_and_last_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut config = AppConfig::default();
        config.camera.device = "no/such/recording.avi".to_string();
        let mut app = app(&runtime, config);
        assert_eq!(app.status_line().0, "Camera stopped (simulation mode)");

        app.start_camera();
        assert!(app
            .status_line()
            .0
            .starts_with("Camera stopped (simulation mode) | Could not start camera"));

        app.start_camera_with(Box::new(CountingSource {
            reads: Arc::new(AtomicUsize::new(0)),
        }));
        assert_eq!(app.status_line().0, "Camera running (simulation mode)");

        app.stop_camera();
        assert_eq!(app.status_line().0, "Camera stopped (simulation mode)");
    }

    #[test]
    fn render_has_window_size() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = app(&runtime, AppConfig::default());
        for c in "a fairly long message that certainly needs to wrap across lines".chars() {
            app.handle_key(c as i32);
        }
        app.handle_key(KEY_ENTER);
        let canvas = app.render().unwrap();
        assert_eq!(canvas.rows(), 800);
        assert_eq!(canvas.cols(), 1200);
    }
}
