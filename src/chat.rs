//! Chat history and the text "emotion" analyzers behind the chat bot.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::emotion::{chat_labels, format_percent, EmotionDistribution};
use crate::ErrorWrapper;

pub const BOT_NAME: &str = "MindCare";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    /// Line as shown in the history panel.
    pub fn display(&self) -> String {
        match self.sender {
            Sender::User => format!("You: {}", self.text),
            Sender::Bot => format!("{}: {}", BOT_NAME, self.text),
        }
    }
}

pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    max_messages: usize,
}

impl ChatLog {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn push(&mut self, sender: Sender, text: impl Into<String>) {
        if self.messages.len() == self.max_messages {
            self.messages.pop_front();
        }
        self.messages.push_back(ChatMessage {
            sender,
            text: text.into(),
        });
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TextEmotion {
    pub label: String,
    pub confidence: f32,
    pub distribution: EmotionDistribution,
}

pub trait TextAnalyzer: Send {
    fn analyze(&mut self, text: &str) -> anyhow::Result<TextEmotion>;
}

/// Placeholder analyzer, ignores the text and samples a distribution.
pub struct RandomTextAnalyzer {
    rng: StdRng,
}

impl RandomTextAnalyzer {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomTextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAnalyzer for RandomTextAnalyzer {
    fn analyze(&mut self, _text: &str) -> anyhow::Result<TextEmotion> {
        let distribution = EmotionDistribution::dirichlet(chat_labels(), &mut self.rng)?;
        let (label, confidence) = distribution
            .top()
            .map(|(label, confidence)| (label.to_string(), confidence))
            .unwrap_or_default();
        Ok(TextEmotion {
            label,
            confidence,
            distribution,
        })
    }
}

const NEGATORS: [&str; 6] = ["no", "not", "never", "nunca", "jamas", "ni"];
const INTENSIFIERS: [&str; 6] = ["muy", "very", "really", "so", "tan", "super"];
const INTENSIFIER_SCALE: f32 = 1.5;

const BUILTIN_WORDS: [(&str, f32); 40] = [
    ("feliz", 0.8),
    ("contento", 0.7),
    ("contenta", 0.7),
    ("alegre", 0.7),
    ("bien", 0.5),
    ("genial", 0.8),
    ("excelente", 0.9),
    ("gracias", 0.4),
    ("amor", 0.6),
    ("tranquilo", 0.4),
    ("triste", -0.7),
    ("mal", -0.6),
    ("solo", -0.3),
    ("sola", -0.3),
    ("cansado", -0.4),
    ("cansada", -0.4),
    ("enojado", -0.6),
    ("enojada", -0.6),
    ("odio", -0.8),
    ("terrible", -0.9),
    ("happy", 0.8),
    ("glad", 0.6),
    ("good", 0.7),
    ("great", 0.8),
    ("excellent", 0.9),
    ("love", 0.6),
    ("calm", 0.4),
    ("thanks", 0.4),
    ("fine", 0.4),
    ("better", 0.5),
    ("sad", -0.7),
    ("bad", -0.7),
    ("lonely", -0.5),
    ("tired", -0.4),
    ("angry", -0.6),
    ("hate", -0.8),
    ("upset", -0.6),
    ("awful", -0.9),
    ("worse", -0.6),
    ("depressed", -0.8),
];

#[derive(Debug, Deserialize)]
struct LexiconFile {
    words: HashMap<String, f32>,
}

/// Word polarity table.
#[derive(Debug, Clone)]
pub struct Lexicon {
    words: HashMap<String, f32>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            words: BUILTIN_WORDS
                .iter()
                .map(|(word, polarity)| (word.to_string(), *polarity))
                .collect(),
        }
    }
}

impl Lexicon {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let file: LexiconFile = toml::from_str(content)?;
        let words = file
            .words
            .into_iter()
            .map(|(word, polarity)| (word.to_lowercase(), polarity.clamp(-1.0, 1.0)))
            .collect();
        Ok(Self { words })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Mean polarity of the scored words in `text`, in `[-1, 1]`.
    pub fn polarity(&self, text: &str) -> f32 {
        let lowered = text.to_lowercase();
        let mut scores = Vec::new();
        let mut negate = false;
        let mut scale = 1.0;

        for word in lowered.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
            if NEGATORS.contains(&word) {
                negate = true;
                continue;
            }
            if INTENSIFIERS.contains(&word) {
                scale = INTENSIFIER_SCALE;
                continue;
            }
            // negation carries over unscored words, intensity does not
            if let Some(polarity) = self.words.get(word) {
                let mut score = polarity * scale;
                if negate {
                    score = -score;
                    negate = false;
                }
                scores.push(score.clamp(-1.0, 1.0));
            }
            scale = 1.0;
        }

        if scores.is_empty() {
            return 0.0;
        }
        let mean = scores.iter().sum::<f32>() / scores.len() as f32;
        mean.clamp(-1.0, 1.0)
    }
}

const POSITIVE_THRESHOLD: f32 = 0.3;
const NEGATIVE_THRESHOLD: f32 = -0.3;

pub struct LexiconTextAnalyzer {
    lexicon: Lexicon,
}

impl LexiconTextAnalyzer {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    /// Polarity to label and fixed confidence.
    pub fn classify(polarity: f32) -> (&'static str, f32) {
        if polarity > POSITIVE_THRESHOLD {
            ("Happy", 0.8)
        } else if polarity < NEGATIVE_THRESHOLD {
            ("Sad", 0.7)
        } else {
            ("Neutral", 0.6)
        }
    }
}

impl TextAnalyzer for LexiconTextAnalyzer {
    fn analyze(&mut self, text: &str) -> anyhow::Result<TextEmotion> {
        let polarity = self.lexicon.polarity(text);
        let (label, confidence) = Self::classify(polarity);
        debug!("Text polarity {polarity:.2} -> {label}");
        Ok(TextEmotion {
            label: label.to_string(),
            confidence,
            distribution: concentrate(label, confidence)?,
        })
    }
}

/// `confidence` on `label`, the rest split evenly over the other chat labels.
fn concentrate(label: &str, confidence: f32) -> Result<EmotionDistribution, ErrorWrapper> {
    let labels = chat_labels();
    let others = (labels.len() - 1) as f32;
    let rest = (1.0 - confidence) / others;
    let values = labels
        .iter()
        .map(|candidate| if candidate == label { confidence } else { rest })
        .collect();
    EmotionDistribution::new(labels, values)
}

/// History plus the analyzer answering each message.
pub struct ChatSession {
    log: ChatLog,
    analyzer: Box<dyn TextAnalyzer>,
}

impl ChatSession {
    pub fn new(analyzer: Box<dyn TextAnalyzer>, max_messages: usize) -> Self {
        Self {
            log: ChatLog::new(max_messages),
            analyzer,
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    /// Returns the distribution to chart, `None` for blank input.
    pub fn submit(&mut self, message: &str) -> anyhow::Result<Option<EmotionDistribution>> {
        if message.trim().is_empty() {
            return Ok(None);
        }
        self.log.push(Sender::User, message);
        let emotion = self.analyzer.analyze(message)?;
        self.log.push(
            Sender::Bot,
            format!(
                "I detect {} (Confidence: {})",
                emotion.label,
                format_percent(emotion.confidence)
            ),
        );
        Ok(Some(emotion.distribution))
    }
}

/// Analyzer from config, falling back to the built-in lexicon when the
/// configured one cannot be read.
pub fn build_analyzer(
    kind: crate::config::AnalyzerKind,
    lexicon_path: Option<&Path>,
) -> Box<dyn TextAnalyzer> {
    match kind {
        crate::config::AnalyzerKind::Random => Box::new(RandomTextAnalyzer::new()),
        crate::config::AnalyzerKind::Lexicon => {
            let lexicon = match lexicon_path {
                Some(path) => Lexicon::load(path).unwrap_or_else(|err| {
                    warn!("Failed to load lexicon {:?}: {err:#}", path);
                    Lexicon::default()
                }),
                None => Lexicon::default(),
            };
            Box::new(LexiconTextAnalyzer::new(lexicon))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_drops_oldest() {
        let mut log = ChatLog::new(2);
        log.push(Sender::User, "one");
        log.push(Sender::Bot, "two");
        log.push(Sender::User, "three");
        let texts: Vec<_> = log.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn display_prefixes() {
        let user = ChatMessage {
            sender: Sender::User,
            text: "hola".to_string(),
        };
        let bot = ChatMessage {
            sender: Sender::Bot,
            text: "hi".to_string(),
        };
        assert_eq!(user.display(), "You: hola");
        assert_eq!(bot.display(), "MindCare: hi");
    }

    #[test]
    fn polarity_of_words() {
        let lexicon = Lexicon::default();
        assert!(lexicon.polarity("Estoy muy feliz hoy") > 0.3);
        assert!(lexicon.polarity("I feel sad and lonely") < -0.3);
        assert_eq!(lexicon.polarity("the table is brown"), 0.0);
    }

    #[test]
    fn negation_flips_next_scored_word() {
        let lexicon = Lexicon::default();
        assert!(lexicon.polarity("no estoy feliz") < 0.0);
        assert!(lexicon.polarity("I am not happy") < 0.0);
        assert!(lexicon.polarity("not sad, happy") > 0.0);
    }

    #[test]
    fn thresholds() {
        assert_eq!(LexiconTextAnalyzer::classify(0.5), ("Happy", 0.8));
        assert_eq!(LexiconTextAnalyzer::classify(0.3), ("Neutral", 0.6));
        assert_eq!(LexiconTextAnalyzer::classify(-0.31), ("Sad", 0.7));
    }

    #[test]
    fn lexicon_analyzer_distribution() {
        let mut analyzer = LexiconTextAnalyzer::new(Lexicon::default());
        let emotion = analyzer.analyze("great day").unwrap();
        assert_eq!(emotion.label, "Happy");
        let values = emotion.distribution.values();
        assert!((values[0] - 0.8).abs() < 1e-6);
        assert!((values[1] - 0.2 / 3.0).abs() < 1e-6);
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn lexicon_from_toml() {
        let lexicon = Lexicon::from_toml("[words]\nSunny = 2.0\ngloomy = -0.5\n").unwrap();
        assert_eq!(lexicon.polarity("sunny"), 1.0);
        assert_eq!(lexicon.polarity("gloomy"), -0.5);
        assert_eq!(lexicon.polarity("feliz"), 0.0);
    }

    #[test]
    fn random_analyzer_picks_top_label() {
        let mut analyzer = RandomTextAnalyzer::with_seed(42);
        let emotion = analyzer.analyze("anything").unwrap();
        let (label, confidence) = emotion.distribution.top().unwrap();
        assert_eq!(emotion.label, label);
        assert_eq!(emotion.confidence, confidence);
    }

    #[test]
    fn session_ignores_blank_messages() {
        let mut session = ChatSession::new(Box::new(RandomTextAnalyzer::with_seed(1)), 10);
        assert!(session.submit("   ").unwrap().is_none());
        assert!(session.log().is_empty());
    }

    #[test]
    fn session_replies_to_messages() {
        let mut session =
            ChatSession::new(Box::new(LexiconTextAnalyzer::new(Lexicon::default())), 10);
        let distribution = session.submit("me siento triste").unwrap().unwrap();
        assert_eq!(distribution.top(), Some(("Sad", 0.7)));
        let lines: Vec<_> = session.log().iter().map(ChatMessage::display).collect();
        assert_eq!(
            lines,
            vec![
                "You: me siento triste".to_string(),
                "MindCare: I detect Sad (Confidence: 70%)".to_string(),
            ]
        );
    }
}
