use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::quality::CategoryValues;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub postprocess: PostProcessConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolved database location, falling back to `~/.casepress/data/casepress.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            scheduler: SchedulerConfig::default(),
            chunking: ChunkingConfig::default(),
            generation: GenerationConfig::default(),
            quality: QualityConfig::default(),
            postprocess: PostProcessConfig::default(),
            privacy: PrivacyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_concurrent() -> usize {
    3
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length, in characters.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

fn default_max_chunk_size() -> usize {
    25_000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Name of the environment variable that holds the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    16_384
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

impl GenerationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            call_timeout_secs: default_call_timeout_secs(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            api_version: default_api_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_thresholds")]
    pub thresholds: CategoryValues<u8>,
    #[serde(default = "default_weights")]
    pub weights: CategoryValues<f64>,
    #[serde(default)]
    pub targets: ContentTargets,
    #[serde(default)]
    pub lexicon: Lexicon,
}

fn default_thresholds() -> CategoryValues<u8> {
    CategoryValues::uniform(70)
}

fn default_weights() -> CategoryValues<f64> {
    CategoryValues {
        structure: 0.30,
        discoverability: 0.30,
        readability: 0.20,
        trust: 0.20,
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            weights: default_weights(),
            targets: ContentTargets::default(),
            lexicon: Lexicon::default(),
        }
    }
}

/// Numeric targets the individual checks score against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTargets {
    pub min_word_count: usize,
    pub target_word_count: usize,
    pub min_h2: usize,
    pub min_h3: usize,
    pub min_paragraphs: usize,
    pub min_faq: usize,
    pub min_lists: usize,
    pub max_title_length: usize,
    pub min_meta_length: usize,
    pub max_meta_length: usize,
    pub min_keyword_density: f64,
    pub max_keyword_density: f64,
    pub min_secondary_coverage: u8,
    pub ideal_sentence_words: f64,
    pub max_sentence_words: f64,
    pub long_paragraph_words: usize,
    pub min_reading_minutes: usize,
    pub max_reading_minutes: usize,
    pub min_transition_words: usize,
    pub min_law_citations: usize,
    pub min_precedents: usize,
    pub min_expert_terms: usize,
    pub max_placeholders: usize,
}

impl Default for ContentTargets {
    fn default() -> Self {
        Self {
            min_word_count: 1200,
            target_word_count: 1800,
            min_h2: 5,
            min_h3: 3,
            min_paragraphs: 10,
            min_faq: 5,
            min_lists: 2,
            max_title_length: 60,
            min_meta_length: 120,
            max_meta_length: 160,
            min_keyword_density: 0.5,
            max_keyword_density: 2.5,
            min_secondary_coverage: 70,
            ideal_sentence_words: 20.0,
            max_sentence_words: 25.0,
            long_paragraph_words: 150,
            min_reading_minutes: 5,
            max_reading_minutes: 15,
            min_transition_words: 5,
            min_law_citations: 3,
            min_precedents: 1,
            min_expert_terms: 5,
            max_placeholders: 5,
        }
    }
}

/// Phrase lists and patterns used by the content checks and post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    pub transition_words: Vec<String>,
    pub law_citation_patterns: Vec<String>,
    pub precedent_patterns: Vec<String>,
    pub disclaimer_phrases: Vec<String>,
    pub cta_phrases: Vec<String>,
    pub expert_terms: Vec<String>,
    pub placeholder_patterns: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            transition_words: strings(&[
                "לכן", "אולם", "עם זאת", "בנוסף", "כמו כן", "לעומת זאת", "בהתאם", "למרות",
                "יתרה מזאת", "בסיכום", "לסיכום", "ראשית", "שנית", "לבסוף", "מכאן", "אם כן",
                "כאמור", "למעשה",
            ]),
            law_citation_patterns: strings(&[
                r"חוק\s+\S+",
                r"סעיף\s+\d+",
                r"תקנה\s+\d+",
                r"פקודת\s+\S+",
            ]),
            precedent_patterns: strings(&[
                r#"ע"א\s+\d+"#,
                r#"ע"ע\s+\d+"#,
                r#"בג"ץ\s+\d+"#,
                r#"ת"א\s+\d+"#,
                r"תיק\s+\d+",
            ]),
            disclaimer_phrases: strings(&[
                "אין באמור",
                "אינו מהווה ייעוץ",
                "יש להיוועץ",
                "מומלץ להתייעץ",
                "אין לראות",
            ]),
            cta_phrases: strings(&["צרו קשר", "פנו אלינו", "התקשרו", "לייעוץ", "לפגישה"]),
            expert_terms: strings(&[
                "פיצויים", "נזק", "אחריות", "רשלנות", "התיישנות", "סמכות", "ערעור", "פסק דין",
                "בית משפט", "תובע", "נתבע", "עדות",
            ]),
            placeholder_patterns: strings(&[
                r"\[[^\]]*הוסר[^\]]*\]",
                r"(?i)\[[^\]]*removed[^\]]*\]",
                r"פלוני|אלמוני",
                r"XXX",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Appended to the content when no disclaimer phrase is present.
    pub disclaimer_block: String,
    /// Appended to the content when no call-to-action phrase is present.
    pub cta_block: String,
    pub title_max_length: usize,
    pub meta_description_max_length: usize,
    pub links: LinkConfig,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            disclaimer_block: "<div class=\"disclaimer\"><p><strong>הבהרה חשובה:</strong> המידע במאמר זה הוא למידע כללי בלבד ואינו מהווה ייעוץ משפטי. כל מקרה הוא ייחודי ודורש בחינה פרטנית.</p></div>".to_string(),
            cta_block: "<div class=\"cta\"><p>להתייעצות בנושא ספציפי, צרו קשר עם עורך דין מומחה בתחום.</p></div>".to_string(),
            title_max_length: 70,
            meta_description_max_length: 160,
            links: LinkConfig::default(),
        }
    }
}

/// A site path linked from the first body mention of `term`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLink {
    pub term: String,
    pub path: String,
}

/// An outside reference linked from the first body match of `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub pattern: String,
    pub url: String,
    pub title: String,
}

/// Links added to paragraph text after generation. Each target is linked
/// at most once; terms inside the focus keyword are never linked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub enabled: bool,
    pub max_internal: usize,
    pub max_external: usize,
    pub internal: Vec<InternalLink>,
    pub external: Vec<ExternalLink>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let internal = [
            ("נזיקין", "/נזיקין"),
            ("נזק גוף", "/נזק-גוף"),
            ("רשלנות רפואית", "/רשלנות-רפואית"),
            ("רשלנות", "/רשלנות"),
            ("תביעת פיצויים", "/פיצויים"),
            ("פיצויים", "/פיצויים"),
            ("ביטוח רכב", "/ביטוח-רכב"),
            ("ביטוח", "/ביטוח"),
            ("תאונת דרכים", "/תאונות-דרכים"),
            ("תאונות דרכים", "/תאונות-דרכים"),
            ("תאונת עבודה", "/תאונות-עבודה"),
            ("נזקי רכוש", "/נזקי-רכוש"),
        ];
        let external = [
            (r"סעיף \d+", "https://www.nevo.co.il", "נבו - המאגר המשפטי הישראלי"),
            ("פקודת", "https://www.nevo.co.il", "נבו - פקודות ודינים"),
            ("חוק", "https://www.nevo.co.il", "נבו - חוקי ישראל"),
        ];
        Self {
            enabled: true,
            max_internal: 5,
            max_external: 3,
            internal: internal
                .iter()
                .map(|(term, path)| InternalLink {
                    term: term.to_string(),
                    path: path.to_string(),
                })
                .collect(),
            external: external
                .iter()
                .map(|(pattern, url, title)| ExternalLink {
                    pattern: pattern.to_string(),
                    url: url.to_string(),
                    title: title.to_string(),
                })
                .collect(),
        }
    }
}

/// What happens to a draft that failed the leak check.
///
/// The item is marked failed and can never be published under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakPolicy {
    /// Keep the draft in the review slot so a human can redact it.
    #[default]
    RetainForReview,
    /// Drop the draft entirely.
    DiscardDraft,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivacyConfig {
    #[serde(default)]
    pub leak_policy: LeakPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
