//! Ordered rule table for release-label classification
//!
//! Rules are evaluated category by category in the order returned by
//! [`standard_rules`]. That order is observable: the shared dedup set means a
//! token claimed by an earlier category is skipped by later ones.

use regex::Regex;
use std::sync::LazyLock;

/// What a rule's matches contribute to the classified metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    /// Single-valued; the last match in the label wins
    Resolution,
    /// Appended to the audio tag list
    AudioChannels,
    /// Collected to derive the HDR type
    Quality,
    /// Appended to the audio tag list
    AudioTrack,
    /// Capture group 1 is split into canonical `Sub: …` tags
    Subtitles,
}

/// A compiled pattern bound to the category its matches feed
#[derive(Debug, Clone)]
pub struct Rule {
    pub category: RuleCategory,
    pub pattern: Regex,
}

impl Rule {
    /// Compiles a rule; patterns are matched case-insensitively
    pub fn new(category: RuleCategory, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            pattern: Regex::new(&format!("(?i){}", pattern))?,
        })
    }
}

const RESOLUTION_PATTERN: &str = r"\b(3840x2160|4K|2160p|1920x1080|1080p|1280x720|720p)\b";

const AUDIO_CHANNELS_PATTERN: &str = r"\b(5\.1|7\.1)\b";

const QUALITY_PATTERN: &str =
    r"\b(HEVC|HDR10\+|HDR10|HDR|Dolby Vision|DV|BDRemux|BluRay|Web-DL|Hybrid|IMAX)\b";

// Dubbing studios and release groups, anime dubbers, single-voice authors,
// licensed distributors, then generic track markers.
const AUDIO_TRACK_PATTERN: &str = concat!(
    r"\b(",
    r"Red Head Sound|RHS|Bluebird|HDRezka|Rezka|Jaskier|",
    r"TVShows|NewStudio|BaibaKo|AlexFilm|LostFilm|Кубик в [Кк]убе|",
    r"Octopus|LineFilm|Cold Film|AlphaProject|TVG|Good People|",
    r"Pazl Voice|Ultradox|RuDub|Sound Film|ViruseProject|IdeaFilm|Novamedia|Кириллица|",
    r"Kerob|Sunshine Studio|NewComers|LakeFilms|HamsterStudio|Paramount Comedy|",
    r"Кураж-Бамбей|Kuraj-Bambey|Сыендук|Syenduk|",
    r"AniLibria|AniDUB|AnimeVost|SHIZA Project|Jam Club|Studio Band|Студийная Банда|",
    r"SovetRomantica|Kansai|AniStar|AniFilm|Dream Cast|AniMaunt|AniRise|Amazing Dubbing|",
    r"Гаврилов|Михалев|Володарский|Сербин|Живов|Пучков|Гоблин|Goblin|",
    r"Дохалов|Визгунов|Карцев|Иванов|Санаев|Есарев|Штейн|Либерти|Вартан|Горчаков|",
    r"Котов|Яковлев|Гланц|Glanz|",
    r"Пифагор|Flarrow Films|FF|Videofilm|Мосфильм|Невафильм|SDI Media|",
    r"Киномания|Tycoon|CPIG|Позитив|Видеосервис|Varus Video|West Video|",
    r"iTunes|Amedia|Netflix|",
    r"Дубляж|Dub|MVO|DVO|AVO|Original|ENG|RUS|UKR",
    r")\b",
);

const SUBTITLES_PATTERN: &str = r"Sub\s*[:(]\s*([^)]+)\)?";

static STANDARD_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(RuleCategory::Resolution, RESOLUTION_PATTERN).unwrap(),
        Rule::new(RuleCategory::AudioChannels, AUDIO_CHANNELS_PATTERN).unwrap(),
        Rule::new(RuleCategory::Quality, QUALITY_PATTERN).unwrap(),
        Rule::new(RuleCategory::AudioTrack, AUDIO_TRACK_PATTERN).unwrap(),
        Rule::new(RuleCategory::Subtitles, SUBTITLES_PATTERN).unwrap(),
    ]
});

/// The built-in rule table, in evaluation order
pub fn standard_rules() -> &'static [Rule] {
    &STANDARD_RULES
}
