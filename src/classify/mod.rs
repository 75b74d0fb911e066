//! Release-label classification
//!
//! Turns a free-text release label such as
//! `"Movie 2160p HEVC HDR10 Dolby Vision | MVO, Sub: Russian, English"` into
//! structured metadata. Classification is a pure function of the label, the
//! size text and the runtime: no I/O and no state carried between calls.
//!
//! Rule semantics:
//! - categories are scanned in a fixed order, matches left to right;
//! - one case-insensitive "seen" set spans every category, so a token claimed
//!   by an earlier category is never reprocessed by a later one;
//! - resolution keeps the *last* match;
//! - subtitle tags share the audio tag list.

pub mod rules;
pub mod size;

pub use rules::{standard_rules, Rule, RuleCategory};
pub use size::{calculate_bitrate, parse_size_to_bytes};

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Resolution value used when the label names none
pub const UNKNOWN_RESOLUTION: &str = "N/A";

/// Video codec detected in a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Hevc,
}

impl Codec {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "H.264" => Some(Self::H264),
            "HEVC" => Some(Self::Hevc),
            _ => None,
        }
    }
}

/// Dynamic range of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HdrType {
    #[default]
    Sdr,
    Hdr,
    DolbyVision,
}

impl HdrType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Sdr => "SDR",
            Self::Hdr => "HDR",
            Self::DolbyVision => "Dolby Vision",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "SDR" => Some(Self::Sdr),
            "HDR" => Some(Self::Hdr),
            "Dolby Vision" => Some(Self::DolbyVision),
            _ => None,
        }
    }
}

/// Structured attributes derived from a release label
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedMetadata {
    pub resolution: String,
    pub codec: Option<Codec>,
    pub hdr_type: HdrType,
    /// Audio channel layouts, audio tracks and `Sub: …` tags, in first-seen order
    pub audio_tags: Vec<String>,
    /// Quality markers the HDR type was derived from
    pub quality_tags: Vec<String>,
    pub size_bytes: i64,
    pub bitrate_mbps: Option<f64>,
}

impl Default for ClassifiedMetadata {
    fn default() -> Self {
        Self {
            resolution: UNKNOWN_RESOLUTION.to_string(),
            codec: None,
            hdr_type: HdrType::Sdr,
            audio_tags: Vec::new(),
            quality_tags: Vec::new(),
            size_bytes: 0,
            bitrate_mbps: None,
        }
    }
}

impl ClassifiedMetadata {
    /// Audio tags joined the way they are stored and displayed
    pub fn audio_summary(&self) -> String {
        self.audio_tags.join(" | ")
    }
}

static HEVC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)x265|h265|hevc").unwrap());

static H264_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)x264|h264|avc").unwrap());

static SUBTITLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,+]").unwrap());

static INFO_HASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"btih:([a-zA-Z0-9]{40})").unwrap());

/// Applies an ordered rule table to release labels
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    rules: &'a [Rule],
}

impl Classifier<'static> {
    /// Classifier over the built-in rule table
    pub fn standard() -> Self {
        Self {
            rules: standard_rules(),
        }
    }
}

impl<'a> Classifier<'a> {
    /// Classifier over a caller-supplied rule table, evaluated in slice order
    pub fn with_rules(rules: &'a [Rule]) -> Self {
        Self { rules }
    }

    /// Classifies one label
    pub fn classify(
        &self,
        label: &str,
        size_text: &str,
        runtime_minutes: Option<i64>,
    ) -> ClassifiedMetadata {
        let mut result = ClassifiedMetadata::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut resolution: Option<String> = None;

        for rule in self.rules {
            for caps in rule.pattern.captures_iter(label) {
                if rule.category == RuleCategory::Subtitles {
                    let inner = caps.get(1).map_or("", |m| m.as_str());
                    for fragment in SUBTITLE_SEPARATOR.split(inner) {
                        let tag = canonical_subtitle_tag(fragment);
                        if seen.insert(tag.to_lowercase()) {
                            result.audio_tags.push(tag);
                        }
                    }
                    continue;
                }

                let token = caps[0].trim().to_string();
                if !seen.insert(token.to_lowercase()) {
                    continue;
                }

                match rule.category {
                    RuleCategory::Resolution => resolution = Some(token),
                    RuleCategory::Quality => result.quality_tags.push(token),
                    RuleCategory::AudioChannels | RuleCategory::AudioTrack => {
                        result.audio_tags.push(token)
                    }
                    RuleCategory::Subtitles => {}
                }
            }
        }

        result.resolution = match resolution {
            Some(r) if r.eq_ignore_ascii_case("4k") => "4K".to_string(),
            Some(r) if !r.is_empty() => r,
            _ => UNKNOWN_RESOLUTION.to_string(),
        };
        result.hdr_type = hdr_type_of(&result.quality_tags);
        result.codec = codec_of(label);
        result.size_bytes = parse_size_to_bytes(size_text);
        result.bitrate_mbps = calculate_bitrate(result.size_bytes, runtime_minutes);

        result
    }
}

/// Classifies a label with the built-in rule table
///
/// # Example
///
/// ```
/// use catalog_sync::classify::{classify, Codec, HdrType};
///
/// let meta = classify("Movie 1080p 2160p HEVC HDR10", "10 GB", Some(120));
/// assert_eq!(meta.resolution, "2160p");
/// assert_eq!(meta.codec, Some(Codec::Hevc));
/// assert_eq!(meta.hdr_type, HdrType::Hdr);
/// ```
pub fn classify(label: &str, size_text: &str, runtime_minutes: Option<i64>) -> ClassifiedMetadata {
    Classifier::standard().classify(label, size_text, runtime_minutes)
}

fn canonical_subtitle_tag(fragment: &str) -> String {
    let lower = fragment.to_lowercase();
    if lower.contains("rus") {
        "Sub: Rus".to_string()
    } else if lower.contains("eng") {
        "Sub: Eng".to_string()
    } else {
        format!("Sub: {}", fragment.trim())
    }
}

fn hdr_type_of(quality_tags: &[String]) -> HdrType {
    let combined = quality_tags.join(" ").to_uppercase();
    if combined.contains("DOLBY") || combined.contains("DV") {
        HdrType::DolbyVision
    } else if combined.contains("HDR") {
        HdrType::Hdr
    } else {
        HdrType::Sdr
    }
}

fn codec_of(label: &str) -> Option<Codec> {
    if HEVC_PATTERN.is_match(label) {
        Some(Codec::Hevc)
    } else if H264_PATTERN.is_match(label) {
        Some(Codec::H264)
    } else {
        None
    }
}

/// Extracts the upper-cased BitTorrent info-hash from a magnet link
pub fn info_hash(magnet: &str) -> Option<String> {
    INFO_HASH_PATTERN
        .captures(magnet)
        .map(|caps| caps[1].to_uppercase())
}

/// Stable key for a classified release
///
/// The magnet's info-hash when there is one, otherwise a SHA-256 digest of the
/// fields that identify the release.
pub fn content_hash(
    external_id: i64,
    kind: &str,
    label: &str,
    size_text: &str,
    magnet: Option<&str>,
) -> String {
    if let Some(hash) = magnet.and_then(info_hash) {
        return hash;
    }

    let mut hasher = Sha256::new();
    hasher.update(external_id.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    hasher.update(size_text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: i64 = 1024 * 1024 * 1024;

    #[test]
    fn test_last_resolution_wins() {
        let meta = classify("Movie 1080p 2160p HEVC HDR10", "10 GB", Some(120));
        assert_eq!(meta.resolution, "2160p");
        assert_eq!(meta.codec, Some(Codec::Hevc));
        assert_eq!(meta.hdr_type, HdrType::Hdr);
        assert_eq!(meta.size_bytes, 10 * GIB);

        let expected = ((10 * GIB) as f64 * 8.0 / (120.0 * 60.0) / 1e6 * 100.0).round() / 100.0;
        assert_eq!(meta.bitrate_mbps, Some(expected));
    }

    #[test]
    fn test_dolby_vision_without_size() {
        let meta = classify("Film Dolby Vision x265", "0 MB", Some(90));
        assert_eq!(meta.hdr_type, HdrType::DolbyVision);
        assert_eq!(meta.codec, Some(Codec::Hevc));
        assert_eq!(meta.size_bytes, 0);
        assert_eq!(meta.bitrate_mbps, None);
    }

    #[test]
    fn test_repeated_resolution_is_deduped() {
        let meta = classify("1080p 720p 1080P", "", None);
        // the second 1080p is already seen, so 720p remains the last new match
        assert_eq!(meta.resolution, "720p");
    }

    #[test]
    fn test_4k_normalized() {
        assert_eq!(classify("Show 4k WEB", "", None).resolution, "4K");
        assert_eq!(classify("no resolution here", "", None).resolution, "N/A");
    }

    #[test]
    fn test_defaults() {
        let meta = classify("", "", None);
        assert_eq!(meta, ClassifiedMetadata::default());
        assert_eq!(meta.hdr_type, HdrType::Sdr);
        assert_eq!(meta.codec, None);
    }

    #[test]
    fn test_audio_tags_in_first_seen_order() {
        let meta = classify("Film 1080p 5.1 MVO LostFilm ENG mvo", "", None);
        assert_eq!(meta.audio_tags, vec!["5.1", "MVO", "LostFilm", "ENG"]);
    }

    #[test]
    fn test_subtitles_merge_into_audio_tags() {
        let meta = classify("Film DUB Sub: Russian, English, Deutsch", "", None);
        assert_eq!(
            meta.audio_tags,
            vec!["DUB", "Sub: Rus", "Sub: Eng", "Sub: Deutsch"]
        );
    }

    #[test]
    fn test_bare_language_codes_count_as_audio_tracks() {
        // the audio-track rule runs first and claims `rus` and `eng` verbatim
        let meta = classify("Film DUB Sub: rus, eng, Deutsch", "", None);
        assert_eq!(
            meta.audio_tags,
            vec!["DUB", "rus", "eng", "Sub: Rus", "Sub: Eng", "Sub: Deutsch"]
        );
    }

    #[test]
    fn test_subtitle_parenthesized_form() {
        let meta = classify("Film Sub(Russian+English+Russian)", "", None);
        assert_eq!(meta.audio_tags, vec!["Sub: Rus", "Sub: Eng"]);
    }

    #[test]
    fn test_cross_category_dedup() {
        let rules = vec![
            Rule::new(RuleCategory::Quality, r"\b(HDR)\b").unwrap(),
            Rule::new(RuleCategory::AudioTrack, r"\b(HDR|DUB)\b").unwrap(),
        ];
        let classifier = Classifier::with_rules(&rules);
        let meta = classifier.classify("Film HDR DUB", "", None);

        assert_eq!(meta.quality_tags, vec!["HDR"]);
        assert_eq!(meta.audio_tags, vec!["DUB"]);
    }

    #[test]
    fn test_hdr_precedence() {
        assert_eq!(classify("HDR10 DV", "", None).hdr_type, HdrType::DolbyVision);
        assert_eq!(classify("HDR10+ WEB", "", None).hdr_type, HdrType::Hdr);
        assert_eq!(classify("BluRay 1080p", "", None).hdr_type, HdrType::Sdr);
    }

    #[test]
    fn test_codec_from_full_label() {
        assert_eq!(classify("Film.H264.mkv", "", None).codec, Some(Codec::H264));
        assert_eq!(classify("Film AVC Remux", "", None).codec, Some(Codec::H264));
        assert_eq!(classify("Film x265 x264", "", None).codec, Some(Codec::Hevc));
        assert_eq!(classify("Film XviD", "", None).codec, None);
    }

    #[test]
    fn test_info_hash_extraction() {
        let magnet = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=film";
        assert_eq!(
            info_hash(magnet).as_deref(),
            Some("0123456789ABCDEF0123456789ABCDEF01234567")
        );
        assert_eq!(info_hash("magnet:?xt=urn:btih:short"), None);
    }

    #[test]
    fn test_content_hash_prefers_info_hash() {
        let magnet = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";
        let hash = content_hash(1, "movie", "Film", "1 GB", Some(magnet));
        assert_eq!(hash, "0123456789ABCDEF0123456789ABCDEF01234567");
    }

    #[test]
    fn test_content_hash_fallback_is_stable() {
        let a = content_hash(1, "movie", "Film 1080p", "1 GB", None);
        let b = content_hash(1, "movie", "Film 1080p", "1 GB", None);
        let c = content_hash(1, "tv", "Film 1080p", "1 GB", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
