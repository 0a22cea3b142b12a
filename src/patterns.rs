use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::MANIFEST_MARKER;

/// 规则在文本中定位候选地址的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    /// 绝对 http(s) 地址
    BareUrl,
    Quoted,
    /// `key: "value"` 或 `key = 'value'`，不区分大小写
    Assignment(&'static [&'static str]),
    JsonKey(&'static [&'static str]),
    Attribute(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct PatternRule {
    pub kind: MatcherKind,
    // 校验前先做百分号解码
    pub decode: bool,
}

impl PatternRule {
    pub const fn new(kind: MatcherKind, decode: bool) -> Self {
        Self { kind, decode }
    }

    fn pattern(&self) -> String {
        let value = r#"["']([^"']+\.m3u8[^"']*)["']"#;
        match self.kind {
            MatcherKind::BareUrl => r#"https?://[^"'\s<>)\]}\\]+\.m3u8[^"'\s<>)\]}\\]*"#.to_string(),
            MatcherKind::Quoted => value.to_string(),
            MatcherKind::Assignment(keys) => {
                format!(r"(?i)(?:{})\s*[:=]\s*{value}", alternation(keys))
            }
            MatcherKind::JsonKey(keys) => {
                format!(r#""(?:{})"\s*:\s*{value}"#, alternation(keys))
            }
            MatcherKind::Attribute(keys) => {
                format!(r"(?i)(?:^|[\s<])(?:{})\s*=\s*{value}", alternation(keys))
            }
        }
    }
}

fn alternation(keys: &[&str]) -> String {
    keys.iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|")
}

/// 编译后的有序规则表
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<(PatternRule, Regex)>,
    require_http: bool,
}

impl RuleSet {
    pub fn new(rules: &[PatternRule], require_http: bool) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| Regex::new(&rule.pattern()).map(|re| (*rule, re)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            require_http,
        })
    }

    /// 按规则顺序返回第一个有效候选
    pub fn first_match(&self, text: &str) -> Option<String> {
        self.candidates(text).next()
    }

    /// 所有有效候选，保持首次出现顺序并去重
    pub fn all_matches(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.candidates(text)
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    fn candidates<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        self.rules.iter().flat_map(move |(rule, re)| {
            re.captures_iter(text).filter_map(move |caps| {
                let raw = caps
                    .get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str())?;
                let candidate = normalize(raw, rule.decode);
                self.accepts(&candidate).then_some(candidate)
            })
        })
    }

    fn accepts(&self, candidate: &str) -> bool {
        if !candidate.contains(MANIFEST_MARKER) {
            return false;
        }
        !self.require_http || candidate.starts_with("http://") || candidate.starts_with("https://")
    }
}

/// 去掉引号、反转义，并按需进行百分号解码
fn normalize(raw: &str, decode: bool) -> String {
    let trimmed = raw.trim_matches(|c| c == '"' || c == '\'');
    let unescaped = trimmed
        .replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("&amp;", "&");
    if !decode {
        return unescaped;
    }
    // 解码失败时保留原文
    match urlencoding::decode(&unescaped) {
        Ok(Cow::Owned(decoded)) => decoded,
        _ => unescaped,
    }
}

/// 是否为格式正确的绝对 http(s) 清单地址
pub fn is_absolute_manifest_url(candidate: &str) -> bool {
    candidate.contains(MANIFEST_MARKER)
        && Url::parse(candidate)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false)
}

const API_KEYS: &[&str] = &["url", "src", "source", "manifest", "hls", "playlist"];

const PLAYER_VARIABLES: &[&str] = &[
    "url",
    "src",
    "source",
    "manifest",
    "hls",
    "playlist",
    "stream",
    "videoUrl",
    "video_url",
    "videoSrc",
    "video_src",
];

const MARKUP_JSON_KEYS: &[&str] = &["url", "src", "source", "manifest", "hls", "playlist", "stream"];

const DOM_ATTRIBUTES: &[&str] = &["data-src", "src", "href", "data-url", "data-source"];

pub const API_RULES: &[PatternRule] = &[
    PatternRule::new(MatcherKind::BareUrl, false),
    PatternRule::new(MatcherKind::JsonKey(API_KEYS), false),
];

/// 用于内联脚本和整个页面
pub const MARKUP_RULES: &[PatternRule] = &[
    PatternRule::new(MatcherKind::BareUrl, true),
    PatternRule::new(MatcherKind::Quoted, true),
    PatternRule::new(MatcherKind::Assignment(PLAYER_VARIABLES), true),
    PatternRule::new(MatcherKind::JsonKey(MARKUP_JSON_KEYS), true),
];

pub const ATTRIBUTE_RULES: &[PatternRule] = &[PatternRule::new(MatcherKind::Attribute(DOM_ATTRIBUTES), true)];

pub static API_MATCHER: LazyLock<RuleSet> =
    LazyLock::new(|| RuleSet::new(API_RULES, false).unwrap());

pub static MARKUP_MATCHER: LazyLock<RuleSet> =
    LazyLock::new(|| RuleSet::new(MARKUP_RULES, true).unwrap());

pub static ATTRIBUTE_MATCHER: LazyLock<RuleSet> =
    LazyLock::new(|| RuleSet::new(ATTRIBUTE_RULES, true).unwrap());

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap());

/// 提取页面中所有内联脚本的内容
pub fn script_blocks(html: &str) -> Vec<&str> {
    SCRIPT_BLOCK
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|body| !body.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_rules_find_bare_url_in_json() {
        let json = r#"{"data":{"url":"https://x/y.m3u8"}}"#;
        assert_eq!(API_MATCHER.first_match(json).as_deref(), Some("https://x/y.m3u8"));
    }

    #[test]
    fn api_rules_accept_relative_keyed_value() {
        let json = r#"{"hls":"/vod/1234/playlist.m3u8?token=a"}"#;
        assert_eq!(
            API_MATCHER.first_match(json).as_deref(),
            Some("/vod/1234/playlist.m3u8?token=a")
        );
    }

    #[test]
    fn markup_rules_require_http_scheme() {
        let script = r#"var cfg = { file: "/relative/index.m3u8" };"#;
        assert_eq!(MARKUP_MATCHER.first_match(script), None);
    }

    #[test]
    fn markup_rules_decode_percent_encoding() {
        let script = r#"player.load("https%3A%2F%2Fcdn.example%2Fa%2Findex.m3u8");"#;
        assert_eq!(
            MARKUP_MATCHER.first_match(script).as_deref(),
            Some("https://cdn.example/a/index.m3u8")
        );
    }

    #[test]
    fn markup_rules_unescape_json_slashes() {
        let script = r#"window.__DATA__ = {"videoUrl":"https:\/\/cdn.example\/v\/master.m3u8"};"#;
        assert_eq!(
            MARKUP_MATCHER.first_match(script).as_deref(),
            Some("https://cdn.example/v/master.m3u8")
        );
    }

    #[test]
    fn bare_url_stops_at_closing_bracket() {
        let text = "load(https://cdn.example/a.m3u8)";
        assert_eq!(
            MARKUP_MATCHER.first_match(text).as_deref(),
            Some("https://cdn.example/a.m3u8")
        );
    }

    #[test]
    fn all_matches_deduplicates_in_order() {
        let html = r#"
            <a href="https://b.example/2.m3u8">b</a>
            <video src="https://a.example/1.m3u8"></video>
            <a href="https://b.example/2.m3u8">again</a>
        "#;
        assert_eq!(
            MARKUP_MATCHER.all_matches(html),
            vec!["https://b.example/2.m3u8", "https://a.example/1.m3u8"]
        );
    }

    #[test]
    fn attribute_rules_read_data_src() {
        let html = r#"<div class="player" data-src="https://cdn.example/x.m3u8?a=1&amp;b=2"></div>"#;
        assert_eq!(
            ATTRIBUTE_MATCHER.first_match(html).as_deref(),
            Some("https://cdn.example/x.m3u8?a=1&b=2")
        );
    }

    #[test]
    fn script_blocks_skip_external_scripts() {
        let html = r#"<script src="/app.js"></script><SCRIPT type="text/javascript">var a = 1;</SCRIPT>"#;
        assert_eq!(script_blocks(html), vec!["var a = 1;"]);
    }

    #[test]
    fn absolute_manifest_predicate() {
        assert!(is_absolute_manifest_url("https://cdn.example/a.m3u8"));
        assert!(!is_absolute_manifest_url("/a.m3u8"));
        assert!(!is_absolute_manifest_url("ftp://cdn.example/a.m3u8"));
        assert!(!is_absolute_manifest_url("https://cdn.example/a.mp4"));
    }
}
