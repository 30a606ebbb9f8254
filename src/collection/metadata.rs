//! Metadata file parser / 元数据文件解析器
//!
//! Line-oriented format written by the downloader next to each work:
//!
//! ```text
//! Title
//! Evening Sunset
//!
//! Tags
//! #landscape
//! #sky
//!
//! ```
//!
//! Every field starts with a label line. Array fields (`Tags`) take one value
//! per following non-empty line. Scalar fields take every following line up to
//! the next label, minus the blank separator line right before it.
//!
//! Parsing never fails: malformed values become absent fields.
//! 解析永不失败，格式错误的值视为缺失

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{AgeRestriction, Dimensions};

/// Fields a metadata file can carry / 元数据字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: Option<u64>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub age_restriction: Option<AgeRestriction>,
    pub ai: Option<bool>,
    pub creator_name: Option<String>,
    pub creator_id: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub dimensions: Option<Dimensions>,
    pub bookmarks: Option<u64>,
    pub upload_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One value per line / 每行一个值
    Array,
    /// Free text, possibly multi-line / 多行文本
    Scalar,
}

/// Mapping from a label line to the field it fills / 标签到字段的映射
pub struct FieldSpec {
    pub label: &'static str,
    pub kind: FieldKind,
    /// Transform the raw value and store it (scalar: set, array: append)
    apply: fn(&mut Metadata, &str),
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for FieldSpec {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl FieldSpec {
    const fn scalar(label: &'static str, apply: fn(&mut Metadata, &str)) -> Self {
        Self { label, kind: FieldKind::Scalar, apply }
    }

    const fn array(label: &'static str, apply: fn(&mut Metadata, &str)) -> Self {
        Self { label, kind: FieldKind::Array, apply }
    }

    pub fn is_array(&self) -> bool {
        self.kind == FieldKind::Array
    }
}

/// Known labels, in the order the downloader writes them / 已知标签
pub static FIELD_SPECS: [FieldSpec; 14] = [
    FieldSpec::scalar("ID", |m, v| m.id = parse_unsigned(v)),
    FieldSpec::scalar("URL", |m, v| m.url = non_empty(v)),
    FieldSpec::scalar("Original", |m, v| m.image_url = non_empty(v)),
    FieldSpec::scalar("Thumbnail", |m, v| m.thumbnail_url = non_empty(v)),
    FieldSpec::scalar("xRestrict", |m, v| m.age_restriction = AgeRestriction::from_label(v)),
    FieldSpec::scalar("AI", |m, v| m.ai = parse_yes_no(v)),
    FieldSpec::scalar("User", |m, v| m.creator_name = non_empty(v)),
    FieldSpec::scalar("UserID", |m, v| m.creator_id = parse_unsigned(v)),
    FieldSpec::scalar("Title", |m, v| m.title = non_empty(v)),
    FieldSpec::scalar("Description", |m, v| m.description = non_empty(v)),
    FieldSpec::array("Tags", |m, v| {
        m.tags.get_or_insert_with(Vec::new).push(v.replacen('#', "", 1))
    }),
    FieldSpec::scalar("Size", |m, v| m.dimensions = parse_size(v)),
    FieldSpec::scalar("Bookmark", |m, v| m.bookmarks = parse_unsigned(v)),
    FieldSpec::scalar("Date", |m, v| m.upload_time = parse_date(v)),
];

/// Look up the `FieldSpec` of a label line / 查找标签对应的字段
pub fn field_spec(line: &str) -> Option<&'static FieldSpec> {
    let label = line.trim();
    FIELD_SPECS.iter().find(|spec| spec.label == label)
}

/// Parser state / 解析状态
#[derive(Debug, Clone, PartialEq)]
pub enum ParserState<'a> {
    NoField,
    InArray(&'static FieldSpec),
    InScalar {
        spec: &'static FieldSpec,
        buffer: Vec<&'a str>,
    },
}

/// Value produced by a transition / 状态转移产生的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// A complete scalar body, not yet transformed
    Scalar(&'static str, String),
    /// One array entry, not yet transformed
    Entry(&'static str, String),
}

/// Join a scalar buffer, dropping the trailing separator line / 合并多行缓冲区
fn flush(spec: &'static FieldSpec, buffer: &[&str]) -> Commit {
    let body = &buffer[..buffer.len().saturating_sub(1)];
    Commit::Scalar(spec.label, body.join("\n"))
}

/// Pure transition for one line / 单行状态转移
///
/// `is_last` marks the final line of the file: an open scalar field is
/// flushed before that line is looked at, exactly like a following label.
pub fn transition<'a>(
    state: ParserState<'a>,
    line: &'a str,
    is_last: bool,
) -> (ParserState<'a>, Vec<Commit>) {
    let mut commits = Vec::new();
    let label = field_spec(line);

    let state = match state {
        ParserState::InScalar { spec, buffer } if label.is_some() || is_last => {
            commits.push(flush(spec, &buffer));
            ParserState::InScalar { spec, buffer: Vec::new() }
        }
        other => other,
    };

    if let Some(spec) = label {
        let next = match spec.kind {
            FieldKind::Array => ParserState::InArray(spec),
            FieldKind::Scalar => ParserState::InScalar { spec, buffer: Vec::new() },
        };
        return (next, commits);
    }

    let next = match state {
        ParserState::NoField => ParserState::NoField,
        ParserState::InArray(spec) => {
            if !line.is_empty() {
                commits.push(Commit::Entry(spec.label, line.to_string()));
            }
            ParserState::InArray(spec)
        }
        ParserState::InScalar { spec, mut buffer } => {
            buffer.push(line);
            ParserState::InScalar { spec, buffer }
        }
    };
    (next, commits)
}

/// Parse the content of a metadata file / 解析元数据文件内容
pub fn parse_metadata(content: &str) -> Metadata {
    let mut metadata = Metadata::default();
    let lines: Vec<&str> = content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let last = lines.len() - 1;

    let mut state = ParserState::NoField;
    for (index, line) in lines.into_iter().enumerate() {
        let (next, commits) = transition(state, line, index == last);
        for commit in commits {
            apply_commit(&mut metadata, commit);
        }
        state = next;
    }

    metadata
}

fn apply_commit(metadata: &mut Metadata, commit: Commit) {
    let (label, value) = match &commit {
        Commit::Scalar(label, value) | Commit::Entry(label, value) => (*label, value.as_str()),
    };
    if let Some(spec) = field_spec(label) {
        (spec.apply)(metadata, value);
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_unsigned(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

fn parse_yes_no(value: &str) -> Option<bool> {
    match value.trim() {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

/// `"1200x800"` -> width 1200, height 800
fn parse_size(value: &str) -> Option<Dimensions> {
    let parts: Vec<&str> = value.split('x').collect();
    let [width, height] = parts.as_slice() else {
        return None;
    };
    Some(Dimensions {
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}

/// Normalize the upload date to ISO-8601 / 将日期规范为 ISO-8601
fn parse_date(value: &str) -> Option<String> {
    let value = value.trim();
    if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
        return Some(date_time.to_rfc3339());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(value, format) {
            return Some(date_time.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "ID\n100\n\nURL\nhttps://example.com/artworks/100\n\nOriginal\nhttps://example.com/img/100_p0.jpg\n\nThumbnail\nhttps://example.com/thumb/100.jpg\n\nxRestrict\nR-18\n\nAI\nNo\n\nUser\nAlice\n\nUserID\n1\n\nTitle\nEvening Sunset\n\nDescription\nfirst line\nsecond line\n\nTags\n#landscape\n#sky\n\nSize\n1200x800\n\nBookmark\n42\n\nDate\n2023-05-01T12:30:00+09:00\n\n";

    #[test]
    fn test_parse_full_file() {
        let metadata = parse_metadata(FULL);
        assert_eq!(metadata.id, Some(100));
        assert_eq!(metadata.url.as_deref(), Some("https://example.com/artworks/100"));
        assert_eq!(metadata.image_url.as_deref(), Some("https://example.com/img/100_p0.jpg"));
        assert_eq!(metadata.thumbnail_url.as_deref(), Some("https://example.com/thumb/100.jpg"));
        assert_eq!(metadata.age_restriction, Some(AgeRestriction::R18));
        assert_eq!(metadata.ai, Some(false));
        assert_eq!(metadata.creator_name.as_deref(), Some("Alice"));
        assert_eq!(metadata.creator_id, Some(1));
        assert_eq!(metadata.title.as_deref(), Some("Evening Sunset"));
        assert_eq!(metadata.description.as_deref(), Some("first line\nsecond line"));
        assert_eq!(metadata.tags, Some(vec!["landscape".to_string(), "sky".to_string()]));
        assert_eq!(metadata.dimensions, Some(Dimensions { width: 1200, height: 800 }));
        assert_eq!(metadata.bookmarks, Some(42));
        assert_eq!(metadata.upload_time.as_deref(), Some("2023-05-01T12:30:00+09:00"));
    }

    #[test]
    fn test_parse_example_file() {
        let metadata = parse_metadata("Title\nEvening Sunset\n\nTags\nlandscape\nsky\n\n");
        assert_eq!(metadata.title.as_deref(), Some("Evening Sunset"));
        assert_eq!(metadata.tags, Some(vec!["landscape".to_string(), "sky".to_string()]));
        assert_eq!(metadata.description, None);
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_metadata(FULL), parse_metadata(FULL));
    }

    #[test]
    fn test_last_field_flushed_at_end_of_file() {
        let metadata = parse_metadata("Tags\na\n\nBookmark\n7\n\n");
        assert_eq!(metadata.bookmarks, Some(7));
        assert_eq!(metadata.tags, Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_field_without_body() {
        let metadata = parse_metadata("Title\n\nBookmark\n3\n\n");
        assert_eq!(metadata.title, None);
        assert_eq!(metadata.bookmarks, Some(3));

        let metadata = parse_metadata("Tags\nBookmark\n3\n\n");
        assert_eq!(metadata.tags, None);
        assert_eq!(metadata.bookmarks, Some(3));
    }

    #[test]
    fn test_unknown_labels() {
        // 未打开字段时丢弃
        let metadata = parse_metadata("Unknown\nvalue\n\nTitle\nT\n\n");
        assert_eq!(metadata.title.as_deref(), Some("T"));

        // 打开字段时作为正文
        let metadata = parse_metadata("Description\nhello\nUnknown\nworld\n\nTitle\nT\n\n");
        assert_eq!(metadata.description.as_deref(), Some("hello\nUnknown\nworld"));
    }

    #[test]
    fn test_malformed_values_are_absent() {
        let metadata = parse_metadata(
            "ID\nabc\n\nxRestrict\nSomething\n\nAI\nMaybe\n\nSize\n12x\n\nBookmark\n-1\n\nDate\nyesterday\n\n",
        );
        assert_eq!(metadata, Metadata::default());
    }

    #[test]
    fn test_crlf_lines() {
        let metadata = parse_metadata("Title\r\nSunset\r\n\r\nTags\r\nsky\r\n\r\n");
        assert_eq!(metadata.title.as_deref(), Some("Sunset"));
        assert_eq!(metadata.tags, Some(vec!["sky".to_string()]));
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(parse_metadata(""), Metadata::default());
    }

    #[test]
    fn test_transition_flushes_on_label() {
        let title = field_spec("Title").unwrap();
        let state = ParserState::InScalar { spec: title, buffer: vec!["Sunset", ""] };
        let (next, commits) = transition(state, "Tags", false);
        assert_eq!(commits, vec![Commit::Scalar("Title", "Sunset".to_string())]);
        assert_eq!(next, ParserState::InArray(field_spec("Tags").unwrap()));
    }

    #[test]
    fn test_transition_flushes_before_last_line() {
        let title = field_spec("Title").unwrap();
        let state = ParserState::InScalar { spec: title, buffer: vec!["a", "b"] };
        let (_, commits) = transition(state, "", true);
        assert_eq!(commits, vec![Commit::Scalar("Title", "a".to_string())]);
    }

    #[test]
    fn test_transition_array_skips_empty_lines() {
        let tags = field_spec("Tags").unwrap();
        let (state, commits) = transition(ParserState::InArray(tags), "", false);
        assert!(commits.is_empty());
        let (_, commits) = transition(state, "#sky", false);
        assert_eq!(commits, vec![Commit::Entry("Tags", "#sky".to_string())]);
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date("2023-05-01 12:30:00").as_deref(), Some("2023-05-01T12:30:00"));
        assert_eq!(parse_date("2023-05-01").as_deref(), Some("2023-05-01"));
        assert_eq!(parse_date("not a date"), None);
    }
}
