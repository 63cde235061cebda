//! 模式编译
//!
//! - Literal 模式：转义后交给 regex，保证两种模式走同一套扫描逻辑
//! - wholeWord：两端加 `\b`
//! - 编译失败统一成 PatternError，"too big" 类错误归一为清晰的提示

use super::search::Match;
use crate::models::{Point, Range};
use memchr::memchr_iter;
use regex::{NoExpand, Regex, RegexBuilder};
use std::fmt;

/// regex 默认的编译大小上限
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

/// 行文本超过该长度时截取匹配附近的片段
const MAX_LINE_TEXT_CHARS: usize = 240;
const LINE_TEXT_LEAD_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternErrorKind {
    Syntax,
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub pattern: String,
    pub kind: PatternErrorKind,
    pub message: String,
}

impl PatternError {
    pub fn from_regex(pattern: &str, err: &regex::Error) -> Self {
        match err {
            regex::Error::CompiledTooBig(_) => Self {
                pattern: pattern.to_string(),
                kind: PatternErrorKind::TooLarge,
                message: "regular expression is too large".to_string(),
            },
            other => Self {
                pattern: pattern.to_string(),
                kind: PatternErrorKind::Syntax,
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid regex: {}", self.message)
    }
}

impl std::error::Error for PatternError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub unicode: bool,
    pub size_limit: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            use_regex: false,
            case_sensitive: false,
            whole_word: false,
            unicode: true,
            size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

pub struct PatternCompiler;

impl PatternCompiler {
    pub fn compile(pattern: &str, options: &CompileOptions) -> Result<Matcher, PatternError> {
        let mut source = if options.use_regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        if options.whole_word {
            source = format!(r"\b(?:{})\b", source);
        }

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.case_sensitive)
            .multi_line(true)
            .crlf(true)
            .unicode(options.unicode)
            .size_limit(options.size_limit)
            .build()
            .map_err(|e| PatternError::from_regex(pattern, &e))?;

        Ok(Matcher {
            regex,
            pattern: pattern.to_string(),
            options: *options,
        })
    }
}

/// 编译好的匹配器，零长度匹配一律跳过
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
    pattern: String,
    options: CompileOptions,
}

impl Matcher {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn test(&self, text: &str) -> bool {
        self.find_at(text, 0).is_some()
    }

    /// 从 `start` 开始找第一个非空匹配（字节区间）
    pub fn find_at(&self, haystack: &str, start: usize) -> Option<std::ops::Range<usize>> {
        let mut pos = start;
        while pos <= haystack.len() {
            let m = self.regex.find_at(haystack, pos)?;
            if m.start() < m.end() {
                return Some(m.range());
            }
            pos = next_char_boundary(haystack, m.end());
        }
        None
    }

    /// `[start, end)` 内的全部匹配；`end` 之后的文本不可见，`start` 之前的文本只作为断言上下文
    pub fn find_in(&self, haystack: &str, start: usize, end: usize) -> Vec<std::ops::Range<usize>> {
        let end = end.min(haystack.len());
        let window = &haystack[..end];
        let mut found = Vec::new();
        let mut pos = start;
        while let Some(range) = self.find_at(window, pos) {
            pos = range.end;
            found.push(range);
        }
        found
    }

    /// 计算单个匹配文本的替换结果
    pub fn replace(&self, matched_text: &str, replacement: &str, expand_references: bool) -> String {
        if expand_references {
            self.regex.replace(matched_text, replacement).into_owned()
        } else {
            self.regex
                .replace(matched_text, NoExpand(replacement))
                .into_owned()
        }
    }

    /// 整段文本替换，返回 (新文本, 替换次数)
    pub fn replace_all(&self, text: &str, replacement: &str, expand_references: bool) -> (String, usize) {
        let mut out = String::with_capacity(text.len());
        let mut last = 0usize;
        let mut count = 0usize;
        let mut pos = 0usize;
        while let Some(range) = self.find_at(text, pos) {
            out.push_str(&text[last..range.start]);
            out.push_str(&self.replace(&text[range.clone()], replacement, expand_references));
            last = range.end;
            pos = range.end;
            count += 1;
        }
        out.push_str(&text[last..]);
        (out, count)
    }

    /// 扫描整段文本，生成带上下文行的匹配
    pub fn scan_text(&self, text: &str, leading: usize, trailing: usize) -> Vec<Match> {
        let lines = LineIndex::new(text);
        let mut pos = 0usize;
        let mut matches = Vec::new();

        while let Some(range) = self.find_at(text, pos) {
            pos = range.end;

            let start_row = lines.row_of(range.start);
            let end_row = lines.row_of(range.end);
            let line = lines.line(text, start_row);
            let start_col = text[lines.start_of(start_row)..range.start].chars().count();
            let end_col = text[lines.start_of(end_row)..range.end].chars().count();

            let (line_text, line_text_offset) = clip_line(line, start_col);

            let leading_context_lines = (start_row.saturating_sub(leading)..start_row)
                .map(|row| lines.line(text, row).to_string())
                .collect();
            let trailing_end = (end_row + 1 + trailing).min(lines.len());
            let trailing_context_lines = (end_row + 1..trailing_end)
                .map(|row| lines.line(text, row).to_string())
                .collect();

            matches.push(Match {
                range: Range::new(
                    Point::new(start_row, start_col),
                    Point::new(end_row, end_col),
                ),
                match_text: text[range].to_string(),
                line_text,
                line_text_offset,
                leading_context_lines,
                trailing_context_lines,
            });
        }

        matches
    }
}

fn next_char_boundary(text: &str, pos: usize) -> usize {
    let mut next = pos + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next
}

fn clip_line(line: &str, match_col: usize) -> (String, usize) {
    let len = line.chars().count();
    if len <= MAX_LINE_TEXT_CHARS {
        return (line.to_string(), 0);
    }
    let offset = match_col
        .saturating_sub(LINE_TEXT_LEAD_CHARS)
        .min(len - MAX_LINE_TEXT_CHARS);
    let clipped = line.chars().skip(offset).take(MAX_LINE_TEXT_CHARS).collect();
    (clipped, offset)
}

/// 行起点索引（字节）
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = Vec::with_capacity(text.len() / 32 + 1);
        starts.push(0);
        starts.extend(memchr_iter(b'\n', text.as_bytes()).map(|i| i + 1));
        Self { starts }
    }

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn start_of(&self, row: usize) -> usize {
        self.starts[row]
    }

    fn row_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).saturating_sub(1)
    }

    fn line<'a>(&self, text: &'a str, row: usize) -> &'a str {
        let start = self.starts[row];
        let end = self
            .starts
            .get(row + 1)
            .map(|next| next - 1)
            .unwrap_or(text.len());
        let line = &text[start..end];
        line.strip_suffix('\r').unwrap_or(line)
    }
}

/// 反转义替换文本中的 `\t` `\n` `\r` `\\`
///
/// 转义的反斜杠本身不触发反转义：`\\t` 得到 `\` 和 `t` 两个字符。
pub fn unescape_escape_sequence(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/ports/pattern.rs"]
mod tests;
