use super::*;

fn literal(pattern: &str) -> Matcher {
    PatternCompiler::compile(pattern, &CompileOptions::default()).unwrap()
}

#[test]
fn test_literal_is_escaped() {
    let matcher = literal("a.c");
    assert!(matcher.test("xa.cx"));
    assert!(!matcher.test("abc"));
}

#[test]
fn test_case_sensitivity() {
    let insensitive = literal("hello");
    assert_eq!(insensitive.find_in("Hello HELLO hello", 0, 17).len(), 3);

    let sensitive = PatternCompiler::compile(
        "hello",
        &CompileOptions {
            case_sensitive: true,
            ..CompileOptions::default()
        },
    )
    .unwrap();
    assert_eq!(sensitive.find_in("Hello HELLO hello", 0, 17), vec![12..17]);
}

#[test]
fn test_whole_word() {
    let options = CompileOptions {
        whole_word: true,
        ..CompileOptions::default()
    };
    let matcher = PatternCompiler::compile("aa", &options).unwrap();
    assert!(matcher.find_in("aaa bbb aaa", 0, 11).is_empty());

    let matcher = PatternCompiler::compile("aaa", &options).unwrap();
    assert_eq!(matcher.find_in("aaa bbb aaa", 0, 11), vec![0..3, 8..11]);
}

#[test]
fn test_invalid_regex_reports_pattern_error() {
    let options = CompileOptions {
        use_regex: true,
        ..CompileOptions::default()
    };
    let err = PatternCompiler::compile("[invalid", &options).unwrap_err();
    assert_eq!(err.kind, PatternErrorKind::Syntax);
    assert_eq!(err.pattern, "[invalid");
}

#[test]
fn test_oversized_regex_is_normalized() {
    let options = CompileOptions {
        use_regex: true,
        size_limit: 16,
        ..CompileOptions::default()
    };
    let err = PatternCompiler::compile(r"\w{50}", &options).unwrap_err();
    assert_eq!(err.kind, PatternErrorKind::TooLarge);
    assert_eq!(err.message, "regular expression is too large");
}

#[test]
fn test_empty_matches_are_skipped() {
    let options = CompileOptions {
        use_regex: true,
        ..CompileOptions::default()
    };
    let matcher = PatternCompiler::compile("x*", &options).unwrap();
    assert_eq!(matcher.find_in("ab xx c", 0, 7), vec![3..5]);
}

#[test]
fn test_find_in_uses_left_context_for_word_boundary() {
    let options = CompileOptions {
        whole_word: true,
        ..CompileOptions::default()
    };
    let matcher = PatternCompiler::compile("bc", &options).unwrap();
    // 从 1 开始扫描，但 "a" 仍然参与 \b 判断
    assert!(matcher.find_in("abc", 1, 3).is_empty());
}

#[test]
fn test_regex_replace_with_backreference() {
    let options = CompileOptions {
        use_regex: true,
        ..CompileOptions::default()
    };
    let matcher = PatternCompiler::compile(r"(\w+)@(\w+)", &options).unwrap();
    assert_eq!(matcher.replace("user@host", "$2:$1", true), "host:user");
    assert_eq!(matcher.replace("user@host", "$2:$1", false), "$2:$1");
}

#[test]
fn test_replace_all_counts() {
    let matcher = literal("cat");
    let (text, count) = matcher.replace_all("cat dog cat", "bird", false);
    assert_eq!(text, "bird dog bird");
    assert_eq!(count, 2);
}

#[test]
fn test_scan_text_positions_and_context() {
    let matcher = literal("needle");
    let text = "first\nsecond needle\nthird\nfourth";
    let matches = matcher.scan_text(text, 1, 2);

    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m.range, Range::new((1, 7), (1, 13)));
    assert_eq!(m.match_text, "needle");
    assert_eq!(m.line_text, "second needle");
    assert_eq!(m.line_text_offset, 0);
    assert_eq!(m.leading_context_lines, vec!["first".to_string()]);
    assert_eq!(
        m.trailing_context_lines,
        vec!["third".to_string(), "fourth".to_string()]
    );
}

#[test]
fn test_scan_text_columns_count_chars() {
    let matcher = literal("é");
    let matches = matcher.scan_text("aéb é", 0, 0);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].range, Range::new((0, 1), (0, 2)));
    assert_eq!(matches[1].range, Range::new((0, 4), (0, 5)));
}

#[test]
fn test_scan_text_clips_long_lines() {
    let matcher = literal("target");
    let line = format!("{}target{}", "x".repeat(500), "y".repeat(500));
    let matches = matcher.scan_text(&line, 0, 0);

    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m.line_text_offset, 460);
    assert_eq!(m.line_text.chars().count(), 240);
    assert!(m.line_text.contains("target"));
}

#[test]
fn test_unescape_escape_sequence() {
    assert_eq!(unescape_escape_sequence(r"\t"), "\t");
    assert_eq!(unescape_escape_sequence(r"a\nb\rc"), "a\nb\rc");
    assert_eq!(unescape_escape_sequence(r"\\t"), "\\t");
    assert_eq!(unescape_escape_sequence(r"\d"), r"\d");
    assert_eq!(unescape_escape_sequence("trailing\\"), "trailing\\");
}
