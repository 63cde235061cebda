use super::*;
use tempfile::tempdir;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parse_args_reads_flags_and_positionals() {
    let parsed = parse_args(args(&[
        "--regex",
        "-w",
        "--paths",
        "src, tests",
        "--replace",
        "$1_new",
        "(\\w+)_old",
        "project",
    ]))
    .unwrap();

    assert!(parsed.options.use_regex);
    assert!(parsed.options.whole_word);
    assert!(!parsed.options.case_sensitive);
    assert_eq!(parsed.options.paths_pattern, "src, tests");
    assert_eq!(parsed.options.find_pattern, "(\\w+)_old");
    assert_eq!(parsed.options.replace_pattern, "$1_new");
    assert_eq!(parsed.replace.as_deref(), Some("$1_new"));
    assert_eq!(parsed.root.as_deref(), Some("project"));
}

#[test]
fn parse_args_allows_dash_patterns_after_separator() {
    let parsed = parse_args(args(&["-c", "--", "--verbose"])).unwrap();
    assert!(parsed.options.case_sensitive);
    assert_eq!(parsed.options.find_pattern, "--verbose");
    assert!(parsed.root.is_none());
}

#[test]
fn parse_args_reports_errors() {
    assert_eq!(parse_args(args(&[])), Err(CliError::MissingPattern));
    assert_eq!(
        parse_args(args(&["cat", "--paths"])),
        Err(CliError::MissingValue("--paths".to_string()))
    );
    assert_eq!(
        parse_args(args(&["--nope", "cat"])),
        Err(CliError::UnknownFlag("--nope".to_string()))
    );
    assert_eq!(
        parse_args(args(&["cat", "root", "extra"])),
        Err(CliError::UnexpectedArgument("extra".to_string()))
    );
}

#[test]
fn resolve_root_defaults_to_cwd() {
    let dir = tempdir().unwrap();
    let cwd = dir.path();

    let root = resolve_root(cwd, None).unwrap();
    assert_eq!(root, cwd);
}

#[test]
fn resolve_root_accepts_directory_arg() {
    let dir = tempdir().unwrap();
    let cwd = dir.path();

    let workspace = cwd.join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();

    let root = resolve_root(cwd, Some("workspace")).unwrap();
    assert_eq!(root, workspace);
}

#[test]
fn resolve_root_rejects_files_and_missing_paths() {
    let dir = tempdir().unwrap();
    let cwd = dir.path();
    std::fs::write(cwd.join("a.txt"), "hello\n").unwrap();

    assert!(resolve_root(cwd, Some("a.txt")).is_err());
    assert!(resolve_root(cwd, Some("missing")).is_err());
}
