mod logging;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use zfind::kernel::search::{ResultAggregator, SearchCompletion, SearchHandle, SearchRequest};
use zfind::kernel::services::adapters::{
    ensure_settings_file, load_settings, PathReplaceService, PathSearchService,
};
use zfind::kernel::services::ports::FindOptions;

const USAGE: &str = "usage: zfind [--regex] [--case-sensitive] [--whole-word] [--paths GLOBS] [--replace TEXT] PATTERN [ROOT]";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    options: FindOptions,
    replace: Option<String>,
    root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliError {
    MissingValue(String),
    UnknownFlag(String),
    MissingPattern,
    UnexpectedArgument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::MissingValue(flag) => write!(f, "missing value for {}", flag),
            CliError::UnknownFlag(flag) => write!(f, "unknown flag {}", flag),
            CliError::MissingPattern => write!(f, "missing PATTERN"),
            CliError::UnexpectedArgument(arg) => write!(f, "unexpected argument {}", arg),
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, CliError> {
    let mut options = FindOptions::default();
    let mut replace = None;
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-r" | "--regex" => options.use_regex = true,
            "-c" | "--case-sensitive" => options.case_sensitive = true,
            "-w" | "--whole-word" => options.whole_word = true,
            "-p" | "--paths" => {
                options.paths_pattern = args
                    .next()
                    .ok_or_else(|| CliError::MissingValue(arg.clone()))?;
            }
            "--replace" => {
                replace = Some(
                    args.next()
                        .ok_or_else(|| CliError::MissingValue(arg.clone()))?,
                );
            }
            "--" => positional.extend(args.by_ref()),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(CliError::UnknownFlag(arg));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    options.find_pattern = positional.next().ok_or(CliError::MissingPattern)?;
    let root = positional.next();
    if let Some(extra) = positional.next() {
        return Err(CliError::UnexpectedArgument(extra));
    }
    if let Some(replacement) = &replace {
        options.replace_pattern = replacement.clone();
    }

    Ok(CliArgs {
        options,
        replace,
        root,
    })
}

fn resolve_root(cwd: &Path, arg: Option<&str>) -> std::io::Result<PathBuf> {
    let root = match arg {
        Some(arg) => cwd.join(arg),
        None => cwd.to_path_buf(),
    };
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }
    Ok(root)
}

fn wait_for(aggregator: &mut ResultAggregator, mut handle: SearchHandle) -> SearchCompletion {
    loop {
        if let Some(completion) = handle.try_result() {
            return completion;
        }
        aggregator.wait_message(POLL_INTERVAL);
    }
}

fn print_results(aggregator: &ResultAggregator, root: &Path) {
    for path in aggregator.paths() {
        let Some(result) = aggregator.result(path) else {
            continue;
        };
        let display = path.strip_prefix(root).unwrap_or(path);
        for m in &result.matches {
            println!(
                "{}:{}:{}: {}",
                display.display(),
                m.range.start.row + 1,
                m.range.start.column + 1,
                m.line_text.trim_end()
            );
        }
    }
    for error in aggregator.search_errors() {
        eprintln!("zfind: {}", error);
    }
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("zfind: {}\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    let _logging = logging::init();

    let root = match std::env::current_dir()
        .and_then(|cwd| resolve_root(&cwd, args.root.as_deref()))
        .and_then(|root| root.canonicalize())
    {
        Ok(root) => root,
        Err(e) => {
            eprintln!("zfind: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = ensure_settings_file() {
        tracing::warn!(error = %e, "failed to create settings file");
    }
    let config = load_settings().unwrap_or_default();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("zfind: failed to start runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut aggregator = ResultAggregator::new(
        Box::new(PathSearchService::new(
            runtime.handle().clone(),
            root.clone(),
            config.clone(),
        )),
        Box::new(PathReplaceService::new(
            runtime.handle().clone(),
            config.clone(),
        )),
        config,
    );

    let handle = aggregator.search(args.options.clone(), SearchRequest::default());
    match wait_for(&mut aggregator, handle) {
        SearchCompletion::Finished(_) => {}
        SearchCompletion::InvalidPattern(e) => {
            eprintln!("zfind: {}", e);
            return ExitCode::from(2);
        }
        SearchCompletion::Cancelled | SearchCompletion::Skipped | SearchCompletion::Cleared => {
            return ExitCode::from(1);
        }
    }
    print_results(&aggregator, &root);

    let summary = aggregator.summary();
    if summary.match_count == 0 {
        return ExitCode::from(1);
    }

    if let Some(replacement) = &args.replace {
        let paths = aggregator.paths().to_vec();
        let handle = aggregator.replace(&args.options.paths_pattern, replacement, paths);
        wait_for(&mut aggregator, handle);

        let summary = aggregator.summary();
        for error in &summary.replacement_errors {
            eprintln!("zfind: {}", error);
        }
        println!(
            "Replaced {} occurrence(s) in {} file(s)",
            summary.replacement_count, summary.replaced_path_count
        );
    } else {
        println!(
            "{} match(es) in {} file(s)",
            summary.match_count, summary.path_count
        );
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
#[path = "../tests/unit/cli_args.rs"]
mod tests;
