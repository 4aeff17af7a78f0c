//! Thin CLI layer: parse args, styled output, and call into gavc-core.
//! Every command exits with the operation's result code (0 on success).

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gavc_core::{Cache, Gavc, GavcError, GavcOutcome, Mode, Upload, UploadOutcome};

/// Exit code when the CLI itself fails (panic, spinner thread lost).
const INTERNAL_ERROR: i32 = 70;

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Run `f` on a worker thread; with `spin` set, show a spinner until it is done.
fn run_with_spinner<T, F>(message: &str, spin: bool, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if !spin {
        return Some(f());
    }
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
        .template("{spinner:.dim} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    let tick = Duration::from_millis(80);
    loop {
        match rx.recv_timeout(tick) {
            Ok(res) => {
                spinner.finish_and_clear();
                return Some(res);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                spinner.finish_and_clear();
                return None;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => spinner.tick(),
        }
    }
}

fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_env("GAVC_LOG").unwrap_or_else(|_| match verbosity {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("gavc=info,gavc_core=info"),
        _ => EnvFilter::new("gavc=debug,gavc_core=debug"),
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn report(err: &GavcError) {
    error(&format!("{} (code {}): {}", err.kind(), err.code(), err));
}

// ---- argument definitions ----

const FLAG_KEYS: [&str; 4] = ["download", "delete", "disable-cache", "force-offline"];

fn flag(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).action(ArgAction::SetTrue).help(help)
}

fn value(id: &'static str, name: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).value_name(name).help(help)
}

fn server_args() -> Vec<Arg> {
    vec![
        value("server", "URL", "Server base URL [env: GAVC_SERVER_URL]"),
        value("repository", "REPO", "Repository name [env: GAVC_SERVER_REPOSITORY]"),
        value("token", "TOKEN", "API access token [env: GAVC_SERVER_API_ACCESS_TOKEN]"),
        value("max-attempts", "N", "Attempts per remote operation (default 3)"),
        value("retry-timeout", "SECS", "Wait between attempts in seconds (default 15)"),
        flag("force-offline", "Never contact the server"),
    ]
}

fn cache_path_arg() -> Arg {
    value(
        "cache-path",
        "DIR",
        "Cache root [env: GAVC_CACHE, default: ~/.pie/gavc/cache]",
    )
}

/// Copy the given args from the command line into (key, value) pairs.
fn collect_params(m: &ArgMatches, keys: &[&'static str]) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    for key in keys {
        if FLAG_KEYS.contains(key) {
            if m.get_flag(key) {
                out.push((*key, "true".to_string()));
            }
        } else if let Some(v) = m.get_one::<String>(key) {
            out.push((*key, v.clone()));
        }
    }
    out
}

fn apply<F>(params: &[(&'static str, String)], mut set: F) -> Result<(), i32>
where
    F: FnMut(&str, &str) -> i32,
{
    for (key, value) in params {
        let code = set(key, value);
        if code != gavc_core::OK {
            return Err(code);
        }
    }
    Ok(())
}

const QUERY_KEYS: [&str; 12] = [
    "download",
    "delete",
    "delete-versions",
    "output",
    "disable-cache",
    "force-offline",
    "max-attempts",
    "retry-timeout",
    "server",
    "repository",
    "token",
    "cache-path",
];

const UPLOAD_KEYS: [&str; 7] = [
    "filelist",
    "server",
    "repository",
    "token",
    "max-attempts",
    "retry-timeout",
    "force-offline",
];

fn cli() -> Command {
    Command::new("gavc")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Bhuvan Prakash <bhuvanstark6@gmail.com>")
        .about("Query, download, cache and upload artifacts by group:artifact:version[:classifier]")
        .after_help(
            "Examples:\n  gavc query org.acme:tool:+\n  gavc query org.acme:tool:1.4:linux --download -o out/\n  gavc query org.acme:tool:* --force-offline\n  gavc cache clean --max-age 30\n  gavc upload org.acme:tool:1.5 --filelist linux.tgz:build/tool.tgz",
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("More log output on stderr (overridden by GAVC_LOG)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Minimal output; show a spinner while working"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("query")
                .about("Resolve a coordinate; optionally download or delete")
                .arg(
                    Arg::new("coordinate")
                        .required(true)
                        .help("group:artifact:version[:classifier]; version may be + (latest) or * (all)"),
                )
                .arg(flag("download", "Download the resolved version"))
                .arg(flag("delete", "Delete the resolved version(s) on the server"))
                .arg(value(
                    "delete-versions",
                    "LOW,HIGH",
                    "Delete every server version in the inclusive range",
                ))
                .arg(value("output", "PATH", "Download target file or directory").short('o'))
                .arg(flag("disable-cache", "Bypass the local cache entirely"))
                .arg(flag("json", "Print the result as JSON"))
                .arg(cache_path_arg())
                .args(server_args()),
        )
        .subcommand(
            Command::new("cache")
                .about("Manage the local artifact cache")
                .subcommand_required(true)
                .subcommand(
                    Command::new("init")
                        .about("Create the cache root and layout marker")
                        .arg(cache_path_arg()),
                )
                .subcommand(
                    Command::new("clean")
                        .about("Remove entries fetched more than DAYS ago")
                        .arg(
                            Arg::new("max-age")
                                .long("max-age")
                                .value_name("DAYS")
                                .required(true)
                                .value_parser(value_parser!(u32))
                                .help("Maximum entry age in days"),
                        )
                        .arg(cache_path_arg()),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Publish files as one artifact version")
                .arg(
                    Arg::new("coordinate")
                        .required(true)
                        .help("group:artifact:version (exact version)"),
                )
                .arg(
                    value(
                        "filelist",
                        "LIST",
                        "Comma-separated name:path pairs, e.g. linux.tgz:out/a.tgz,docs:out/d.zip",
                    )
                    .required(true),
                )
                .args(server_args()),
        )
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(code) => code,
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            INTERNAL_ERROR
        }
    };
    std::process::exit(code);
}

fn run() -> i32 {
    let matches = cli().get_matches();
    init_logging(matches.get_count("verbose"));
    let quiet = matches.get_flag("quiet");
    tracing::debug!(command = matches.subcommand_name().unwrap_or(""), quiet, "dispatch");

    match matches.subcommand() {
        Some(("query", sub)) => cmd_query(sub, quiet),
        Some(("cache", sub)) => cmd_cache(sub, quiet),
        Some(("upload", sub)) => cmd_upload(sub, quiet),
        _ => INTERNAL_ERROR,
    }
}

fn cmd_query(m: &ArgMatches, quiet: bool) -> i32 {
    let coordinate = m.get_one::<String>("coordinate").cloned().unwrap_or_default();
    let params = collect_params(m, &QUERY_KEYS);
    let json = m.get_flag("json");

    let message = format!("Resolving {coordinate}");
    let result = run_with_spinner(&message, quiet, move || {
        let mut gavc = Gavc::new();
        let code = match apply(&params, |k, v| gavc.set_param(k, v)) {
            Ok(()) => gavc.perform(&coordinate),
            Err(code) => code,
        };
        match gavc.last_error() {
            Some(e) => {
                report(e);
                (code, None)
            }
            None => (code, gavc.outcome().cloned()),
        }
    });
    let Some((code, outcome)) = result else {
        error("Operation failed.");
        return INTERNAL_ERROR;
    };
    if let Some(outcome) = outcome {
        print_query(&outcome, json, quiet);
    }
    code
}

fn print_query(outcome: &GavcOutcome, json: bool, quiet: bool) {
    if json {
        let value = serde_json::json!({
            "mode": format!("{:?}", outcome.mode),
            "versions": outcome.versions,
            "downloaded": outcome.downloaded.as_ref().map(|p| p.display().to_string()),
            "deleted": outcome.deleted,
        });
        println!("{}", value);
        return;
    }
    if outcome.mode == Mode::Offline {
        warning("Server unreachable; answered from the local cache.");
    }
    for v in &outcome.versions {
        println!("{}", v);
    }
    if quiet {
        return;
    }
    if let Some(path) = &outcome.downloaded {
        success(&format!("Downloaded to {}", path.display()));
    }
    for v in &outcome.deleted {
        success(&format!("Deleted {}", v));
    }
}

fn cmd_cache(m: &ArgMatches, quiet: bool) -> i32 {
    let mut cache = Cache::new();
    let Some((action, sub)) = m.subcommand() else {
        return INTERNAL_ERROR;
    };
    if let Some(path) = sub.get_one::<String>("cache-path") {
        let code = cache.set_param("cache-path", path);
        if code != gavc_core::OK {
            if let Some(e) = cache.last_error() {
                report(e);
            }
            return code;
        }
    }

    let code = match action {
        "init" => cache.init(),
        "clean" => {
            let days = sub.get_one::<u32>("max-age").copied().unwrap_or(0);
            cache.clean(days)
        }
        _ => return INTERNAL_ERROR,
    };
    if let Some(e) = cache.last_error() {
        report(e);
        return code;
    }
    if !quiet {
        match action {
            "init" => success("Cache ready."),
            _ => {
                let n = cache.removed();
                if n == 0 {
                    dim("Nothing to clean.");
                } else {
                    success(&format!("Removed {} cache entr{}.", n, if n == 1 { "y" } else { "ies" }));
                }
            }
        }
    }
    code
}

fn cmd_upload(m: &ArgMatches, quiet: bool) -> i32 {
    let coordinate = m.get_one::<String>("coordinate").cloned().unwrap_or_default();
    let params = collect_params(m, &UPLOAD_KEYS);

    let message = format!("Uploading {coordinate}");
    let result = run_with_spinner(&message, quiet, move || {
        let mut upload = Upload::new();
        let code = match apply(&params, |k, v| upload.set_param(k, v)) {
            Ok(()) => upload.perform(&coordinate),
            Err(code) => code,
        };
        match upload.last_error() {
            Some(e) => {
                report(e);
                (code, None::<UploadOutcome>)
            }
            None => (code, upload.outcome().cloned()),
        }
    });
    let Some((code, outcome)) = result else {
        error("Operation failed.");
        return INTERNAL_ERROR;
    };
    if let (Some(outcome), false) = (outcome, quiet) {
        for name in &outcome.uploaded {
            dim(&format!("  {}", name));
        }
        success(&format!("Uploaded {} object(s).", outcome.uploaded.len()));
    }
    code
}
