use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use clap::Parser;

pub const DEFAULT_HISTORY_FILE: &str = "duster-history.json";
pub const DEFAULT_IGNORED_PAGES: [&str; 4] = [
    "Announcements",
    "Calendar",
    "My Grades",
    "Blackboard Collaborate",
];

/// Mirror course materials into a local folder, skipping files you already have
#[derive(Parser, Debug, Clone)]
#[command(name = "duster", version)]
pub struct Args {
    /// Base URL of the learning-management site; relative locators hang off it
    #[arg(env = "DUSTER_BASE_URL")]
    pub base_url: String,

    /// Content tree manifest written by the site scraper
    #[arg(long, env = "DUSTER_MANIFEST")]
    pub manifest: String,

    /// Directory to save downloads in
    #[arg(short, long = "save", env = "DUSTER_SAVE_DIR", default_value = ".")]
    pub save_dir: String,

    /// History file; relative paths are taken from the save directory
    #[arg(long, env = "DUSTER_HISTORY", default_value = DEFAULT_HISTORY_FILE)]
    pub history: String,

    /// Name of a course menu page to skip; repeat to skip several
    #[arg(short, long = "ignore", env = "DUSTER_IGNORE", value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Cookie header of the logged-in browser session
    #[arg(long, env = "DUSTER_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Retries for requests that fail with a transient error
    #[arg(long, env = "DUSTER_RETRIES", default_value_t = 2)]
    pub retries: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "DUSTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub base_url: String,
    pub manifest_path: PathBuf,
    pub save_root: PathBuf,
    pub history_path: PathBuf,
    pub ignore: BTreeSet<String>,
    pub cookie: Option<String>,
    pub retries: u32,
}

impl RunConfig {
    pub fn from_args(args: Args) -> Self {
        let home = dirs::home_dir();
        let expand = |value: &str| match &home {
            Some(home) => expand_with_home(value, home),
            None => PathBuf::from(value),
        };

        let save_root = expand(&args.save_dir);
        let history = expand(&args.history);
        let history_path = if history.is_absolute() {
            history
        } else {
            save_root.join(history)
        };

        let mut ignore: BTreeSet<String> = DEFAULT_IGNORED_PAGES
            .iter()
            .map(|name| name.to_string())
            .collect();
        ignore.extend(
            args.ignore
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        );

        Self {
            base_url: args.base_url,
            manifest_path: expand(&args.manifest),
            save_root,
            history_path,
            ignore,
            cookie: args.cookie.filter(|cookie| !cookie.trim().is_empty()),
            retries: args.retries,
        }
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> RunConfig {
        let mut argv = vec!["duster", "https://lms.example", "--manifest", "tree.json"];
        argv.extend_from_slice(extra);
        RunConfig::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn history_is_relative_to_save_dir() {
        let config = parse(&["--save", "/data/courses"]);
        assert_eq!(config.save_root, PathBuf::from("/data/courses"));
        assert_eq!(
            config.history_path,
            PathBuf::from("/data/courses").join(DEFAULT_HISTORY_FILE)
        );
    }

    #[test]
    fn absolute_history_path_is_kept() {
        let config = parse(&["--save", "/data/courses", "--history", "/var/lib/duster.json"]);
        assert_eq!(config.history_path, PathBuf::from("/var/lib/duster.json"));
    }

    #[test]
    fn ignore_list_extends_defaults() {
        let config = parse(&["-i", "Discussions", "--ignore", "Tools"]);
        for name in DEFAULT_IGNORED_PAGES {
            assert!(config.ignore.contains(name));
        }
        assert!(config.ignore.contains("Discussions"));
        assert!(config.ignore.contains("Tools"));
    }

    #[test]
    fn blank_cookie_is_dropped() {
        assert_eq!(parse(&["--cookie", "  "]).cookie, None);
        assert_eq!(
            parse(&["--cookie", "s_session_id=abc"]).cookie.as_deref(),
            Some("s_session_id=abc")
        );
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = Path::new("/home/student");
        assert_eq!(expand_with_home("~", home), PathBuf::from("/home/student"));
        assert_eq!(
            expand_with_home("~/Courses", home),
            PathBuf::from("/home/student/Courses")
        );
        assert_eq!(expand_with_home("Courses", home), PathBuf::from("Courses"));
    }
}
