//! Discover — locate the access log path and format from nginx itself.
//!
//! When neither `--access-log` nor `--log-format` is given, the config
//! file is found via `nginx -V` (or `-c`), then scanned for
//! `access_log` and `log_format` directives. Directive parameters may
//! be bare or quoted; `#` comments are ignored; `off` and `syslog:`
//! targets are skipped; parameters containing `=` are options, not
//! format names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Discovered {
    pub config_path: PathBuf,
    pub access_log: String,
    /// A template string, or the built-in name "combined".
    pub log_format: String,
}

pub fn discover(config: Option<&Path>) -> anyhow::Result<Discovered> {
    let config_path = match config {
        Some(path) => path.to_path_buf(),
        None => detect_config_path()?,
    };
    let text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("nginx config file not found: {}", config_path.display()))?;

    let access_logs = access_log_directives(&text);
    let Some((access_log, format_name)) = access_logs.first().cloned() else {
        bail!(
            "access log file is not provided and cannot be detected from your config file ({})",
            config_path.display()
        );
    };
    if access_logs.len() > 1 {
        let skipped: Vec<&str> = access_logs[1..].iter().map(|(p, _)| p.as_str()).collect();
        warn!(
            selected = %access_log,
            "multiple access logs configured, ignoring: {}",
            skipped.join(", ")
        );
    }

    let log_format = if format_name == "combined" {
        "combined".to_string()
    } else {
        let formats: HashMap<String, String> = log_format_directives(&text).into_iter().collect();
        formats.get(&format_name).cloned().ok_or_else(|| {
            anyhow!("incorrect format name set in config for access log file \"{access_log}\"")
        })?
    };

    info!(config = %config_path.display(), access_log, "discovered log configuration");
    Ok(Discovered {
        config_path,
        access_log,
        log_format,
    })
}

/// Config path from `nginx -V` output: `--conf-path=` if present, else
/// `--prefix=` + `/conf/nginx.conf`, else the distribution default.
pub fn detect_config_path() -> anyhow::Result<PathBuf> {
    let output = Command::new("nginx").arg("-V").output().context(
        "access log file or format was not set and nginx config cannot be detected; \
         perhaps nginx is not in your PATH?",
    )?;
    let version_output = String::from_utf8_lossy(&output.stderr);
    Ok(config_path_from_version_output(&version_output))
}

fn config_path_from_version_output(version_output: &str) -> PathBuf {
    if let Some(path) = flag_value(version_output, "--conf-path=") {
        return PathBuf::from(path);
    }
    if let Some(prefix) = flag_value(version_output, "--prefix=") {
        return Path::new(prefix).join("conf/nginx.conf");
    }
    PathBuf::from("/etc/nginx/nginx.conf")
}

fn flag_value<'a>(text: &'a str, flag: &str) -> Option<&'a str> {
    let start = text.find(flag)? + flag.len();
    let rest = &text[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let value = &rest[..end];
    (!value.is_empty()).then_some(value)
}

/// `(path, format name)` per usable `access_log` directive, in config
/// order, first occurrence of a path wins.
pub fn access_log_directives(conf: &str) -> Vec<(String, String)> {
    let tokens = tokenize(conf);
    let mut logs: Vec<(String, String)> = Vec::new();
    for params in directive_params(&tokens, "access_log") {
        let path = params[0].clone();
        if path == "off" || path.starts_with("syslog:") {
            // Nothing to follow there.
            continue;
        }
        let format = match params.get(1) {
            Some(second) if !second.contains('=') => second.clone(),
            _ => "combined".to_string(),
        };
        if !logs.iter().any(|(existing, _)| *existing == path) {
            logs.push((path, format));
        }
    }
    logs
}

/// `(name, template)` per `log_format` directive. Multi-part templates
/// (one quoted chunk per line) concatenate.
pub fn log_format_directives(conf: &str) -> Vec<(String, String)> {
    let tokens = tokenize(conf);
    let mut formats = Vec::new();
    for params in directive_params(&tokens, "log_format") {
        if params.len() < 2 {
            continue;
        }
        formats.push((params[0].clone(), params[1..].join("")));
    }
    formats
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Semi,
    OpenBrace,
    CloseBrace,
}

fn tokenize(conf: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = conf.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semi);
            }
            '{' => {
                chars.next();
                tokens.push(Token::OpenBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::CloseBrace);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut word = String::new();
                for n in chars.by_ref() {
                    if n == quote {
                        break;
                    }
                    word.push(n);
                }
                tokens.push(Token::Word(word));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() || matches!(n, ';' | '{' | '}' | '#' | '\'' | '"') {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    tokens
}

/// Parameter lists of every well-terminated `name ... ;` directive.
fn directive_params(tokens: &[Token], name: &str) -> Vec<Vec<String>> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let is_directive = matches!(&tokens[i], Token::Word(w) if w == name);
        if !is_directive {
            i += 1;
            continue;
        }
        let mut params = Vec::new();
        let mut j = i + 1;
        let mut terminated = false;
        while j < tokens.len() {
            match &tokens[j] {
                Token::Word(p) => params.push(p.clone()),
                Token::Semi => {
                    terminated = true;
                    break;
                }
                Token::OpenBrace | Token::CloseBrace => break,
            }
            j += 1;
        }
        if terminated && !params.is_empty() {
            found.push(params);
        }
        i = j + 1;
    }
    found
}
