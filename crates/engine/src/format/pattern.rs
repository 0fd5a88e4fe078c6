use regex::Regex;

/// The nginx `combined` log format, predefined so callers can pass the
/// name instead of the full template.
pub const LOG_FORMAT_COMBINED: &str = "$remote_addr - $remote_user [$time_local] \
     \"$request\" $status $body_bytes_sent \
     \"$http_referer\" \"$http_user_agent\"";

/// The nginx `common` log format.
pub const LOG_FORMAT_COMMON: &str = "$remote_addr - $remote_user [$time_local] \
     \"$request\" $status $body_bytes_sent \
     \"$http_x_forwarded_for\"";

// Characters that must be escaped when a literal template segment is
// embedded into the match pattern.
const LITERAL_ESCAPES: &str = ".*+?|(){}[]\\";

/// One raw line matched against a compiled pattern: variable name to the
/// exact captured substring, in template order.
pub type RawCapture = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Var(String),
}

/// A compiled log-format template.
///
/// Immutable after compilation; share behind an `Arc` for concurrent
/// read-only matching across ingestion tasks.
#[derive(Debug)]
pub struct LogPattern {
    // None only for the (pathological) case where the assembled pattern
    // is rejected by the regex engine; such a pattern matches nothing.
    regex: Option<Regex>,
    variables: Vec<String>,
}

impl LogPattern {
    /// Compile a log-format template into a matcher.
    ///
    /// The literal tokens `combined` and `common` are substituted with
    /// the corresponding built-in template first. Compilation itself
    /// never fails.
    pub fn compile(template: &str) -> Self {
        let parts = parse_template(resolve_builtin(template));
        let variables: Vec<String> = parts
            .iter()
            .filter_map(|p| match p {
                Part::Var(name) => Some(name.clone()),
                Part::Literal(_) => None,
            })
            .collect();

        let mut pattern = String::from("^");
        let last = parts.len().checked_sub(1);
        for (idx, part) in parts.iter().enumerate() {
            match part {
                Part::Literal(text) => pattern.push_str(&escape_literal(text)),
                // Variables capture up to the next literal delimiter; a
                // template-final variable captures to end of line.
                Part::Var(_) if Some(idx) == last => pattern.push_str("(.*)"),
                Part::Var(_) => pattern.push_str("(.*?)"),
            }
        }
        pattern.push('$');

        let regex = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(template, error = %e, "template compiled to an unmatchable pattern");
                None
            }
        };

        Self { regex, variables }
    }

    /// Ordered variable names of the compiled template.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Match one line, returning the ordered name/value capture pairs,
    /// or `None` when the line does not fit the template.
    pub fn capture(&self, line: &str) -> Option<RawCapture> {
        let caps = self.regex.as_ref()?.captures(line)?;
        Some(
            self.variables
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = caps
                        .get(i + 1)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default();
                    (name.clone(), value)
                })
                .collect(),
        )
    }
}

/// Extract the ordered variable names of a template without compiling it.
/// Used by the `info` command for discoverability.
pub fn variable_names(template: &str) -> Vec<String> {
    parse_template(resolve_builtin(template))
        .into_iter()
        .filter_map(|p| match p {
            Part::Var(name) => Some(name),
            Part::Literal(_) => None,
        })
        .collect()
}

fn resolve_builtin(template: &str) -> &str {
    match template {
        "combined" => LOG_FORMAT_COMBINED,
        "common" => LOG_FORMAT_COMMON,
        other => other,
    }
}

fn parse_template(template: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            // A lone '$' is literal text.
            literal.push('$');
        } else {
            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Var(name));
        }
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    parts
}

fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if LITERAL_ESCAPES.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
