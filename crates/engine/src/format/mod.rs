/// Log-format template compilation
///
/// Turns an nginx-style `log_format` template (literal text interleaved
/// with `$name` variables) into a reusable matcher that maps one raw log
/// line to an ordered set of named captures.
///
/// # Guarantees
///
/// - Compilation never fails: every template produces *some* matcher,
///   possibly one that matches nothing.
/// - Literal text is matched verbatim; regex metacharacters in literals
///   are escaped, never interpreted.
/// - A compiled pattern is immutable and safe to share across tasks.
pub mod pattern;

pub use pattern::{variable_names, LogPattern, RawCapture};
pub use pattern::{LOG_FORMAT_COMBINED, LOG_FORMAT_COMMON};
