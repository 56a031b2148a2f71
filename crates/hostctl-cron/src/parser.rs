//! Line-level parsing: marker comments, schedule/command split, the
//! disabled prefix and log-file references.

use crate::is_valid_name;

/// Number of schedule fields in a standard crontab line.
pub const SCHEDULE_FIELDS: usize = 5;

/// Prefix that comments out a job line.
pub const DISABLED_PREFIX: &str = "# ";

/// Renders and recognizes `# <tool>: <name>` marker lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFormat {
    tool: String,
    prefix: String,
}

impl MarkerFormat {
    pub fn new(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        let prefix = format!("# {tool}: ");
        Self { tool, prefix }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Marker line for `name`.
    pub fn marker_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Job name if `line` is a marker line, `None` otherwise.
    ///
    /// The name must already be in normalized form (see
    /// [`validated_name`](crate::validated_name)). A trailing `\r` from a
    /// CRLF crontab is tolerated; any other deviation makes the line foreign.
    pub fn parse_marker<'a>(&self, line: &'a str) -> Option<&'a str> {
        let name = line.strip_prefix(&self.prefix)?;
        let name = name.strip_suffix('\r').unwrap_or(name);
        is_valid_name(name).then_some(name)
    }

    pub fn is_marker(&self, line: &str) -> bool {
        self.parse_marker(line).is_some()
    }
}

/// Schedule and command decomposed from a job line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub schedule: Option<String>,
    pub command: Option<String>,
}

/// Split a job line into schedule and command.
///
/// One leading `#` is ignored so disabled jobs parse like enabled ones.
/// `@daily`-style shorthands count as a one-field schedule. Lines that do
/// not yield a schedule and a non-empty command parse to `(None, None)`.
pub fn parse_line(line: &str) -> ParsedLine {
    let body = strip_disabled(line);
    let fields = if body.starts_with('@') {
        1
    } else {
        SCHEDULE_FIELDS
    };

    match split_fields(body, fields) {
        Some((schedule, command)) => ParsedLine {
            schedule: Some(schedule),
            command: Some(command.to_string()),
        },
        None => ParsedLine::default(),
    }
}

/// Take `n` whitespace-separated fields off the front of `text`; the rest,
/// with its own spacing intact, is the command.
fn split_fields(text: &str, n: usize) -> Option<(String, &str)> {
    let mut rest = text;
    let mut fields = Vec::with_capacity(n);
    for _ in 0..n {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    let command = rest.trim_start();
    if command.is_empty() {
        return None;
    }
    Some((fields.join(" "), command))
}

/// Whether a job line is commented out.
pub fn is_disabled(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Line content with one leading `#` and surrounding whitespace removed.
pub fn strip_disabled(line: &str) -> &str {
    let trimmed = line.trim();
    trimmed.strip_prefix('#').unwrap_or(trimmed).trim()
}

/// Comment out a job line. Already-disabled lines are returned unchanged.
pub fn disable(line: &str) -> String {
    if is_disabled(line) {
        line.to_string()
    } else {
        format!("{DISABLED_PREFIX}{line}")
    }
}

/// Undo [`disable`]: strips exactly one `# ` (or a bare `#`).
pub fn enable(line: &str) -> String {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix(DISABLED_PREFIX) {
        rest.to_string()
    } else if let Some(rest) = trimmed.strip_prefix('#') {
        rest.to_string()
    } else {
        line.to_string()
    }
}

/// Compose a job line, re-applying the disabled prefix when needed.
pub fn compose_line(schedule: &str, command: &str, enabled: bool) -> String {
    let line = format!("{schedule} {command}");
    if enabled { line } else { disable(&line) }
}

/// Conventional log file name for a job.
pub fn log_file_name(name: &str) -> String {
    format!("{name}.log")
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Replace every `<old>.log` path segment in `text` with `<new>.log`.
///
/// A match must not be glued to other name characters on the left
/// (`mybackup.log` is left alone when renaming `backup`) nor continue as a
/// longer word on the right. Rotated suffixes like `backup.log.1` match.
pub fn replace_log_ref(text: &str, old: &str, new: &str) -> String {
    let needle = log_file_name(old);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (idx, _) in text.match_indices(&needle) {
        let end = idx + needle.len();
        let before_ok = text[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !is_name_char(c));
        let after_ok = text[end..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        if before_ok && after_ok {
            out.push_str(&text[last..idx]);
            out.push_str(&log_file_name(new));
            last = end;
        }
    }

    out.push_str(&text[last..]);
    out
}
