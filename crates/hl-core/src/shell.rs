//! Shell quoting for command lines sent to the remote login shell
//!
//! The executor runs command lines verbatim; callers that splice values into
//! a command quote them here first.

/// Quote a value for a POSIX shell.
///
/// Values made only of safe characters are returned bare; everything else is
/// wrapped in single quotes with embedded quotes written as `'\''`.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | '%'))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Pick a heredoc delimiter that does not occur as a line of `body`
pub fn heredoc_delimiter(body: &str, base: &str) -> String {
    let mut delimiter = base.to_string();
    let mut n = 0;
    while body.lines().any(|line| line == delimiter) {
        n += 1;
        delimiter = format!("{}_{}", base, n);
    }
    delimiter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_values_are_bare() {
        assert_eq!(quote("4821"), "4821");
        assert_eq!(quote("job_1.slurm"), "job_1.slurm");
    }

    #[test]
    fn test_values_with_spaces_are_quoted() {
        assert_eq!(quote("my job"), "'my job'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_embedded_single_quote() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_heredoc_delimiter_avoids_collision() {
        assert_eq!(heredoc_delimiter("echo hi\n", "EOF"), "EOF");
        assert_eq!(heredoc_delimiter("cat <<EOF\nx\nEOF\n", "EOF"), "EOF_1");
    }
}
