//! Process- and network-backed collaborators.
//!
//! Agents speak one JSON protocol regardless of transport: a
//! [`FixRequest`] in, a [`FixReply`] out.

pub mod checker;
pub mod fixer;

pub use checker::CommandChecker;
pub use fixer::{parse_reply, CommandFixer, FixReply, FixRequest, HttpFixer};

/// Split a configured command line into argv, rejecting empty or
/// unbalanced input.
pub(crate) fn split_command(command: &str) -> Option<Vec<String>> {
    shlex::split(command).filter(|argv| !argv.is_empty())
}

/// Last `limit` characters of process output, for error messages.
pub(crate) fn tail(bytes: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(limit);
    text.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command(r#"sh -c "cat x.json""#).unwrap(),
            vec!["sh", "-c", "cat x.json"]
        );
        assert!(split_command("   ").is_none());
        assert!(split_command("echo 'unbalanced").is_none());
    }

    #[test]
    fn test_tail_truncates_from_the_front() {
        assert_eq!(tail(b"  abcdef\n", 3), "def");
        assert_eq!(tail(b"ab", 10), "ab");
    }
}
