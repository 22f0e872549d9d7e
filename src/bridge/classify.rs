//! Failure classification
//!
//! Maps raw process failures onto the closed `ErrorKind` set by matching the
//! error text and exit status against known patterns.

use std::io;

use crate::error::ErrorKind;

/// Pattern-based classifier for scripting-host failures
pub struct ErrorClassifier {
    /// Application not launched (-600 procNotFound)
    not_running_patterns: Vec<&'static str>,
    /// Automation not authorized (-1743 errAEEventNotPermitted)
    permission_patterns: Vec<&'static str>,
    /// Apple event timed out (-1712 errAETimeout)
    timeout_patterns: Vec<&'static str>,
    /// Process-level I/O hiccups worth retrying
    transient_patterns: Vec<&'static str>,
    /// The script ran and threw
    script_patterns: Vec<&'static str>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self {
            not_running_patterns: vec![
                "(-600)",
                "isn't running",
                "is not running",
                "application isn’t running",
                "can't get application",
                "can’t get application",
            ],
            permission_patterns: vec![
                "(-1743)",
                "not authorized to send apple events",
                "not authorised",
                "not allowed assistive access",
                "not allowed to send",
                "operation not permitted",
            ],
            timeout_patterns: vec!["(-1712)", "timed out", "timeout"],
            transient_patterns: vec![
                "(-609)",
                "connection is invalid",
                "connection interrupted",
                "broken pipe",
                "resource temporarily unavailable",
                "try again",
                "(-1708)",
            ],
            script_patterns: vec![
                "execution error",
                "error:",
                "typeerror",
                "referenceerror",
                "syntaxerror",
                "(-2700)",
                "(-2740)",
                "(-1728)",
            ],
        }
    }

    /// Classify a process that exited unsuccessfully
    pub fn classify(&self, stderr: &str, exit_code: Option<i32>) -> ErrorKind {
        let text = stderr.to_lowercase();

        // Order matters: specific host errors first, generic script errors last
        if Self::matches(&text, &self.not_running_patterns) {
            return ErrorKind::NotRunning;
        }
        if Self::matches(&text, &self.permission_patterns) {
            return ErrorKind::PermissionDenied;
        }
        if Self::matches(&text, &self.timeout_patterns) {
            return ErrorKind::Timeout;
        }
        if Self::matches(&text, &self.transient_patterns) {
            return ErrorKind::Transient;
        }
        if Self::matches(&text, &self.script_patterns) {
            return ErrorKind::ScriptError;
        }

        match exit_code {
            // Killed by a signal
            None => ErrorKind::Transient,
            Some(_) => ErrorKind::Unknown,
        }
    }

    /// Classify a failure to spawn or talk to the process
    pub fn classify_io(&self, error: &io::Error) -> ErrorKind {
        match error.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => ErrorKind::Transient,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Unknown,
        }
    }

    fn matches(text: &str, patterns: &[&'static str]) -> bool {
        patterns.iter().any(|p| text.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(stderr: &str) -> ErrorKind {
        ErrorClassifier::new().classify(stderr, Some(1))
    }

    #[test]
    fn test_host_error_numbers() {
        assert_eq!(
            classify("execution error: Application isn't running. (-600)"),
            ErrorKind::NotRunning
        );
        assert_eq!(
            classify("execution error: Not authorized to send Apple events to OmniFocus. (-1743)"),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            classify("execution error: OmniFocus got an error: AppleEvent timed out. (-1712)"),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify("execution error: Connection is invalid. (-609)"),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_script_errors() {
        assert_eq!(
            classify("execution error: Error: TypeError: undefined is not an object (-2700)"),
            ErrorKind::ScriptError
        );
        assert_eq!(
            classify("execution error: Can't get object. (-1728)"),
            ErrorKind::ScriptError
        );
    }

    #[test]
    fn test_fallbacks() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify("", Some(1)), ErrorKind::Unknown);
        assert_eq!(classifier.classify("", None), ErrorKind::Transient);
        assert_eq!(
            classifier.classify_io(&io::Error::from(io::ErrorKind::BrokenPipe)),
            ErrorKind::Transient
        );
        assert_eq!(
            classifier.classify_io(&io::Error::from(io::ErrorKind::NotFound)),
            ErrorKind::Unknown
        );
    }
}
