//! Error fingerprinting for grouping repeat occurrences.
//!
//! The fingerprint concatenates the stable components of an error - message,
//! source location, and error type - joined by a delimiter not expected in
//! free text. Line and column numbers are deliberately excluded: bundled and
//! minified code shifts positions between deploys, and including them would
//! fragment one logical fault into many spurious groups.

/// Delimiter between fingerprint components.
pub const FINGERPRINT_DELIMITER: &str = "|";

/// Configuration for fingerprint computation.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    /// Number of leading stack frames to append to the fingerprint.
    ///
    /// Zero (the default) groups purely on message/source/type, maximising
    /// recall. Raising it trades recall for precision when distinct faults
    /// share a generic message (e.g. "Network request failed").
    pub include_stack_frames: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            include_stack_frames: 0,
        }
    }
}

/// Computes fingerprints for error grouping.
#[derive(Debug, Clone, Default)]
pub struct ErrorFingerprinter {
    config: FingerprintConfig,
}

impl ErrorFingerprinter {
    /// Create a fingerprinter with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fingerprinter with custom configuration.
    #[must_use]
    pub const fn with_config(config: FingerprintConfig) -> Self {
        Self { config }
    }

    /// Compute the fingerprint for an error.
    ///
    /// Present components among `{message, source, error_type}` are joined
    /// in that fixed order; absent ones are omitted entirely rather than
    /// leaving empty slots.
    #[must_use]
    pub fn compute(
        &self,
        message: Option<&str>,
        source: Option<&str>,
        error_type: Option<&str>,
        stack: Option<&str>,
    ) -> String {
        let mut components: Vec<&str> = [message, source, error_type]
            .into_iter()
            .flatten()
            .collect();

        let frames;
        if self.config.include_stack_frames > 0 {
            if let Some(stack) = stack {
                frames = leading_frames(stack, self.config.include_stack_frames);
                components.extend(frames.iter().map(String::as_str));
            }
        }

        components.join(FINGERPRINT_DELIMITER)
    }
}

/// First `max_frames` non-empty stack lines, trimmed.
fn leading_frames(stack: &str, max_frames: usize) -> Vec<String> {
    stack
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_frames)
        .map(str::to_owned)
        .collect()
}

/// Convenience function computing a fingerprint with default settings.
#[must_use]
pub fn compute_fingerprint(
    message: Option<&str>,
    source: Option<&str>,
    error_type: Option<&str>,
) -> String {
    ErrorFingerprinter::new().compute(message, source, error_type, None)
}
