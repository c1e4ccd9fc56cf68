//! Exit codes for the `mrp` CLI.
//!
//! Exit code ranges:
//! - 0-1: the run finished; 1 means the estimate exists but the fit is not
//!   reliable (non-convergence, divergences, low ESS)
//! - 10-19: user/input errors, fixed by changing arguments or data
//! - 20-29: internal, I/O and cancellation errors

use mrp_common::Error;

/// Exit codes for `mrp` operations. Stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Fit converged and every check passed.
    Clean = 0,

    /// Report produced, but a warning marks the fit unreliable.
    Unreliable = 1,

    /// Invalid arguments.
    ArgsError = 10,

    /// Configuration file missing, malformed or invalid.
    ConfigError = 11,

    /// Input table rejected (invalid factor level, empty table, bad count).
    InputError = 12,

    /// A stratum uses a category the fitted model never saw.
    CategoryMismatch = 13,

    /// Sampler or numerical failure.
    InternalError = 20,

    IoError = 21,

    /// Sampling cancelled or timed out before enough chains completed.
    TimeoutError = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-1: a report was produced.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::Unreliable)
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Codes 20-29.
    pub fn is_internal_error(self) -> bool {
        self.as_i32() >= 20
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Unreliable => "OK_UNRELIABLE",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::CategoryMismatch => "ERR_CATEGORY_MISMATCH",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::InvalidConfig(_) | Error::Toml(_) => ExitCode::ConfigError,
            Error::InvalidFactorLevel { .. } | Error::InvalidInput(_) | Error::Json(_) => {
                ExitCode::InputError
            }
            Error::CategoryMismatch { .. } => ExitCode::CategoryMismatch,
            Error::SamplerInitializationFailure { .. }
            | Error::NumericalInstability(_)
            | Error::UndefinedPrediction { .. } => ExitCode::InternalError,
            Error::Cancelled { .. } => ExitCode::TimeoutError,
            Error::Io(_) => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(ExitCode::Unreliable.is_success());
        assert!(ExitCode::CategoryMismatch.is_user_error());
        assert!(!ExitCode::CategoryMismatch.is_internal_error());
        assert!(ExitCode::TimeoutError.is_internal_error());
        assert_eq!(ExitCode::InputError.to_string(), "ERR_INPUT (12)");
    }

    #[test]
    fn errors_map_to_codes() {
        let cases = [
            (Error::InvalidConfig("x".into()), 11),
            (Error::invalid_level("province", "Yukon"), 12),
            (Error::InvalidInput("empty".into()), 12),
            (
                Error::CategoryMismatch {
                    factor: "province".into(),
                    level: "Quebec".into(),
                },
                13,
            ),
            (Error::NumericalInstability("nan".into()), 20),
            (
                Error::Cancelled {
                    completed: 1,
                    required: 2,
                },
                22,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ExitCode::from(&err).as_i32(), code, "{}", err);
        }
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(ExitCode::from(&io), ExitCode::IoError);
    }
}
