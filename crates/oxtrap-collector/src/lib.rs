//! Command execution for rule checks.
//!
//! A [`CommandRunner`] runs a rule's shell command and coerces its trimmed
//! standard output into a [`TrapValue`] of the rule's declared [`ValueType`].
//! [`shell::ShellRunner`] is the implementation used by the agent.

pub mod shell;

use async_trait::async_trait;
use oxtrap_common::types::{TrapValue, ValueType};

pub use shell::ShellRunner;

/// Errors produced while running a check command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command could not be spawned or its output could not be read.
    #[error("Collector: failed to execute '{command}': {source}")]
    Execution {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("Collector: '{command}' exited with {status}: {stderr}")]
    ExitStatus {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The trimmed output is not valid for the declared value type.
    #[error("Collector: output \"{output}\" cannot be converted to {expected}")]
    Conversion { output: String, expected: ValueType },
}

impl CommandError {
    /// True for spawn and exit-status failures, false for conversion failures.
    pub fn is_execution(&self) -> bool {
        !matches!(self, CommandError::Conversion { .. })
    }
}

/// Runs a rule's command and produces a typed value.
///
/// The trait is `Send + Sync` so a single runner can be shared by every
/// rule task.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Executes `command` and coerces its output to `value_type`.
    ///
    /// # Errors
    ///
    /// [`CommandError::Execution`] or [`CommandError::ExitStatus`] when the
    /// command fails, [`CommandError::Conversion`] when the output does not
    /// match `value_type`.
    async fn execute(&self, command: &str, value_type: ValueType) -> Result<TrapValue, CommandError>;
}

/// Trims `output` and interprets it as `value_type`.
///
/// Integer output is read up to the end of its leading run of digits, so
/// `"85%"` is 85 and `"0.53"` is 0. Output with no leading digits, or
/// whose digits overflow `i64`, is a [`CommandError::Conversion`].
///
/// # Examples
///
/// ```
/// use oxtrap_collector::coerce_output;
/// use oxtrap_common::types::{TrapValue, ValueType};
///
/// assert_eq!(coerce_output(" 42\n", ValueType::Integer).unwrap(), TrapValue::Integer(42));
/// assert_eq!(coerce_output("85%", ValueType::Integer).unwrap(), TrapValue::Integer(85));
/// assert_eq!(coerce_output("ok\n", ValueType::String).unwrap(), TrapValue::Text("ok".into()));
/// assert!(coerce_output("abc", ValueType::Integer).is_err());
/// ```
pub fn coerce_output(output: &str, value_type: ValueType) -> Result<TrapValue, CommandError> {
    let trimmed = output.trim();
    match value_type {
        ValueType::String => Ok(TrapValue::Text(trimmed.to_string())),
        ValueType::Integer => leading_integer(trimmed)
            .map(TrapValue::Integer)
            .ok_or_else(|| CommandError::Conversion {
                output: trimmed.to_string(),
                expected: value_type,
            }),
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let digits = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let end = s.len() - unsigned.len() + digits;
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_output_parses_base10() {
        assert_eq!(
            coerce_output("42", ValueType::Integer).unwrap(),
            TrapValue::Integer(42)
        );
        assert_eq!(
            coerce_output("  -17\r\n", ValueType::Integer).unwrap(),
            TrapValue::Integer(-17)
        );
    }

    #[test]
    fn integer_output_keeps_leading_digits() {
        for (output, expected) in [
            ("85%", 85),
            ("0.53", 0),
            ("42 percent", 42),
            ("12abc", 12),
            ("+7", 7),
            ("-3.9", -3),
            ("007", 7),
        ] {
            assert_eq!(
                coerce_output(output, ValueType::Integer).unwrap(),
                TrapValue::Integer(expected),
                "output {output:?}"
            );
        }
    }

    #[test]
    fn integer_output_without_leading_digits_is_a_conversion_error() {
        for output in ["abc", "-", "+", "%85", ".5", "- 5"] {
            let err = coerce_output(output, ValueType::Integer).unwrap_err();
            assert!(
                matches!(err, CommandError::Conversion { output: ref o, .. } if o == output),
                "output {output:?}"
            );
            assert!(!err.is_execution());
        }
    }

    #[test]
    fn integer_output_overflowing_i64_is_a_conversion_error() {
        assert!(matches!(
            coerce_output("99999999999999999999", ValueType::Integer),
            Err(CommandError::Conversion { .. })
        ));
        assert_eq!(
            coerce_output("9223372036854775807 bytes", ValueType::Integer).unwrap(),
            TrapValue::Integer(i64::MAX)
        );
    }

    #[test]
    fn empty_output_is_not_an_integer() {
        assert!(matches!(
            coerce_output("   \n", ValueType::Integer),
            Err(CommandError::Conversion { .. })
        ));
    }

    #[test]
    fn string_output_is_only_trimmed() {
        assert_eq!(
            coerce_output("\t all good  \n", ValueType::String).unwrap(),
            TrapValue::Text("all good".into())
        );
        assert_eq!(
            coerce_output("", ValueType::String).unwrap(),
            TrapValue::Text(String::new())
        );
    }
}
