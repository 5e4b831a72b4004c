use oxtrap_common::types::{Rule, Severity, Thresholds, TrapValue, ValueType};

/// Classifies `value` against optional `thresholds`.
///
/// # Examples
///
/// ```
/// use oxtrap_alert::classify;
/// use oxtrap_common::types::{Severity, Thresholds};
///
/// let t = Thresholds { warning: Some(80.0), critical: Some(90.0) };
/// assert_eq!(classify(95.0, Some(&t)), Some(Severity::Critical));
/// assert_eq!(classify(85.0, Some(&t)), Some(Severity::Warning));
/// assert_eq!(classify(10.0, Some(&t)), None);
/// assert_eq!(classify(10.0, None), None);
/// ```
pub fn classify(value: f64, thresholds: Option<&Thresholds>) -> Option<Severity> {
    let thresholds = thresholds?;

    if thresholds.critical.is_some_and(|critical| value >= critical) {
        return Some(Severity::Critical);
    }

    if thresholds.warning.is_some_and(|warning| value >= warning) {
        return Some(Severity::Warning);
    }

    None
}

/// Severity for a value produced by `rule`. Only integer rules are ever
/// classified.
pub fn classify_rule(rule: &Rule, value: &TrapValue) -> Option<Severity> {
    if rule.value_type != ValueType::Integer {
        return None;
    }
    let value = value.as_integer()?;
    classify(value as f64, rule.thresholds.as_ref())
}
