use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Get a parameter value with a default fallback
pub fn get_param(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

/// Extract a parameter as i32, rounded, with a default value
pub fn get_rounded_param(params: &HashMap<String, f64>, key: &str, default: i32) -> i32 {
    let raw = params.get(key).copied().unwrap_or(default as f64);
    if !raw.is_finite() {
        return default;
    }
    raw.round() as i32
}

/// Extract a parameter as usize, rounded and clamped to a range with finite checks
pub fn get_param_usize_rounded_clamped(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
    min: usize,
    max: usize,
) -> usize {
    let raw = params.get(key).copied().unwrap_or(default as f64);
    if !raw.is_finite() {
        return default;
    }
    raw.round().clamp(min as f64, max as f64) as usize
}

/// Parses a `{"name": number}` JSON object into a parameter map, skipping
/// non-numeric entries with an error instead of coercing them.
pub fn parse_parameter_map_from_json(json: &str) -> Result<HashMap<String, f64>> {
    let raw: HashMap<String, Value> =
        serde_json::from_str(json).map_err(|error| anyhow!("Invalid parameter JSON: {}", error))?;

    let mut parameters = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        let number = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| anyhow!("Parameter `{}` must be a finite number, got {}", key, value))?;
        parameters.insert(key, number);
    }

    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_parameter_maps() {
        let parameters =
            parse_parameter_map_from_json(r#"{"stopLossRatio": 0.05, "atrPeriod": 14}"#).unwrap();
        assert!((get_param(&parameters, "stopLossRatio", 0.0) - 0.05).abs() < 1e-12);
        assert_eq!(get_param_usize_rounded_clamped(&parameters, "atrPeriod", 20, 1, 100), 14);
    }

    #[test]
    fn rejects_non_numeric_parameters() {
        assert!(parse_parameter_map_from_json(r#"{"mode": "atr"}"#).is_err());
        assert!(parse_parameter_map_from_json("not json").is_err());
    }

    #[test]
    fn clamps_and_defaults() {
        let mut parameters = HashMap::new();
        parameters.insert("lookback".to_string(), 1_000.0);
        assert_eq!(
            get_param_usize_rounded_clamped(&parameters, "lookback", 10, 3, 100),
            100
        );
        assert_eq!(get_rounded_param(&parameters, "missing", 7), 7);
    }
}
