/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Halves round up, towards positive infinity
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Mean rounded half-up to a whole number; 0 when there is nothing to average
pub fn rounded_mean(values: &[f64]) -> u32 {
    mean(values).map_or(0, |m| round_half_up(m).max(0.0) as u32)
}
