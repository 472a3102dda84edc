use rand::Rng;

pub const MIN_HOLD_SECS: f64 = 0.05;

/// Jitters a continuous quantity (seconds) by up to `±value·strength·0.5`.
pub fn randomize_secs<R: Rng + ?Sized>(value: f64, strength: f64, rng: &mut R) -> f64 {
    if strength == 0.0 {
        return value;
    }
    let delta = (value * strength * 0.5).abs();
    if !delta.is_finite() || delta == 0.0 {
        return value;
    }
    value + rng.gen_range(-delta..=delta)
}

/// Jitters a screen coordinate by up to `±max(1, round(|value|·strength·0.1))` pixels.
pub fn randomize_coord<R: Rng + ?Sized>(value: i32, strength: f64, rng: &mut R) -> i32 {
    if strength == 0.0 {
        return value;
    }
    let spread = ((f64::from(value).abs() * strength * 0.1).round()).max(1.0);
    let offset = rng.gen_range(-spread..=spread).round();
    value.saturating_add(offset as i32)
}

/// How long a click holds the button down.
pub fn hold_secs<R: Rng + ?Sized>(strength: f64, rng: &mut R) -> f64 {
    let upper = 0.1 + strength.max(0.0) * 0.2;
    rng.gen_range(MIN_HOLD_SECS..=upper)
}
