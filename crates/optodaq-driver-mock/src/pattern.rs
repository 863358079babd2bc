//! Spectral and spatial profiles for simulated frames.

/// Relative lamp intensity per detector column, peak normalised to 1.0.
///
/// A broad continuum centred slightly blue of the middle of the chip, with two
/// narrow emission lines on top. Deterministic, so repeated captures differ only by
/// noise.
pub fn emission_profile(width: usize) -> Vec<f64> {
    if width == 0 {
        return Vec::new();
    }
    let w = width as f64;
    let continuum_centre = 0.45 * w;
    let continuum_sigma = 0.3 * w;
    let lines = [(0.3 * w, 0.004 * w, 0.6), (0.7 * w, 0.006 * w, 0.35)];

    let mut profile: Vec<f64> = (0..width)
        .map(|x| {
            let x = x as f64;
            let mut value = gaussian(x, continuum_centre, continuum_sigma);
            for (centre, sigma, amplitude) in lines {
                value += amplitude * gaussian(x, centre, sigma.max(0.5));
            }
            value
        })
        .collect();

    let peak = profile.iter().copied().fold(f64::MIN, f64::max);
    if peak > 0.0 {
        for value in &mut profile {
            *value /= peak;
        }
    }
    profile
}

/// Relative illumination per detector row: the image of the entrance slit.
///
/// Flat over the central half of the chip with Gaussian roll-off towards the edges.
pub fn slit_profile(height: usize) -> Vec<f64> {
    let h = height as f64;
    let lower = 0.25 * h;
    let upper = 0.75 * h;
    let sigma = (0.05 * h).max(0.5);
    (0..height)
        .map(|y| {
            let y = y as f64;
            if y < lower {
                gaussian(y, lower, sigma)
            } else if y > upper {
                gaussian(y, upper, sigma)
            } else {
                1.0
            }
        })
        .collect()
}

#[inline]
fn gaussian(x: f64, centre: f64, sigma: f64) -> f64 {
    let d = x - centre;
    (-d * d / (2.0 * sigma * sigma)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission_profile_normalised() {
        let profile = emission_profile(1024);
        assert_eq!(profile.len(), 1024);
        let peak = profile.iter().copied().fold(f64::MIN, f64::max);
        assert!((peak - 1.0).abs() < 1e-9);
        assert!(profile.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_emission_line_stands_out() {
        let profile = emission_profile(1000);
        assert!(profile[300] > profile[290] * 1.2);
    }

    #[test]
    fn test_slit_profile_shape() {
        let profile = slit_profile(256);
        assert_eq!(profile.len(), 256);
        assert_eq!(profile[128], 1.0);
        assert!(profile[0] < 0.01);
        assert!(profile[255] < 0.01);
    }

    #[test]
    fn test_empty_profiles() {
        assert!(emission_profile(0).is_empty());
        assert!(slit_profile(0).is_empty());
    }
}
