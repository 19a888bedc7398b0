use std::f64::consts::PI;

use nsrun_core::Likelihood;

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn gaussian_logl(theta: &[f64], mu: &[f64], sigma: f64) -> f64 {
    let ndim = theta.len() as f64;
    let rad2: f64 = theta
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let m = mu.get(i).copied().unwrap_or(0.0);
            (x - m) * (x - m)
        })
        .sum();
    -(2.0 * PI * sigma * sigma).ln() * ndim / 2.0 - rad2 / (2.0 * sigma * sigma)
}

/// Spherically symmetric Gaussian centred on the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    ndim: usize,
    sigma: f64,
}

impl Gaussian {
    /// Gaussian of width `sigma` in `ndim` dimensions.
    pub fn new(ndim: usize, sigma: f64) -> Self {
        Self { ndim, sigma }
    }
}

impl Likelihood for Gaussian {
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn evaluate(&self, theta: &[f64]) -> f64 {
        gaussian_logl(theta, &[], self.sigma)
    }

    fn name(&self) -> &str {
        "gaussian"
    }
}

/// Exponential power likelihood, `log L = c - (r^2 / sigma^2)^power / 2`.
///
/// `power = 1` recovers the Gaussian; larger powers give lighter tails.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpPower {
    ndim: usize,
    sigma: f64,
    power: f64,
}

impl ExpPower {
    /// Exponential power likelihood in `ndim` dimensions.
    pub fn new(ndim: usize, sigma: f64, power: f64) -> Self {
        Self { ndim, sigma, power }
    }
}

impl Likelihood for ExpPower {
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn evaluate(&self, theta: &[f64]) -> f64 {
        let rad2: f64 = theta.iter().map(|x| x * x).sum();
        let n = self.ndim as f64;
        let shape = n / (2.0 * self.power);
        let log_norm = n.ln() + ln_gamma(n / 2.0)
            - (n / 2.0) * PI.ln()
            - n * self.sigma.ln()
            - ln_gamma(1.0 + shape)
            - (1.0 + shape) * 2f64.ln();
        log_norm - 0.5 * (rad2 / (self.sigma * self.sigma)).powf(self.power)
    }

    fn name(&self) -> &str {
        "exp_power"
    }
}

/// Four-component Gaussian mixture with separated means in the first two
/// dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMix {
    ndim: usize,
    sep: f64,
    sigma: f64,
    weights: [f64; 4],
}

impl GaussianMix {
    /// Mixture with separation 4, unit width and weights 0.4/0.3/0.2/0.1.
    pub fn new(ndim: usize) -> Self {
        Self {
            ndim: ndim.max(2),
            sep: 4.0,
            sigma: 1.0,
            weights: [0.4, 0.3, 0.2, 0.1],
        }
    }

    fn means(&self) -> [[f64; 2]; 4] {
        let sep = self.sep;
        [[0.0, sep], [0.0, -sep], [sep, 0.0], [-sep, 0.0]]
    }
}

impl Likelihood for GaussianMix {
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn evaluate(&self, theta: &[f64]) -> f64 {
        let components: Vec<f64> = self
            .means()
            .iter()
            .zip(self.weights)
            .map(|(mu, weight)| gaussian_logl(theta, mu, self.sigma) + weight.ln())
            .collect();
        log_sum_exp(&components)
    }

    fn name(&self) -> &str {
        "gaussian_mix"
    }
}

/// Lanczos approximation of `ln Γ(x)` for `x > 0`.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let series = COEFFS[1..]
        .iter()
        .enumerate()
        .fold(COEFFS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_peaks_at_origin() {
        let likelihood = Gaussian::new(2, 1.0);
        let peak = likelihood.evaluate(&[0.0, 0.0]);
        assert!((peak + (2.0 * PI).ln()).abs() < 1e-12);
        assert!(likelihood.evaluate(&[1.0, 0.0]) < peak);
    }

    #[test]
    fn mixture_favours_heaviest_component() {
        let mix = GaussianMix::new(2);
        assert!(mix.evaluate(&[0.0, 4.0]) > mix.evaluate(&[-4.0, 0.0]));
        assert_eq!(mix.ndim(), 2);
    }

    #[test]
    fn exp_power_reduces_to_gaussian_shape() {
        let likelihood = ExpPower::new(3, 1.0, 1.0);
        let drop = likelihood.evaluate(&[0.0; 3]) - likelihood.evaluate(&[1.0, 0.0, 0.0]);
        assert!((drop - 0.5).abs() < 1e-12);
        let gaussian = Gaussian::new(3, 1.0);
        let point = [0.3, -0.2, 1.1];
        assert!((likelihood.evaluate(&point) - gaussian.evaluate(&point)).abs() < 1e-9);
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-10);
    }
}
