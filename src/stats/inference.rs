//! Inferential statistics: OLS trend regression and two-sample t-tests.
//!
//! p-values come from the Student t distribution via the regularized
//! incomplete beta function.

use super::descriptive::{mean, variance};
use serde::Serialize;
use std::f64::consts::PI;

/// Lanczos coefficients (g = 7, n = 9).
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x) by the Lanczos approximation, with reflection below 0.5.
fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return PI.ln() - (PI * x).sin().abs().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let mut a = LANCZOS[0];
    for (i, coef) in LANCZOS.iter().enumerate().skip(1) {
        a += coef / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta I_x(a, b).
fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn student_t_p_value(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return 1.0;
    }
    if t.is_infinite() {
        return 0.0;
    }
    regularized_incomplete_beta(df / (df + t * t), df / 2.0, 0.5).clamp(0.0, 1.0)
}

/// Least squares fit of values against their sequence index 0..n.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub std_err: f64,
}

/// Needs at least three points so the residual has a degree of freedom.
pub fn linear_regression(values: &[f64]) -> Option<Regression> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(values)?;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();
    let r_squared = if syy == 0.0 {
        0.0
    } else {
        (sxy * sxy / (sxx * syy)).clamp(0.0, 1.0)
    };

    let df = nf - 2.0;
    let std_err = (ss_res.max(0.0) / df / sxx).sqrt();
    let p_value = if std_err == 0.0 {
        if slope == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        student_t_p_value(slope / std_err, df)
    };

    Some(Regression {
        slope,
        intercept,
        r_squared,
        p_value,
        std_err,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TTest {
    /// Absent when both samples are constant.
    pub t_statistic: Option<f64>,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
}

/// Welch's unequal-variance t-test; each sample needs two values.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<TTest> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mean_a, mean_b) = (mean(a)?, mean(b)?);
    let se_a = variance(a)? / na;
    let se_b = variance(b)? / nb;
    let se2 = se_a + se_b;

    if se2 == 0.0 {
        return Some(TTest {
            t_statistic: None,
            degrees_of_freedom: na + nb - 2.0,
            p_value: if mean_a == mean_b { 1.0 } else { 0.0 },
        });
    }

    let t = (mean_a - mean_b) / se2.sqrt();
    let df = se2 * se2 / (se_a * se_a / (na - 1.0) + se_b * se_b / (nb - 1.0));
    Some(TTest {
        t_statistic: Some(t),
        degrees_of_freedom: df,
        p_value: student_t_p_value(t, df),
    })
}
