//! Model evaluation for the transmission law and the wave packet.
//!
//! The fitter relies on two primitive operations:
//! - predict `y(x)` given a parameter vector (for residuals/plots)
//! - fill the row of partial derivatives `∂y/∂p_j` at `x` (for the Jacobian)
//!
//! Neither clamps its inputs; bound handling belongs to the fitter.

use std::f64::consts::{LN_2, PI};

use crate::domain::ModelKind;

/// Predict `y(x)` for the given model kind.
///
/// # Panics
/// Panics if `params` is shorter than `model.param_count()`.
pub fn predict(model: ModelKind, x: f64, params: &[f64]) -> f64 {
    match model {
        ModelKind::TransmissionLaw => {
            let (a, b, c, d) = (params[0], params[1], params[2], params[3]);
            a / 2.0 * (1.0 - b * ((x - d) / c).sin())
        }
        ModelKind::WavePacket => {
            let (i0, f, sigma, phi) = (params[0], params[1], params[2], params[3]);
            i0 / 2.0 * (1.0 + envelope(f, x) * (2.0 * PI * sigma * x + phi).cos())
        }
    }
}

/// Fill `out` with the partial derivatives of `y(x)` with respect to each parameter.
///
/// # Panics
/// Panics if `params` or `out` are shorter than `model.param_count()`.
pub fn fill_gradient_row(model: ModelKind, x: f64, params: &[f64], out: &mut [f64]) {
    match model {
        ModelKind::TransmissionLaw => {
            let (a, b, c, d) = (params[0], params[1], params[2], params[3]);
            let u = (x - d) / c;
            let (s, co) = u.sin_cos();
            out[0] = (1.0 - b * s) / 2.0;
            out[1] = -a * s / 2.0;
            out[2] = a * b * co * (x - d) / (2.0 * c * c);
            out[3] = a * b * co / (2.0 * c);
        }
        ModelKind::WavePacket => {
            let (i0, f, sigma, phi) = (params[0], params[1], params[2], params[3]);
            let e = envelope(f, x);
            let theta = 2.0 * PI * sigma * x + phi;
            let (s, co) = theta.sin_cos();
            out[0] = (1.0 + e * co) / 2.0;
            // d/df exp(-(π f x)² / (4 ln 2)) = -e · (π x)² · f / (2 ln 2)
            out[1] = -i0 / 2.0 * co * e * (PI * x).powi(2) * f / (2.0 * LN_2);
            out[2] = -i0 / 2.0 * e * s * 2.0 * PI * x;
            out[3] = -i0 / 2.0 * e * s;
        }
    }
}

fn envelope(f: f64, x: f64) -> f64 {
    (-(PI * f * x).powi(2) / (4.0 * LN_2)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmission_law_known_points() {
        let p = [2.0, 0.5, 1.0, 0.0];
        assert!((predict(ModelKind::TransmissionLaw, 0.0, &p) - 1.0).abs() < 1e-12);
        // sin(π/2) = 1 → a/2 · (1 − b)
        let y = predict(ModelKind::TransmissionLaw, PI / 2.0, &p);
        assert!((y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn wave_packet_peaks_at_origin_with_zero_phase() {
        let p = [1.0, 1.0, 20.0, 0.0];
        assert!((predict(ModelKind::WavePacket, 0.0, &p) - 1.0).abs() < 1e-12);
        // Far from the centre the envelope vanishes and y → I/2.
        assert!((predict(ModelKind::WavePacket, 50.0, &p) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn models_evaluate_anywhere_without_clamping() {
        let y = predict(ModelKind::TransmissionLaw, 1e6, &[-3.0, 7.0, 1e-3, -40.0]);
        assert!(y.is_finite());
        let y = predict(ModelKind::WavePacket, -1e3, &[5.0, -2.0, 1e4, 100.0]);
        assert!(y.is_finite());
    }

    #[test]
    fn analytic_gradients_match_finite_differences() {
        let cases: [(ModelKind, [f64; 4], [f64; 3]); 2] = [
            (ModelKind::TransmissionLaw, [1.3, 0.9, 0.8, 0.2], [0.1, 1.7, 4.0]),
            (ModelKind::WavePacket, [0.9, 1.2, 3.0, 0.7], [-0.3, 0.05, 0.4]),
        ];
        for (model, params, xs) in cases {
            for x in xs {
                let mut grad = [0.0; 4];
                fill_gradient_row(model, x, &params, &mut grad);
                for j in 0..4 {
                    let h = 1e-6 * params[j].abs().max(1.0);
                    let mut up = params;
                    let mut dn = params;
                    up[j] += h;
                    dn[j] -= h;
                    let fd = (predict(model, x, &up) - predict(model, x, &dn)) / (2.0 * h);
                    assert!(
                        (fd - grad[j]).abs() < 1e-6 * fd.abs().max(1.0),
                        "{model:?} param {j} at x={x}: analytic {} vs fd {fd}",
                        grad[j]
                    );
                }
            }
        }
    }
}
