//! Equivalence harness: run reference and solution side by side.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use kbook_core::{Device, KbookError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::Model;
use crate::problem::Problem;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("problem '{0}' has no solution")]
    NoSolution(String),

    #[error("{model} output shape {got:?} differs from documented {expected:?}")]
    ShapeMismatch {
        model: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] KbookError),
}

/// Harness settings. Missing JSON fields take the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub seed: u64,
    pub atol: f32,
    pub rtol: f32,
    pub correctness_trials: usize,
    pub perf_trials: usize,
    #[serde(with = "device_str")]
    pub device: Device,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            atol: 1e-2,
            rtol: 1e-2,
            correctness_trials: 1,
            perf_trials: 3,
            device: Device::Cpu,
        }
    }
}

impl EvalConfig {
    pub fn from_json(json: &str) -> Result<Self, EvalError> {
        serde_json::from_str(json).map_err(|e| EvalError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EvalError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }
}

/// `Device` as its `cpu` / `cuda:N` string form.
mod device_str {
    use kbook_core::Device;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(device: &Device, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(device)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Device, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of evaluating one problem.
#[derive(Clone, Debug, Serialize)]
pub struct EvalReport {
    pub name: String,
    pub output_shape: Vec<usize>,
    pub shape_ok: bool,
    pub max_abs_diff: f32,
    pub correct: bool,
    /// Mean reference wall time in milliseconds; `None` when not timed.
    pub reference_time: Option<f64>,
    /// Mean solution wall time in milliseconds; `None` when not timed.
    pub solution_time: Option<f64>,
    pub speedup: Option<f64>,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.correct { "PASS" } else { "FAIL" };
        write!(
            f,
            "{:<26} {} shape={:?} max_abs_diff={:.3e}",
            self.name, verdict, self.output_shape, self.max_abs_diff
        )?;
        if let (Some(r), Some(s)) = (self.reference_time, self.solution_time) {
            write!(f, " ref={r:.3}ms sol={s:.3}ms")?;
        }
        if let Some(x) = self.speedup {
            write!(f, " speedup={x:.2}x")?;
        }
        Ok(())
    }
}

fn shape_of(t: &Tensor) -> Vec<usize> {
    t.shape().dims().to_vec()
}

/// Run the reference only and check its output against the documented shape.
pub fn check_shape(problem: &dyn Problem, rng: &mut StdRng) -> Result<Vec<usize>, EvalError> {
    problem.validate()?;
    let expected = problem.output_shape();
    let reference = problem.reference(rng)?;
    let out = reference.forward(&problem.inputs(rng))?;
    if shape_of(&out) != expected {
        return Err(EvalError::ShapeMismatch { model: "reference", expected, got: shape_of(&out) });
    }
    Ok(expected)
}

/// Mean wall time of `trials` forward passes, in milliseconds.
fn time_forward(model: &dyn Model, inputs: &[Tensor], trials: usize) -> Result<f64, EvalError> {
    let start = Instant::now();
    for _ in 0..trials {
        model.forward(inputs)?;
    }
    Ok(start.elapsed().as_secs_f64() * 1e3 / trials as f64)
}

/// Check a problem's solution against its reference.
///
/// Trial `t` seeds every RNG with `seed + t`: reference and solution are
/// built from identically seeded RNGs and the inputs come from a third. The
/// solution passes when every element satisfies
/// `|s - r| <= atol + rtol * |r|` on every trial. Timing runs only for
/// correct solutions.
pub fn evaluate(problem: &dyn Problem, cfg: &EvalConfig) -> Result<EvalReport, EvalError> {
    let spec = problem.spec();
    problem.validate()?;
    let expected = problem.output_shape();
    let trials = cfg.correctness_trials.max(1);

    let mut worst = 0.0f32;
    let mut correct = true;
    let mut shape_ok = true;
    let mut models: Option<(Box<dyn Model>, Box<dyn Model>, Vec<Tensor>)> = None;

    for trial in 0..trials {
        let seed = cfg.seed.wrapping_add(trial as u64);
        let reference = problem.reference(&mut StdRng::seed_from_u64(seed))?;
        let solution = problem
            .solution(&mut StdRng::seed_from_u64(seed), cfg.device)?
            .ok_or_else(|| EvalError::NoSolution(spec.name.to_string()))?;
        let inputs = problem.inputs(&mut StdRng::seed_from_u64(seed));

        let ref_out = reference.forward(&inputs)?;
        if shape_of(&ref_out) != expected {
            return Err(EvalError::ShapeMismatch { model: "reference", expected, got: shape_of(&ref_out) });
        }
        let sol_out = solution.forward(&inputs)?;
        if shape_of(&sol_out) != expected {
            warn!(problem = spec.name, got = ?shape_of(&sol_out), expected = ?expected, "solution shape mismatch");
            shape_ok = false;
            correct = false;
            worst = f32::NAN;
            break;
        }

        let diff = sol_out.max_abs_diff(&ref_out)?;
        let close = sol_out.allclose(&ref_out, cfg.atol, cfg.rtol)?;
        debug!(problem = spec.name, trial, seed, max_abs_diff = diff, close, "correctness trial");
        worst = if diff.is_nan() { f32::NAN } else { worst.max(diff) };
        if !close {
            correct = false;
            warn!(problem = spec.name, trial, max_abs_diff = diff, atol = cfg.atol, rtol = cfg.rtol, "solution differs from reference");
            break;
        }
        models = Some((reference, solution, inputs));
    }

    let (mut reference_time, mut solution_time, mut speedup) = (None, None, None);
    if let (true, Some((reference, solution, inputs))) = (correct && cfg.perf_trials > 0, models) {
        let r = time_forward(reference.as_ref(), &inputs, cfg.perf_trials)?;
        let s = time_forward(solution.as_ref(), &inputs, cfg.perf_trials)?;
        reference_time = Some(r);
        solution_time = Some(s);
        speedup = (s > 0.0).then(|| r / s);
    }

    let report = EvalReport {
        name: spec.name.to_string(),
        output_shape: expected,
        shape_ok,
        max_abs_diff: worst,
        correct,
        reference_time,
        solution_time,
        speedup,
    };
    info!(problem = spec.name, correct, max_abs_diff = worst, "evaluated");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let cfg = EvalConfig::from_json(r#"{ "seed": 7, "device": "cpu" }"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.atol, 1e-2);
        assert_eq!(cfg.perf_trials, 3);
        assert_eq!(EvalConfig::from_json("{}").unwrap(), EvalConfig::default());
    }

    #[test]
    fn test_config_device_strings() {
        let cfg = EvalConfig::from_json(r#"{ "device": "cuda:1" }"#).unwrap();
        assert_eq!(cfg.device, Device::Cuda(1));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"cuda:1\""));
        assert!(EvalConfig::from_json(r#"{ "device": "tpu" }"#).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let err = EvalConfig::from_json_file("/nonexistent/kbook.json").unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_report_display() {
        let report = EvalReport {
            name: "tanh".into(),
            output_shape: vec![2, 3],
            shape_ok: true,
            max_abs_diff: 0.0,
            correct: true,
            reference_time: Some(1.5),
            solution_time: Some(0.5),
            speedup: Some(3.0),
        };
        let text = report.to_string();
        assert!(text.starts_with("tanh"));
        assert!(text.contains("PASS"));
        assert!(text.contains("speedup=3.00x"));
    }
}
