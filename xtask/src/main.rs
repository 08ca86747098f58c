use anyhow::{anyhow, bail, Context, Result};
use audiot::kernel::KernelLifecycle;
use audiot::lp::{emd_with_options, EmdOptions};
use audiot::ot::{
    CostMatrixBuild, CostMatrixConfig, CostMatrixKernel, Distance, InterpolationMethod,
    NormalizedSpectrum1D, OtInterpolationConfig, OtInterpolationKernel, SpectralInterpolate,
};
use audiot::spectrum::{SpectrumConfig, SpectrumKernel};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const PYTHON_BIN_ENV: &str = "AUDIOT_PYTHON";
const DEFAULT_PYTHON_BIN: &str = "python";

/// Largest elementwise gap to POT/numpy accepted as agreement.
const AGREEMENT_TOLERANCE: f64 = 1e-9;

const PY_REFERENCE_SCRIPT: &str = r#"
import json
import sys
import time
import numpy as np
import ot

env = json.loads(sys.stdin.read())
op = env["op"]
p = env["payload"]

def arr(key):
    return np.asarray(p[key], dtype=float)

def nearest(support, f):
    return int(np.abs(support - f).argmin())

def landing(i, j, alpha, method, support):
    if method == "int":
        return int((1 - alpha) * i + alpha * j)
    if method == "round":
        return round((1 - alpha) * i + alpha * j)
    return nearest(support, (1 - alpha) * support[i] + alpha * support[j])

def sanitized_cost():
    m = arr("cost_matrix").copy()
    finite = np.isfinite(m)
    m[~finite] = np.max(m[finite])
    return m

def compute():
    if op == "cost_matrix":
        d = arr("source_support")[:, None] - arr("target_support")[None, :]
        return (np.abs(d) if p["distance"] == "euclidean" else d ** 2), None
    if op == "fft_normalized":
        x = arr("signal").copy()
        k = int(p["smooth_len"])
        if k > 0:
            ramp = np.linspace(0, 1, k)
            x[:k] *= ramp
            x[-k:] *= ramp[::-1]
        freqs = np.fft.rfftfreq(len(x), d=1 / float(p["sample_rate"]))
        mag = np.abs(np.fft.rfft(x))[freqs <= float(p["max_frequency"])]
        return mag / mag.sum(), None
    if op == "emd":
        a, b, m = arr("source"), arr("target"), sanitized_cost()
        return ot.emd(a, b, m), float(ot.emd2(a, b, m))
    if op == "interpolate":
        support = arr("support")
        a, b, m = arr("source"), arr("target"), sanitized_cost()
        plan = ot.emd(a, b, m)
        out = np.zeros(len(support))
        for i, j in zip(*np.nonzero(plan)):
            out[landing(i, j, float(p["alpha"]), p["method"], support)] += plan[i, j]
        return out, float(ot.emd2(a, b, m))
    raise RuntimeError(f"unsupported op: {op}")

output, cost = compute()
iters = max(int(env["iters"]), 1)
t0 = time.perf_counter_ns()
for _ in range(iters):
    compute()
elapsed = time.perf_counter_ns() - t0

print(json.dumps({
    "output": np.asarray(output, dtype=float).reshape(-1).tolist(),
    "cost": cost,
    "avg_ns": elapsed / iters,
}))
"#;

const PY_VERSIONS_SCRIPT: &str = r#"
import json, sys
import numpy, ot, matplotlib
print(json.dumps({
    "python": sys.version.split()[0],
    "numpy": numpy.__version__,
    "pot": ot.__version__,
    "matplotlib": matplotlib.__version__,
}))
"#;

const PY_REPORT_SCRIPT: &str = r#"
import json
import sys
import matplotlib
matplotlib.use("Agg")
import matplotlib.pyplot as plt
from matplotlib.backends.backend_pdf import PdfPages

payload = json.loads(sys.stdin.read())
with PdfPages(payload["report_pdf"]) as pdf:
    for case in payload["cases"]:
        rust, ref = case["rust"], case["reference"]
        x = range(len(ref))
        fig, (top, bottom) = plt.subplots(2, 1, figsize=(10, 6), sharex=True)
        top.plot(x, ref, label="POT / numpy", linewidth=1.6)
        top.plot(x, rust, label="audiot", linewidth=1.0, alpha=0.8)
        top.set_title(case["case_id"])
        top.legend()
        bottom.plot(x, [r - p for r, p in zip(rust, ref)], color="tab:red", linewidth=1.0)
        bottom.set_xlabel("flattened index")
        bottom.set_ylabel("audiot - reference")
        fig.tight_layout()
        pdf.savefig(fig)
        plt.close(fig)
"#;

#[derive(Debug, Deserialize)]
struct Reference {
    output: Vec<f64>,
    cost: Option<f64>,
    avg_ns: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Versions {
    python: String,
    numpy: String,
    pot: String,
    matplotlib: String,
}

/// Transport invariants checked on the Rust side of a case.
#[derive(Debug, Default, Serialize)]
struct TransportChecks {
    /// Worst gap between the plan's row/column sums and the input spectra.
    marginal_residual: Option<f64>,
    /// `|sum(interpolated) - sum(source)|`.
    mass_error: Option<f64>,
    /// `|audiot cost - ot.emd2| / max(1, |ot.emd2|)`.
    cost_delta: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ContractRow {
    case_id: String,
    len: usize,
    max_abs_error: f64,
    rmse: f64,
    #[serde(flatten)]
    checks: TransportChecks,
    agrees: bool,
    rust_ns: f64,
    python_ns: f64,
}

#[derive(Debug, Serialize)]
struct ContractBundle {
    generated_epoch_seconds: u64,
    python_executable: String,
    versions: Versions,
    rows: Vec<ContractRow>,
}

/// Collects rows and the data behind the PDF report.
struct Contracts {
    python_bin: PathBuf,
    rows: Vec<ContractRow>,
    pages: Vec<serde_json::Value>,
}

impl Contracts {
    fn reference(&self, op: &str, payload: serde_json::Value, iters: usize) -> Result<Reference> {
        let stdout = run_python(
            &self.python_bin,
            PY_REFERENCE_SCRIPT,
            &json!({ "op": op, "iters": iters, "payload": payload }),
        )?;
        serde_json::from_str(stdout.trim()).with_context(|| format!("parsing `{op}` reference"))
    }

    fn record(
        &mut self,
        case_id: &str,
        rust: Vec<f64>,
        reference: Reference,
        checks: TransportChecks,
        rust_ns: f64,
    ) -> Result<()> {
        if rust.len() != reference.output.len() {
            bail!(
                "case {case_id}: audiot produced {} values, reference {}",
                rust.len(),
                reference.output.len()
            );
        }
        let (max_abs_error, rmse) = error_norms(&rust, &reference.output);
        let within = |v: Option<f64>| v.map_or(true, |v| v <= AGREEMENT_TOLERANCE);
        let agrees = max_abs_error <= AGREEMENT_TOLERANCE
            && within(checks.marginal_residual)
            && within(checks.mass_error)
            && within(checks.cost_delta);
        self.rows.push(ContractRow {
            case_id: case_id.to_string(),
            len: rust.len(),
            max_abs_error,
            rmse,
            checks,
            agrees,
            rust_ns,
            python_ns: reference.avg_ns,
        });
        self.pages.push(json!({
            "case_id": case_id,
            "rust": rust,
            "reference": reference.output,
        }));
        Ok(())
    }
}

fn main() -> Result<()> {
    match std::env::args().nth(1).as_deref() {
        Some("contracts") => run_contracts(),
        _ => {
            eprintln!("Usage:");
            eprintln!("  cargo run -p xtask -- contracts");
            eprintln!("  ({PYTHON_BIN_ENV} selects the interpreter, default `{DEFAULT_PYTHON_BIN}`)");
            Ok(())
        }
    }
}

fn synthetic_signal(len: usize, sample_rate: f64, partials: &[(f64, f64)]) -> Vec<f64> {
    (0..len)
        .map(|n| {
            let t = n as f64 / sample_rate;
            partials
                .iter()
                .map(|(hz, gain)| gain * (2.0 * std::f64::consts::PI * hz * t).sin())
                .sum()
        })
        .collect()
}

fn rows_of(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn marginal_residual(plan: &Array2<f64>, source: &[f64], target: &[f64]) -> f64 {
    let rows = plan.sum_axis(Axis(1));
    let cols = plan.sum_axis(Axis(0));
    rows.iter()
        .zip(source)
        .chain(cols.iter().zip(target))
        .map(|(got, want)| (got - want).abs())
        .fold(0.0, f64::max)
}

fn cost_gap(rust: f64, reference: f64) -> f64 {
    (rust - reference).abs() / reference.abs().max(1.0)
}

fn error_norms(rust: &[f64], reference: &[f64]) -> (f64, f64) {
    if rust.is_empty() {
        return (0.0, 0.0);
    }
    let (max_abs, sum_sq) = rust
        .iter()
        .zip(reference)
        .map(|(a, b)| (a - b).abs())
        .fold((0.0f64, 0.0f64), |(max, sq), d| (max.max(d), sq + d * d));
    (max_abs, (sum_sq / rust.len() as f64).sqrt())
}

fn time_ns<T, E: std::fmt::Display>(iters: usize, mut f: impl FnMut() -> Result<T, E>) -> Result<f64> {
    let iters = iters.max(1);
    let start = Instant::now();
    for _ in 0..iters {
        f().map_err(|e| anyhow!("timed run failed: {e}"))?;
    }
    Ok(start.elapsed().as_nanos() as f64 / iters as f64)
}

fn run_contracts() -> Result<()> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let out_dir = PathBuf::from(format!("target/contracts/{ts}"));
    fs::create_dir_all(&out_dir).context("creating contract output directory")?;

    let python_bin = std::env::var_os(PYTHON_BIN_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON_BIN));
    let mut contracts = Contracts {
        python_bin,
        rows: Vec::new(),
        pages: Vec::new(),
    };

    // Two harmonic tones a fifth apart.
    let sample_rate = 2048.0f64;
    let max_frequency = 400.0f64;
    let smooth_len = 64usize;
    let source_signal = synthetic_signal(512, sample_rate, &[(110.0, 1.0), (220.0, 0.5), (330.0, 0.25)]);
    let target_signal = synthetic_signal(512, sample_rate, &[(165.0, 1.0), (330.0, 0.4), (247.5, 0.3)]);

    let spectrum_kernel = SpectrumKernel::try_new(SpectrumConfig {
        sample_rate,
        max_frequency: Some(max_frequency),
        smooth_len,
    })?;
    let (source, support) = spectrum_kernel
        .run_alloc(&source_signal)
        .map_err(|e| anyhow!("source spectrum failed: {e}"))?;
    let (target, _) = spectrum_kernel
        .run_alloc(&target_signal)
        .map_err(|e| anyhow!("target spectrum failed: {e}"))?;
    let support = support.into_inner().to_vec();
    let source = source.to_vec();
    let target = target.to_vec();

    let reference = contracts.reference(
        "fft_normalized",
        json!({
            "signal": source_signal,
            "sample_rate": sample_rate,
            "max_frequency": max_frequency,
            "smooth_len": smooth_len
        }),
        200,
    )?;
    let rust_ns = time_ns(200, || spectrum_kernel.run_alloc(&source_signal))?;
    let mass_error = Some((source.iter().sum::<f64>() - 1.0).abs());
    contracts.record(
        "fft_normalized_f64",
        source.clone(),
        reference,
        TransportChecks {
            mass_error,
            ..TransportChecks::default()
        },
        rust_ns,
    )?;

    for (case_id, distance, name, target_offset) in [
        ("cost_matrix_squared_f64", Distance::Squared, "squared", 0.0),
        ("cost_matrix_euclidean_rect_f64", Distance::Euclidean, "euclidean", 2.5),
    ] {
        let target_support = support
            .iter()
            .take(support.len() / 2)
            .map(|f| f + target_offset)
            .collect::<Vec<_>>();
        let kernel = CostMatrixKernel::try_new(CostMatrixConfig { distance })?;
        let cost = kernel
            .run_alloc(&support, &target_support)
            .map_err(|e| anyhow!("{case_id}: {e}"))?;
        let reference = contracts.reference(
            "cost_matrix",
            json!({
                "source_support": support,
                "target_support": target_support,
                "distance": name
            }),
            200,
        )?;
        let rust_ns = time_ns(200, || kernel.run_alloc(&support, &target_support))?;
        contracts.record(
            case_id,
            cost.iter().copied().collect(),
            reference,
            TransportChecks::default(),
            rust_ns,
        )?;
    }

    let cost = CostMatrixKernel::try_new(CostMatrixConfig {
        distance: Distance::Squared,
    })?
    .run_alloc(&support, &support)
    .map_err(|e| anyhow!("shared cost matrix failed: {e}"))?;

    let options = EmdOptions::default();
    let solve = || {
        emd_with_options(
            ArrayView1::from(&source),
            ArrayView1::from(&target),
            cost.view(),
            &options,
        )
    };
    let solution = solve().map_err(|e| anyhow!("emd failed: {e}"))?;
    let reference = contracts.reference(
        "emd",
        json!({ "source": source, "target": target, "cost_matrix": rows_of(&cost) }),
        20,
    )?;
    let checks = TransportChecks {
        marginal_residual: Some(marginal_residual(&solution.plan, &source, &target)),
        cost_delta: reference.cost.map(|c| cost_gap(solution.cost, c)),
        ..TransportChecks::default()
    };
    let rust_ns = time_ns(20, solve)?;
    contracts.record(
        "emd_plan_f64",
        solution.plan.iter().copied().collect(),
        reference,
        checks,
        rust_ns,
    )?;

    let alpha = 0.4f64;
    for (case_id, method, name) in [
        ("interpolate_int_f64", InterpolationMethod::Int, "int"),
        ("interpolate_round_f64", InterpolationMethod::Round, "round"),
        ("interpolate_closest_f64", InterpolationMethod::Closest, "closest"),
    ] {
        let kernel = OtInterpolationKernel::try_new(OtInterpolationConfig {
            method,
            ..OtInterpolationConfig::new(alpha)
        })?;
        let result = kernel
            .run_alloc(&support, &source, &target, cost.view())
            .map_err(|e| anyhow!("{case_id}: {e}"))?;
        let reference = contracts.reference(
            "interpolate",
            json!({
                "support": support,
                "source": source,
                "target": target,
                "cost_matrix": rows_of(&cost),
                "alpha": alpha,
                "method": name
            }),
            20,
        )?;
        let checks = TransportChecks {
            marginal_residual: Some(marginal_residual(&result.plan, &source, &target)),
            mass_error: Some((result.spectrum.sum() - source.iter().sum::<f64>()).abs()),
            cost_delta: reference.cost.map(|c| cost_gap(result.cost, c)),
        };
        let rust_ns = time_ns(20, || kernel.run_alloc(&support, &source, &target, cost.view()))?;
        contracts.record(case_id, result.spectrum.to_vec(), reference, checks, rust_ns)?;
    }

    let versions: Versions = serde_json::from_str(
        run_python(&contracts.python_bin, PY_VERSIONS_SCRIPT, &json!({}))?.trim(),
    )
    .context("parsing python versions")?;

    let report_pdf = out_dir.join("report.pdf");
    run_python(
        &contracts.python_bin,
        PY_REPORT_SCRIPT,
        &json!({ "cases": contracts.pages, "report_pdf": report_pdf.to_string_lossy() }),
    )
    .context("rendering report.pdf")?;

    let bundle = ContractBundle {
        generated_epoch_seconds: ts,
        python_executable: contracts.python_bin.to_string_lossy().into_owned(),
        versions,
        rows: contracts.rows,
    };
    write_summary_csv(&out_dir.join("summary.csv"), &bundle.rows)?;
    fs::write(
        out_dir.join("summary.json"),
        serde_json::to_vec_pretty(&bundle).context("serializing summary bundle")?,
    )
    .context("writing summary.json")?;

    let failing = bundle.rows.iter().filter(|row| !row.agrees).count();
    println!("Contract artifacts generated in: {}", out_dir.display());
    println!("  - summary.csv, summary.json, report.pdf");
    println!("  - cases: {} ({failing} outside {AGREEMENT_TOLERANCE:e})", bundle.rows.len());
    if failing > 0 {
        bail!("{failing} contract case(s) disagree with the reference");
    }
    Ok(())
}

/// Run `script` with `payload` as JSON on stdin and return its stdout.
fn run_python(python_bin: &Path, script: &str, payload: &serde_json::Value) -> Result<String> {
    let mut child = Command::new(python_bin)
        .arg("-c")
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning python interpreter at {}", python_bin.display()))?;
    {
        let mut stdin = child.stdin.take().context("opening python stdin")?;
        serde_json::to_writer(&mut stdin, payload).context("writing payload to python stdin")?;
        stdin.flush().context("flushing python stdin")?;
    }
    let output = child.wait_with_output().context("waiting for python")?;
    if !output.status.success() {
        bail!("python failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    String::from_utf8(output.stdout).context("python stdout is not utf8")
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.3e}")).unwrap_or_default()
}

fn write_summary_csv(path: &Path, rows: &[ContractRow]) -> Result<()> {
    let mut out = String::from(
        "case_id,len,max_abs_error,rmse,marginal_residual,mass_error,cost_delta,agrees,rust_ns,python_ns\n",
    );
    for row in rows {
        out.push_str(&format!(
            "{},{},{:.3e},{:.3e},{},{},{},{},{:.0},{:.0}\n",
            row.case_id,
            row.len,
            row.max_abs_error,
            row.rmse,
            fmt_opt(row.checks.marginal_residual),
            fmt_opt(row.checks.mass_error),
            fmt_opt(row.checks.cost_delta),
            row.agrees,
            row.rust_ns,
            row.python_ns,
        ));
    }
    fs::write(path, out).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn marginal_residual_reports_the_worst_row_or_column() {
        let plan = array![[0.25, 0.25], [0.0, 0.5]];
        assert_eq!(marginal_residual(&plan, &[0.5, 0.5], &[0.25, 0.75]), 0.0);
        assert_eq!(marginal_residual(&plan, &[0.5, 0.5], &[0.5, 0.5]), 0.25);
    }

    #[test]
    fn error_norms_are_max_abs_and_rms() {
        let (max_abs, rmse) = error_norms(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0, 2.0]);
        assert_eq!(max_abs, 2.0);
        assert_eq!(rmse, 1.0);
        assert_eq!(error_norms(&[], &[]), (0.0, 0.0));
    }
}
