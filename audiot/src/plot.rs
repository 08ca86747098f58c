//! Transport plan inspection and debug plotting.
//!
//! [`plan_window`] and [`log_scale`] prepare a plan for display. The
//! `python_plot_*` helpers hand the data to a non-interactive matplotlib
//! process and save a PNG.

use core::ops::Range;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;
use crate::support::frequency_to_index;
use ndarray::{s, Array2, ArrayView2};
use num_traits::Float;

/// Epsilon added to plan entries before taking their logarithm.
pub const DEFAULT_LOG_EPSILON: f64 = 1e-5;

/// Errors raised by plot utilities.
#[derive(Debug)]
pub enum PlotError {
    /// The data to plot was rejected.
    Data(Error),
    /// Underlying process or filesystem I/O failure.
    Io(std::io::Error),
    /// Python subprocess stdin was unavailable.
    StdinUnavailable,
    /// Python subprocess exited unsuccessfully.
    PythonExitFailure(ExitStatus),
}

impl core::fmt::Display for PlotError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlotError::Data(err) => write!(f, "invalid plot data: {err}"),
            PlotError::Io(err) => write!(f, "plot I/O failure: {err}"),
            PlotError::StdinUnavailable => {
                write!(f, "failed to open stdin for python plotting process")
            }
            PlotError::PythonExitFailure(status) => {
                write!(f, "python plotting script failed with status: {status}")
            }
        }
    }
}

impl std::error::Error for PlotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlotError::Data(err) => Some(err),
            PlotError::Io(err) => Some(err),
            PlotError::StdinUnavailable | PlotError::PythonExitFailure(_) => None,
        }
    }
}

impl From<std::io::Error> for PlotError {
    fn from(value: std::io::Error) -> Self {
        PlotError::Io(value)
    }
}

impl From<Error> for PlotError {
    fn from(value: Error) -> Self {
        PlotError::Data(value)
    }
}

/// Frequency window (Hz) of a transport plan.
///
/// Rows follow the source spectrum and columns the target spectrum. A missing
/// start begins at the first bin, a missing end runs to the last bin included.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanWindow<F> {
    /// Lowest source frequency shown.
    pub source_start: Option<F>,
    /// Source frequencies above this one are hidden.
    pub source_end: Option<F>,
    /// Lowest target frequency shown.
    pub target_start: Option<F>,
    /// Target frequencies above this one are hidden.
    pub target_end: Option<F>,
}

/// Sub-plan selected by a [`PlanWindow`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSlice<F> {
    /// Selected source bins.
    pub rows: Range<usize>,
    /// Selected target bins.
    pub cols: Range<usize>,
    /// `plan[rows, cols]`
    pub plan: Array2<F>,
}

fn bin_range<F: Float>(
    support: &[F],
    start: Option<F>,
    end: Option<F>,
    arg: &str,
) -> crate::error::Result<Range<usize>> {
    let lo = match start {
        Some(f) => frequency_to_index(support, f)?.unwrap_or(0),
        None => 0,
    };
    let hi = match end {
        Some(f) => frequency_to_index(support, f)?.unwrap_or(support.len()),
        None => support.len(),
    };
    if lo >= hi {
        return Err(Error::invalid_argument(arg, "frequency window selects no bin"));
    }
    Ok(lo..hi)
}

/// Slice a plan to a frequency window.
///
/// Rows live on `source_support` and columns on `target_support`. Bounds go
/// through [`frequency_to_index`], so each start bin is the first bin above
/// the start frequency and each end keeps bins up to and including the end
/// frequency.
///
/// # Errors
/// `InvalidArgument` when the plan is not `(source_len, target_len)` or a
/// window selects no bin.
pub fn plan_window<F: Float>(
    source_support: &[F],
    target_support: &[F],
    plan: ArrayView2<'_, F>,
    window: &PlanWindow<F>,
) -> crate::error::Result<PlanSlice<F>> {
    if plan.dim() != (source_support.len(), target_support.len()) {
        return Err(Error::invalid_argument(
            "plan",
            format!(
                "expected a {}x{} plan over the supports, got {:?}",
                source_support.len(),
                target_support.len(),
                plan.dim()
            ),
        ));
    }
    let rows = bin_range(
        source_support,
        window.source_start,
        window.source_end,
        "source window",
    )?;
    let cols = bin_range(
        target_support,
        window.target_start,
        window.target_end,
        "target window",
    )?;
    let sub = plan.slice(s![rows.clone(), cols.clone()]).to_owned();
    Ok(PlanSlice {
        rows,
        cols,
        plan: sub,
    })
}

/// `ln(plan + epsilon)`, so empty cells stay finite on a log color scale.
pub fn log_scale<F: Float>(plan: ArrayView2<'_, F>, epsilon: F) -> Array2<F> {
    plan.mapv(|p| (p + epsilon).ln())
}

/// Python has no literal for non-finite floats, so they never reach a script.
fn finite_f64<F: Float>(values: &[F], arg: &str) -> crate::error::Result<Vec<f64>> {
    values
        .iter()
        .map(|v| v.to_f64().filter(|v| v.is_finite()))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::invalid_argument(arg, "values to plot must be finite"))
}

fn output_path_or_default<P: AsRef<Path>>(output_path: Option<P>, stem: &str) -> PathBuf {
    match output_path {
        Some(path) => path.as_ref().to_path_buf(),
        None => {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            PathBuf::from(format!("target/plots/{stem}_{ts}.png"))
        }
    }
}

fn run_python(script: &str, output_path: PathBuf) -> Result<PathBuf, PlotError> {
    let mut python = std::process::Command::new("python")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null()) // noisy
        .stderr(std::process::Stdio::null()) // noisy
        .spawn()?;

    if let Some(mut stdin) = python.stdin.take() {
        stdin.write_all(script.as_bytes())?;
    } else {
        return Err(PlotError::StdinUnavailable);
    }

    let status = python.wait()?;
    if !status.success() {
        return Err(PlotError::PythonExitFailure(status));
    }
    tracing::info!(path = %output_path.display(), "saved plot");
    Ok(output_path)
}

fn prepare_output(output_path: &Path) -> Result<String, PlotError> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(output_path.to_string_lossy().replace('\\', "\\\\"))
}

/// Plot several spectra over one frequency support and save a PNG.
///
/// `signals` pairs each spectrum with its legend label. Without an
/// `output_path` the image goes to `target/plots/`. Returns the written path.
pub fn python_plot_signals<F: Float, P: AsRef<Path>>(
    support: &[F],
    signals: &[(&str, &[F])],
    title: &str,
    output_path: Option<P>,
) -> Result<PathBuf, PlotError> {
    for (label, signal) in signals {
        if signal.len() != support.len() {
            return Err(Error::invalid_argument(
                label,
                format!(
                    "spectrum has {} bins, support has {}",
                    signal.len(),
                    support.len()
                ),
            )
            .into());
        }
    }
    let labels = signals.iter().map(|(label, _)| *label).collect::<Vec<_>>();
    let support = finite_f64(support, "support")?;
    let values = signals
        .iter()
        .map(|(label, signal)| finite_f64(signal, label))
        .collect::<crate::error::Result<Vec<_>>>()?;
    let output_path = output_path_or_default(output_path, "signals");
    let output_path_literal = prepare_output(&output_path)?;

    let script = format!(
        r#"
import matplotlib
matplotlib.use("Agg")
import matplotlib.pyplot as plt

support = {:?}
labels = {:?}
signals = {:?}
fig = plt.figure(figsize=(10, 4))
for label, signal in zip(labels, signals):
    plt.plot(support, signal, label=label, linewidth=1.5)
plt.xlabel("Frequency (Hz)")
plt.ylabel("Normalized Magnitude")
plt.title({:?})
plt.grid(True, which="both", ls="--")
plt.legend()
fig.tight_layout()
fig.savefig(r"{}", dpi=150)
plt.close(fig)
"#,
        support,
        labels,
        values,
        title,
        output_path_literal
    );
    run_python(&script, output_path)
}

/// Plot a transport plan between its source (left) and target (top) spectra.
///
/// The plan is cropped with [`plan_window`]. With `log_epsilon` the colors
/// show [`log_scale`] of the plan. Non-finite values, such as the log of an
/// empty cell with a zero epsilon, are rejected before python starts.
#[allow(clippy::too_many_arguments)]
pub fn python_plot_plan<F: Float, P: AsRef<Path>>(
    source_support: &[F],
    target_support: &[F],
    source: &[F],
    target: &[F],
    plan: ArrayView2<'_, F>,
    window: &PlanWindow<F>,
    log_epsilon: Option<F>,
    output_path: Option<P>,
) -> Result<PathBuf, PlotError> {
    if source.len() != source_support.len() {
        return Err(Error::invalid_argument("source", "spectrum and support lengths differ").into());
    }
    if target.len() != target_support.len() {
        return Err(Error::invalid_argument("target", "spectrum and support lengths differ").into());
    }
    let slice = plan_window(source_support, target_support, plan, window)?;
    let matrix = match log_epsilon {
        Some(eps) => log_scale(slice.plan.view(), eps),
        None => slice.plan,
    };
    let rows = matrix
        .rows()
        .into_iter()
        .map(|row| finite_f64(&row.to_vec(), "plan"))
        .collect::<crate::error::Result<Vec<_>>>()?;
    let row_support = finite_f64(&source_support[slice.rows.clone()], "source_support")?;
    let col_support = finite_f64(&target_support[slice.cols.clone()], "target_support")?;
    let source = finite_f64(&source[slice.rows.clone()], "source")?;
    let target = finite_f64(&target[slice.cols.clone()], "target")?;
    let title = if log_epsilon.is_some() {
        "OT Plan (log scale)"
    } else {
        "OT Plan"
    };

    let output_path = output_path_or_default(output_path, "plan");
    let output_path_literal = prepare_output(&output_path)?;
    let script = format!(
        r#"
import matplotlib
matplotlib.use("Agg")
import matplotlib.pyplot as plt

row_support = {:?}
col_support = {:?}
source = {:?}
target = {:?}
matrix = {:?}
fig = plt.figure(figsize=(8, 8))
gs = fig.add_gridspec(3, 3, height_ratios=[.01, 1, 6], width_ratios=[1, 6, .3])
ax_title = fig.add_subplot(gs[0, 1])
ax_title.axis("off")
ax_title.set_title({:?})
ax = fig.add_subplot(gs[2, 1])
extent = [col_support[0], col_support[-1], row_support[-1], row_support[0]]
im = ax.imshow(matrix, aspect="auto", cmap="viridis", origin="upper", extent=extent)
ax.axis("off")
ax_target = fig.add_subplot(gs[1, 1], sharex=ax)
ax_target.plot(col_support, target, "r")
ax_target.set_yticks([])
ax_target.set_xlabel("Target signal - Frequency (Hz)")
ax_source = fig.add_subplot(gs[2, 0], sharey=ax)
ax_source.plot(source, row_support, "b")
ax_source.set_ylabel("Source signal - Frequency (Hz)")
ax_source.invert_xaxis()
ax_source.set_xticks([])
ax.set_xlim(col_support[0], col_support[-1])
ax.set_ylim(row_support[-1], row_support[0])
fig.colorbar(im, cax=fig.add_subplot(gs[2, 2]))
fig.tight_layout()
fig.savefig(r"{}", dpi=150)
plt.close(fig)
"#,
        row_support,
        col_support,
        source,
        target,
        rows,
        title,
        output_path_literal
    );
    run_python(&script, output_path)
}
