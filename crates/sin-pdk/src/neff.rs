//! Effective index versus waveguide width
//!
//! Tabulated mode-solver data (`width(um)`, `neff`) is fitted with a cubic
//! spline using not-a-knot end conditions. The fitted model drives the
//! adiabatic taper profile, so fitting is memoized per table content.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PdkError, Result};

const WIDTH_COLUMN: &str = "width(um)";
const NEFF_COLUMN: &str = "neff";

/// TE0 effective index of the 300 nm SiN strip at 1550 nm.
const BUILTIN_TABLE: &str = include_str!("../data/sin300_te0_neff_vs_width.csv");

/// Ordered (width, neff) samples.
#[derive(Debug, Clone, PartialEq)]
pub struct NeffTable {
    widths: Vec<f64>,
    neffs: Vec<f64>,
}

impl NeffTable {
    /// Build a table from parallel columns.
    ///
    /// Widths must be finite and strictly increasing; at least two samples are required.
    pub fn new(widths: Vec<f64>, neffs: Vec<f64>) -> Result<Self> {
        if widths.len() != neffs.len() {
            return Err(PdkError::Table(format!(
                "{} widths but {} effective indices",
                widths.len(),
                neffs.len()
            )));
        }
        if widths.len() < 2 {
            return Err(PdkError::Table(format!(
                "need at least 2 samples, got {}",
                widths.len()
            )));
        }
        if let Some(bad) = widths.iter().chain(neffs.iter()).find(|v| !v.is_finite()) {
            return Err(PdkError::Table(format!("non-finite value {bad}")));
        }
        if let Some(i) = (1..widths.len()).find(|&i| widths[i] <= widths[i - 1]) {
            return Err(PdkError::Table(format!(
                "widths must be strictly increasing (row {}: {} after {})",
                i + 1,
                widths[i],
                widths[i - 1]
            )));
        }
        Ok(Self { widths, neffs })
    }

    /// Read a CSV with `width(um)` and `neff` header columns. Other columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| PdkError::Table(format!("missing `{name}` column")))
        };
        let wcol = column(WIDTH_COLUMN)?;
        let ncol = column(NEFF_COLUMN)?;

        let mut widths = Vec::new();
        let mut neffs = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |col: usize| -> Result<f64> {
                let raw = record.get(col).unwrap_or("");
                raw.parse::<f64>().map_err(|_| {
                    PdkError::Table(format!("row {}: `{}` is not a number", row + 1, raw))
                })
            };
            widths.push(field(wcol)?);
            neffs.push(field(ncol)?);
        }
        Self::new(widths, neffs)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PdkError::io(path, e))?;
        Self::from_reader(file)
    }

    /// The SiN 300 nm table shipped with the PDK.
    pub fn builtin() -> Result<Self> {
        Self::from_reader(BUILTIN_TABLE.as_bytes())
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    pub fn neffs(&self) -> &[f64] {
        &self.neffs
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }
}

/// What to do when asked for a width outside the fitted table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Extend the end polynomial and log a warning.
    #[default]
    Warn,
    /// Evaluate at the nearest table bound.
    Clamp,
    /// Return [`PdkError::OutOfDomain`].
    Error,
}

/// Piecewise cubic through every table sample.
#[derive(Debug, Clone)]
pub struct NeffModel {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// First derivative at each knot
    slopes: Vec<f64>,
    policy: Extrapolation,
}

impl NeffModel {
    pub fn fit(table: &NeffTable) -> Self {
        let xs = table.widths.clone();
        let ys = table.neffs.clone();
        let slopes = knot_slopes(&xs, &ys);
        Self {
            xs,
            ys,
            slopes,
            policy: Extrapolation::default(),
        }
    }

    pub fn with_policy(mut self, policy: Extrapolation) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> Extrapolation {
        self.policy
    }

    /// Fitted width range (µm)
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn eval(&self, width: f64) -> Result<f64> {
        self.eval_with(width, self.policy)
    }

    pub fn eval_with(&self, width: f64, policy: Extrapolation) -> Result<f64> {
        let (min, max) = self.domain();
        if width >= min && width <= max {
            return Ok(self.evaluate(width));
        }
        match policy {
            Extrapolation::Warn => {
                tracing::warn!(
                    "neff extrapolated at width {} um, outside the validated range [{}, {}] um",
                    width,
                    min,
                    max
                );
                Ok(self.evaluate(width))
            }
            Extrapolation::Clamp => Ok(self.evaluate(width.clamp(min, max))),
            Extrapolation::Error => Err(PdkError::OutOfDomain { width, min, max }),
        }
    }

    /// Evaluate a batch of widths. Under [`Extrapolation::Warn`] one warning
    /// covers every out-of-range width in the batch.
    pub fn eval_many(&self, widths: &[f64]) -> Result<Vec<f64>> {
        let (min, max) = self.domain();
        let outside = widths.iter().copied().filter(|w| !(min..=max).contains(w));
        let (lo, hi, count) = outside.fold((f64::INFINITY, f64::NEG_INFINITY, 0), |(lo, hi, n), w| {
            (lo.min(w), hi.max(w), n + 1)
        });
        if count == 0 {
            return Ok(widths.iter().map(|&w| self.evaluate(w)).collect());
        }

        match self.policy {
            Extrapolation::Warn => {
                tracing::warn!(
                    "neff extrapolated at {} width(s) between {} and {} um, outside the validated range [{}, {}] um",
                    count,
                    lo,
                    hi,
                    min,
                    max
                );
                Ok(widths.iter().map(|&w| self.evaluate(w)).collect())
            }
            _ => widths.iter().map(|&w| self.eval(w)).collect(),
        }
    }

    fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        // Index of the interval containing x; end intervals extend outward.
        let i = self.xs.partition_point(|&k| k <= x).clamp(1, n - 1) - 1;

        let h = self.xs[i + 1] - self.xs[i];
        let d = (self.ys[i + 1] - self.ys[i]) / h;
        let (s0, s1) = (self.slopes[i], self.slopes[i + 1]);
        let c2 = (3.0 * d - 2.0 * s0 - s1) / h;
        let c3 = (s0 + s1 - 2.0 * d) / (h * h);

        let t = x - self.xs[i];
        self.ys[i] + t * (s0 + t * (c2 + t * c3))
    }
}

/// Knot derivatives for a not-a-knot cubic spline.
///
/// Two samples give a line and three a single parabola.
fn knot_slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let d: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    if n == 2 {
        return vec![d[0], d[0]];
    }
    if n == 3 {
        let a = (d[1] - d[0]) / (xs[2] - xs[0]);
        return xs
            .iter()
            .map(|&x| d[0] + a * (2.0 * x - xs[0] - xs[1]))
            .collect();
    }

    // Tridiagonal system: lower[i] * s[i-1] + diag[i] * s[i] + upper[i] * s[i+1] = rhs[i]
    let mut lower = vec![0.0; n];
    let mut diag = vec![0.0; n];
    let mut upper = vec![0.0; n];
    let mut rhs = vec![0.0; n];

    for i in 1..n - 1 {
        lower[i] = h[i];
        diag[i] = 2.0 * (h[i - 1] + h[i]);
        upper[i] = h[i - 1];
        rhs[i] = 3.0 * (h[i] * d[i - 1] + h[i - 1] * d[i]);
    }

    let span = xs[2] - xs[0];
    diag[0] = h[1];
    upper[0] = span;
    rhs[0] = ((h[0] + 2.0 * span) * h[1] * d[0] + h[0] * h[0] * d[1]) / span;

    let span = xs[n - 1] - xs[n - 3];
    lower[n - 1] = span;
    diag[n - 1] = h[n - 3];
    rhs[n - 1] =
        (h[n - 2] * h[n - 2] * d[n - 3] + (2.0 * span + h[n - 2]) * h[n - 3] * d[n - 2]) / span;

    solve_tridiagonal(&lower, &mut diag, &upper, &mut rhs);
    rhs
}

/// Thomas algorithm. Solution is left in `rhs`.
fn solve_tridiagonal(lower: &[f64], diag: &mut [f64], upper: &[f64], rhs: &mut [f64]) {
    let n = diag.len();
    for i in 1..n {
        let m = lower[i] / diag[i - 1];
        diag[i] -= m * upper[i - 1];
        rhs[i] -= m * rhs[i - 1];
    }
    rhs[n - 1] /= diag[n - 1];
    for i in (0..n - 1).rev() {
        rhs[i] = (rhs[i] - upper[i] * rhs[i + 1]) / diag[i];
    }
}

struct CacheEntry {
    digest: [u8; 32],
    model: Arc<NeffModel>,
}

/// Fitted models keyed by table path, refitted whenever the file content changes.
#[derive(Default)]
pub struct NeffCache {
    entries: HashMap<PathBuf, CacheEntry>,
    fits: usize,
}

impl NeffCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the model for `path`, fitting it if the file is new or has changed.
    pub fn get_or_fit(&mut self, path: &Path) -> Result<Arc<NeffModel>> {
        let bytes = std::fs::read(path).map_err(|e| PdkError::io(path, e))?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if let Some(entry) = self.entries.get(&key) {
            if entry.digest == digest {
                return Ok(Arc::clone(&entry.model));
            }
            tracing::info!("neff table {:?} changed on disk, refitting", key);
        }

        let table = NeffTable::from_reader(bytes.as_slice())?;
        let model = Arc::new(NeffModel::fit(&table));
        self.fits += 1;
        tracing::debug!("fitted neff model from {:?} ({} samples)", key, table.len());
        self.entries.insert(
            key,
            CacheEntry {
                digest,
                model: Arc::clone(&model),
            },
        );
        Ok(model)
    }

    pub fn invalidate(&mut self, path: &Path) {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.entries.remove(&key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of fits performed so far
    pub fn fits(&self) -> usize {
        self.fits
    }
}

fn shared_cache() -> &'static Mutex<NeffCache> {
    static CACHE: OnceLock<Mutex<NeffCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(NeffCache::new()))
}

/// Process-wide memoized model for a table file.
pub fn shared_model(path: &Path) -> Result<Arc<NeffModel>> {
    let mut cache = shared_cache().lock().unwrap_or_else(|e| e.into_inner());
    cache.get_or_fit(path)
}

/// Process-wide model of the built-in table, fitted on first use.
pub fn builtin_model() -> Result<Arc<NeffModel>> {
    static MODEL: OnceLock<Arc<NeffModel>> = OnceLock::new();
    if let Some(model) = MODEL.get() {
        return Ok(Arc::clone(model));
    }
    let model = Arc::new(NeffModel::fit(&NeffTable::builtin()?));
    Ok(Arc::clone(MODEL.get_or_init(|| model)))
}
