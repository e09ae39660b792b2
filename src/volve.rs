//! Volve Field Dataset Loader
//!
//! Parses Equinor's Volve field real-time drilling logs (CSV) into
//! uniformly-ordered [`Sample`] rows for the replay passes. Supports two
//! header styles:
//!
//! **Format A: Kaggle / drilling contractor format.**
//! Descriptive column names with units, e.g. "Averaged WOB kkgf",
//! "MWD Stick-Slip PKtoPK RPM rpm". This is the format of the Kaggle
//! Volve well F-9A dataset; values are already in replay units.
//!
//! **Format B: WITSML-mnemonic format.**
//! Short mnemonics in SI units, e.g. "WOB" (N), "TORQUE" (N.m),
//! "SURF_RPM" (rev/s). Converted on load.
//!
//! Only on-bottom drilling rows are kept (WOB > 0.5 kkgf and RPM > 15).
//!
//! # Usage
//!
//! ```ignore
//! use tvm_replay::volve::{VolveConfig, VolveReplay};
//!
//! let replay = VolveReplay::load("data/F-9A time.csv", VolveConfig::default())?;
//! let processed = compute_severity_and_events(replay.samples(), &params)?;
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::defaults::{ON_BOTTOM_MIN_RPM, ON_BOTTOM_MIN_WOB, TORQUE_CLIP_KNM};
use crate::types::Sample;

// ============================================================================
// Unit Conversion Constants (Format B)
// ============================================================================

/// Newtons to kilo-kilogram-force
const N_TO_KKGF: f64 = 1.0 / 9_806.65;
/// Newton-metres to kilo-Newton-metres
const NM_TO_KNM: f64 = 1.0 / 1_000.0;
/// Revolutions per second to RPM
const RPS_TO_RPM: f64 = 60.0;
/// Metres per second to metres per hour
const MS_TO_MH: f64 = 3_600.0;

/// ROP readings above this multiple of the 99th percentile are treated as spikes
const ROP_SPIKE_FACTOR: f64 = 1.5;
/// Longest run of spiked ROP readings bridged by interpolation
const ROP_INTERPOLATE_LIMIT: usize = 10;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum VolveError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{0} is empty")]
    Empty(String),

    #[error("{0} has no time column (expected 'DateTime parsed', 'Time s' or TIME)")]
    MissingTimeColumn(String),

    #[error("{source_name}: none of {raw_rows} rows are on-bottom drilling")]
    NoDrillingRows { source_name: String, raw_rows: usize },
}

// ============================================================================
// CSV Quote-Aware Parsing
// ============================================================================

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

// ============================================================================
// Configuration
// ============================================================================

/// On-bottom gate and conditioning limits for a load.
#[derive(Debug, Clone)]
pub struct VolveConfig {
    /// Well identifier (derived from filename if not set)
    pub well_id: Option<String>,
    /// Rows at or below this WOB are off bottom (kkgf)
    pub min_wob_kkgf: f64,
    /// Rows at or below this RPM are not rotating
    pub min_rpm: f64,
    /// Torque is clipped to +- this value (kN.m)
    pub max_torque_abs_knm: f64,
}

impl Default for VolveConfig {
    fn default() -> Self {
        Self {
            well_id: None,
            min_wob_kkgf: ON_BOTTOM_MIN_WOB,
            min_rpm: ON_BOTTOM_MIN_RPM,
            max_torque_abs_knm: TORQUE_CLIP_KNM,
        }
    }
}

// ============================================================================
// Column Mapping
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CsvFormat {
    /// Descriptive names with units, replay units already
    Kaggle,
    /// WITSML mnemonics in SI units
    Mnemonic,
}

impl CsvFormat {
    const fn name(self) -> &'static str {
        match self {
            Self::Kaggle => "Kaggle",
            Self::Mnemonic => "Mnemonic",
        }
    }
}

/// Maps CSV column names to indices for both header styles
#[derive(Debug, Clone)]
struct ColumnMap {
    format: CsvFormat,
    time: Option<usize>,
    datetime_parsed: Option<usize>,
    depth: Option<usize>,
    wob: Option<usize>,
    torque: Option<usize>,
    rpm: Option<usize>,
    rop: Option<usize>,
    mwd_pktopk: Option<usize>,
}

impl ColumnMap {
    /// Build column map from CSV header, auto-detecting format
    fn from_header(header: &str) -> Self {
        let columns = csv_split(header);
        let header_upper = header.to_uppercase();
        let is_kaggle = header_upper.contains("KKGF")
            || header_upper.contains("KN.M")
            || header_upper.contains("AVERAGED RPM")
            || header_upper.contains("DATETIME PARSED");

        let mut map = Self {
            format: if is_kaggle { CsvFormat::Kaggle } else { CsvFormat::Mnemonic },
            time: None,
            datetime_parsed: None,
            depth: None,
            wob: None,
            torque: None,
            rpm: None,
            rop: None,
            mwd_pktopk: None,
        };
        match map.format {
            CsvFormat::Kaggle => map.map_kaggle_columns(&columns),
            CsvFormat::Mnemonic => map.map_mnemonic_columns(&columns),
        }
        map
    }

    fn map_kaggle_columns(&mut self, columns: &[String]) {
        for (idx, col) in columns.iter().enumerate() {
            let col_lower = col.trim().to_lowercase();

            if col_lower == "datetime parsed" {
                self.datetime_parsed = Some(idx);
            } else if col_lower == "time s" || col_lower == "time" {
                self.time = Some(idx);
            }

            if col_lower.starts_with("bit depth m") || col_lower.starts_with("bit depth (md)") {
                // Prefer "Bit Depth (MD)" when both exist
                if self.depth.is_none() || col_lower.contains("(md)") {
                    self.depth = Some(idx);
                }
            }

            // Averaged WOB is the smoothed channel the detector is tuned on
            if col_lower.starts_with("averaged wob") {
                self.wob = Some(idx);
            } else if col_lower.starts_with("weight on bit kkgf") && self.wob.is_none() {
                self.wob = Some(idx);
            }

            if col_lower.starts_with("average surface torque") {
                self.torque = Some(idx);
            } else if col_lower.starts_with("averaged trq") && self.torque.is_none() {
                self.torque = Some(idx);
            }

            if (col_lower.starts_with("averaged rpm") || col_lower.starts_with("average rotary speed"))
                && self.rpm.is_none()
            {
                self.rpm = Some(idx);
            }

            if col_lower.starts_with("rate of penetration m/h") && self.rop.is_none() {
                self.rop = Some(idx);
            }

            if col_lower.starts_with("mwd stick-slip pktopk") {
                self.mwd_pktopk = Some(idx);
            }
        }
    }

    fn map_mnemonic_columns(&mut self, columns: &[String]) {
        for (idx, col) in columns.iter().enumerate() {
            match col.trim().to_uppercase().as_str() {
                "TIME" | "DATETIME" | "TIMESTAMP" => self.time = Some(idx),
                "DEPTH" | "DEPTBITM" | "DBTM" => self.depth = Some(idx),
                "WOB" | "WOBX" | "SWOB" => self.wob = Some(idx),
                "TORQUE" | "TRQ" | "STOR" => self.torque = Some(idx),
                "SURF_RPM" | "RPM" | "RPMX" => self.rpm = Some(idx),
                "ROP_AVG" | "ROP" | "ROPA" => self.rop = Some(idx),
                "SS_PKTOPK" | "MWD_SS_PKTOPK" | "SSLIP" => self.mwd_pktopk = Some(idx),
                _ => {}
            }
        }
    }

    const fn has_time(&self) -> bool {
        self.time.is_some() || self.datetime_parsed.is_some()
    }

    /// Report which columns were found
    fn summary(&self) -> String {
        let checks = [
            ("TIME", self.time.or(self.datetime_parsed)),
            ("DEPTH", self.depth),
            ("WOB", self.wob),
            ("TORQUE", self.torque),
            ("RPM", self.rpm),
            ("ROP", self.rop),
            ("MWD_PKTOPK", self.mwd_pktopk),
        ];
        let found: Vec<&str> = checks.iter().filter(|(_, c)| c.is_some()).map(|(n, _)| *n).collect();
        let missing: Vec<&str> = checks.iter().filter(|(_, c)| c.is_none()).map(|(n, _)| *n).collect();

        format!(
            "[{}] Found {}/{} columns. Present: [{}]. Missing: [{}]",
            self.format.name(),
            found.len(),
            checks.len(),
            found.join(", "),
            missing.join(", "),
        )
    }
}

// ============================================================================
// Volve Replay
// ============================================================================

/// Metadata about a loaded Volve well
#[derive(Debug, Clone, Serialize)]
pub struct VolveWellInfo {
    /// Well identifier (from filename or config)
    pub well_id: String,
    pub source: String,
    /// Detected header style
    pub format: String,
    /// Data rows read from the file
    pub raw_rows: usize,
    /// Rows kept after the on-bottom gate and time dedup
    pub on_bottom_rows: usize,
    /// Rows with an unparseable timestamp
    pub error_rows: usize,
    pub columns_found: String,
    /// Bit depth range in metres, if a depth channel exists
    pub depth_range_m: Option<(f64, f64)>,
    /// Wall-clock time of the first kept row, when the file carries datetimes
    pub start_time: Option<DateTime<Utc>>,
    pub duration_s: f64,
}

/// A loaded well ready for the detection pass.
#[derive(Debug, Clone)]
pub struct VolveReplay {
    samples: Vec<Sample>,
    pub info: VolveWellInfo,
}

/// One parsed row before gating; `t` is absolute seconds.
#[derive(Debug, Clone, Copy)]
struct RawRow {
    t: f64,
    absolute: bool,
    depth: Option<f64>,
    wob: Option<f64>,
    torque: Option<f64>,
    rpm: Option<f64>,
    rop: Option<f64>,
    pktopk: Option<f64>,
}

impl VolveReplay {
    /// Load a Volve CSV file from disk.
    pub fn load(path: impl AsRef<Path>, config: VolveConfig) -> Result<Self, VolveError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| VolveError::Io(path.to_path_buf(), e))?;

        let mut config = config;
        if config.well_id.is_none() {
            config.well_id = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
        }
        Self::from_reader(BufReader::new(file), &path.display().to_string(), config)
    }

    /// Parse CSV text from any buffered reader; `source` names it in logs and errors.
    pub fn from_reader(reader: impl BufRead, source: &str, config: VolveConfig) -> Result<Self, VolveError> {
        let mut lines = reader.lines();

        let header_line = match lines.next() {
            Some(Ok(line)) if !line.trim().is_empty() => line,
            Some(Err(e)) => return Err(VolveError::Io(PathBuf::from(source), e)),
            _ => return Err(VolveError::Empty(source.to_string())),
        };

        let col_map = ColumnMap::from_header(header_line.trim_start_matches('\u{feff}'));
        if !col_map.has_time() {
            return Err(VolveError::MissingTimeColumn(source.to_string()));
        }
        let columns_summary = col_map.summary();
        info!(source, "{}", columns_summary);

        let mut rows = Vec::new();
        let mut raw_rows = 0usize;
        let mut errors = 0usize;

        for (line_idx, line_result) in lines.enumerate() {
            let line_num = line_idx + 2;
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    warn!(line = line_num, error = %e, "Error reading line");
                    errors += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            raw_rows += 1;

            match parse_row(&line, &col_map) {
                Some(row) => rows.push(row),
                None => {
                    if errors < 10 {
                        warn!(line = line_num, "Row has no parseable timestamp, skipped");
                    }
                    errors += 1;
                }
            }
        }

        if raw_rows == 0 {
            return Err(VolveError::Empty(source.to_string()));
        }

        let rows = condition_rows(rows, &config);
        if rows.is_empty() {
            return Err(VolveError::NoDrillingRows {
                source_name: source.to_string(),
                raw_rows,
            });
        }

        let t0 = rows[0].t;
        let samples: Vec<Sample> = rows
            .iter()
            .map(|r| Sample {
                elapsed_s: r.t - t0,
                bit_depth_m: r.depth,
                rpm: r.rpm,
                torque_knm: r.torque,
                wob_kkgf: r.wob,
                rop_mh: r.rop,
                mwd_ss_pktopk: r.pktopk,
                ..Sample::default()
            })
            .collect();

        let depths: Vec<f64> = samples.iter().filter_map(|s| s.bit_depth_m).collect();
        let depth_range_m = (!depths.is_empty()).then(|| {
            (
                depths.iter().copied().fold(f64::INFINITY, f64::min),
                depths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        });
        let start_time = if rows[0].absolute {
            DateTime::<Utc>::from_timestamp_millis((t0 * 1000.0).round() as i64)
        } else {
            None
        };

        let info = VolveWellInfo {
            well_id: config.well_id.clone().unwrap_or_else(|| "unknown".to_string()),
            source: source.to_string(),
            format: col_map.format.name().to_string(),
            raw_rows,
            on_bottom_rows: samples.len(),
            error_rows: errors,
            columns_found: columns_summary,
            depth_range_m,
            start_time,
            duration_s: samples.last().map_or(0.0, |s| s.elapsed_s),
        };

        info!(
            well = %info.well_id,
            format = %info.format,
            raw_rows = info.raw_rows,
            on_bottom = info.on_bottom_rows,
            errors = info.error_rows,
            duration_h = format!("{:.1}", info.duration_s / 3600.0),
            "Volve well loaded"
        );

        Ok(Self { samples, info })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consume and return owned samples
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

// ============================================================================
// Row Parsing
// ============================================================================

fn parse_row(line: &str, col_map: &ColumnMap) -> Option<RawRow> {
    let owned = csv_split(line);
    let fields: Vec<&str> = owned.iter().map(String::as_str).collect();

    let (t, absolute) = parse_timestamp_from_row(&fields, col_map)?;

    let scale = |v: Option<f64>, k: f64| match col_map.format {
        CsvFormat::Kaggle => v,
        CsvFormat::Mnemonic => v.map(|x| x * k),
    };

    Some(RawRow {
        t,
        absolute,
        depth: get_f64(&fields, col_map.depth),
        wob: scale(get_f64(&fields, col_map.wob), N_TO_KKGF),
        torque: scale(get_f64(&fields, col_map.torque), NM_TO_KNM),
        rpm: scale(get_f64(&fields, col_map.rpm), RPS_TO_RPM),
        rop: scale(get_f64(&fields, col_map.rop), MS_TO_MH),
        pktopk: get_f64(&fields, col_map.mwd_pktopk),
    })
}

/// On-bottom gate, torque clip, ROP spike removal, then sort and dedup by time.
fn condition_rows(rows: Vec<RawRow>, config: &VolveConfig) -> Vec<RawRow> {
    let mut kept: Vec<RawRow> = rows
        .into_iter()
        .filter_map(|mut r| {
            // Negative WOB is a hookload artefact, not tension on the bit
            let wob = r.wob?.max(0.0);
            let rpm = r.rpm?;
            if wob <= config.min_wob_kkgf || rpm <= config.min_rpm {
                return None;
            }
            r.wob = Some(wob);
            r.torque = r
                .torque
                .map(|t| t.clamp(-config.max_torque_abs_knm, config.max_torque_abs_knm));
            Some(r)
        })
        .collect();

    kept.sort_by(|a, b| a.t.total_cmp(&b.t));
    kept.dedup_by(|later, earlier| later.t == earlier.t);

    despike_rop(&mut kept);
    kept
}

/// Null ROP readings above 1.5x the 99th percentile, then bridge short gaps linearly.
fn despike_rop(rows: &mut [RawRow]) {
    let rops: Vec<f64> = rows.iter().filter_map(|r| r.rop).collect();
    if rops.len() < 2 {
        return;
    }
    let cap = Data::new(rops).quantile(0.99) * ROP_SPIKE_FACTOR;

    let mut spiked = 0usize;
    for r in rows.iter_mut() {
        if r.rop.is_some_and(|v| v > cap) {
            r.rop = None;
            spiked += 1;
        }
    }
    if spiked == 0 {
        return;
    }

    let mut last_valid: Option<usize> = None;
    let mut i = 0;
    while i < rows.len() {
        if rows[i].rop.is_some() {
            last_valid = Some(i);
            i += 1;
            continue;
        }
        let gap_start = i;
        while i < rows.len() && rows[i].rop.is_none() {
            i += 1;
        }
        if let (Some(lo), true) = (last_valid, i < rows.len()) {
            if let (Some(a), Some(b)) = (rows[lo].rop, rows[i].rop) {
                let span = (i - lo) as f64;
                for (k, row) in rows.iter_mut().enumerate().take(i).skip(gap_start) {
                    if k - gap_start >= ROP_INTERPOLATE_LIMIT {
                        break;
                    }
                    row.rop = Some(a + (b - a) * (k - lo) as f64 / span);
                }
            }
        }
    }

    info!(spiked, cap = format!("{cap:.1}"), "ROP spikes removed");
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns (seconds, is_wall_clock) for the row's timestamp.
fn parse_timestamp_from_row(fields: &[&str], col_map: &ColumnMap) -> Option<(f64, bool)> {
    // Prefer parsed datetime column (Kaggle format)
    let from_col = |idx: Option<usize>| {
        idx.and_then(|i| fields.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .and_then(parse_time_value)
    };
    from_col(col_map.datetime_parsed).or_else(|| from_col(col_map.time))
}

/// Parse a numeric time (seconds or epoch) or a datetime string.
fn parse_time_value(s: &str) -> Option<(f64, bool)> {
    let s = s.trim().trim_matches('"');
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }

    if let Ok(v) = s.parse::<f64>() {
        if !v.is_finite() {
            return None;
        }
        // Epoch milliseconds
        if v > 1e12 {
            return Some((v / 1000.0, true));
        }
        return Some((v, v > 1e9));
    }

    parse_datetime_string(s).map(|dt| (dt.timestamp_millis() as f64 / 1000.0, true))
}

fn parse_datetime_string(s: &str) -> Option<DateTime<Utc>> {
    // "2009-06-27 16:50:29+00:00" (Kaggle parsed format)
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Without timezone (assume UTC)
    [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .map(|dt| dt.and_utc())
}

/// Get a finite f64 field from a CSV row by optional column index
fn get_f64(fields: &[&str], idx: Option<usize>) -> Option<f64> {
    let s = fields.get(idx?)?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") || s == "-" {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// Tests
// ============================================================================
