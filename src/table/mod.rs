//! Time-indexed signal table
//!
//! A `TimeSeriesTable` holds one recording as a dense sample matrix
//! (rows = samples, columns = header entries) and resolves column and
//! time-interval queries against it. EEG, gyro, ECG and contact-quality
//! channels all live in the same matrix; their kind is derived from the
//! header once and cached.

pub mod classifier;

pub use classifier::{classify_header, ChannelKind, QUALITY_PREFIX};

use crate::config::ChannelConfig;
use crate::error::{Result, SignalError};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashSet;

/// Column holding the unix timestamp of each sample
pub const TIMESTAMP_STRING: &str = "Timestamp";
/// Column holding the ECG lead
pub const ECG_HEADER: &str = "ECG";
/// First timestamp of a synthesized time column
pub const TIME_START: f64 = 558345300.0;

/// Parsed tabular input as delivered by a file reader
#[derive(Debug, Clone)]
pub struct TableInput {
    pub header: Vec<String>,
    /// Rows = samples, columns aligned with `header`
    pub data: Array2<f64>,
    pub sampling_rate: Option<f64>,
    pub file_path: String,
}

impl TableInput {
    pub fn new(header: Vec<String>, data: Array2<f64>) -> Self {
        Self {
            header,
            data,
            sampling_rate: None,
            file_path: String::new(),
        }
    }

    /// Build from row vectors, rejecting ragged rows
    pub fn from_rows(header: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let width = header.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(SignalError::ShapeMismatch(format!(
                "row {} has {} values, header has {} columns",
                i,
                row.len(),
                width
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| SignalError::ShapeMismatch(e.to_string()))?;
        Ok(Self::new(header, data))
    }

    pub fn with_sampling_rate(mut self, sampling_rate: f64) -> Self {
        self.sampling_rate = Some(sampling_rate);
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }
}

/// Representation of a recorded signal table
///
/// ```text
/// header = ["Timestamp", "X", "Y", "AF3", "F3", "ECG"]
/// data   = [[1456820379.00, 1, 2, 3, 9, 0],
///           [1456820379.25, 1, 2, 4, 9, 1],
///           ...]
/// ```
///
/// Single owner, no internal locking: mutation (`add_column`, `set_column`,
/// `norm_gyro_data`) needs `&mut self`.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    header: Vec<String>,
    data: Array2<f64>,
    kinds: Vec<ChannelKind>,
    sampling_rate: f64,
    file_path: String,
    config: ChannelConfig,
    pub has_eeg_data: bool,
    pub has_gyro_data: bool,
    pub has_eeg_quality: bool,
    pub has_ecg_data: bool,
}

impl TimeSeriesTable {
    /// Build a table from parsed input.
    ///
    /// If the header has no "Timestamp" column one is synthesized from
    /// `TIME_START` at the supplied sampling rate (or the configured default)
    /// and inserted as the first column.
    pub fn new(input: TableInput, config: &ChannelConfig) -> Result<Self> {
        let TableInput {
            header,
            data,
            sampling_rate,
            file_path,
        } = input;

        if header.len() != data.ncols() {
            return Err(SignalError::ShapeMismatch(format!(
                "header has {} columns, data has {}",
                header.len(),
                data.ncols()
            )));
        }
        let mut seen = HashSet::with_capacity(header.len());
        for name in &header {
            if !seen.insert(name.as_str()) {
                return Err(SignalError::DuplicateColumn(name.clone()));
            }
        }
        if let Some(rate) = sampling_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(SignalError::InvalidParameter(format!(
                    "sampling rate must be positive, got {}",
                    rate
                )));
            }
        }

        let kinds = classify_header(&header, config);
        let mut table = Self {
            header,
            data,
            kinds,
            sampling_rate: config.sampling_rate,
            file_path,
            config: config.clone(),
            has_eeg_data: false,
            has_gyro_data: false,
            has_eeg_quality: false,
            has_ecg_data: false,
        };

        if !table.header.iter().any(|h| h == TIMESTAMP_STRING) {
            let rate = sampling_rate.unwrap_or(config.sampling_rate);
            table.create_time_data(rate)?;
        }
        table.set_data_types();
        table.set_sampling_rate(sampling_rate);

        log::debug!(
            "[TABLE] {} rows x {} columns from '{}' at {:.3} Hz",
            table.len(),
            table.header.len(),
            table.file_path,
            table.sampling_rate
        );
        Ok(table)
    }

    fn create_time_data(&mut self, sampling_rate: f64) -> Result<()> {
        let step = 1.0 / sampling_rate;
        let time: Vec<f64> = (0..self.len()).map(|i| TIME_START + i as f64 * step).collect();
        self.add_column(TIMESTAMP_STRING, &time)
    }

    fn set_data_types(&mut self) {
        self.has_eeg_data = self.kinds.contains(&ChannelKind::Eeg);
        self.has_gyro_data = self.kinds.contains(&ChannelKind::Gyro);
        self.has_eeg_quality = self.kinds.contains(&ChannelKind::Quality);
        self.has_ecg_data = self.kinds.contains(&ChannelKind::Ecg);
    }

    /// Use the given rate, or derive it from the timestamp column
    pub fn set_sampling_rate(&mut self, sampling_rate: Option<f64>) {
        self.sampling_rate = match sampling_rate {
            Some(rate) => rate,
            None => self.calc_sampling_rate(),
        };
    }

    /// Sample count divided by the timestamp span; falls back to the
    /// configured rate when the span is zero, negative or undefined.
    fn calc_sampling_rate(&self) -> f64 {
        match self.duration() {
            Some(duration) if duration > 0.0 && duration.is_finite() => {
                self.len() as f64 / duration
            }
            other => {
                log::warn!(
                    "[TABLE] Cannot derive sampling rate from duration {:?} in '{}', using default {} Hz",
                    other,
                    self.file_path,
                    self.config.sampling_rate
                );
                self.config.sampling_rate
            }
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn kinds(&self) -> &[ChannelKind] {
        &self.kinds
    }

    /// Cached kind of a column
    pub fn kind_of(&self, name: &str) -> Option<ChannelKind> {
        self.column_index(name).map(|i| self.kinds[i])
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Number of samples (rows)
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_count(&self) -> usize {
        self.len()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Whole column, or `None` if `name` is not in the header
    pub fn get_column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.get_column_range(name, 0, None, None)
    }

    /// Rows `[offset, limit)` of a column.
    ///
    /// Without `limit` the end is `offset + length`, or the table end when
    /// `length` is also absent. An explicit `limit` always wins over `length`.
    /// Bounds past the table end are clamped like a slice.
    pub fn get_column_range(
        &self,
        name: &str,
        offset: usize,
        limit: Option<usize>,
        length: Option<usize>,
    ) -> Option<ArrayView1<'_, f64>> {
        let index = self.column_index(name)?;
        let total = self.len();
        let limit = match (limit, length) {
            (Some(limit), _) => limit,
            (None, Some(length)) => offset.saturating_add(length),
            (None, None) => total,
        };
        let limit = limit.min(total);
        let offset = offset.min(limit);
        Some(self.data.column(index).slice_move(s![offset..limit]))
    }

    /// Timestamp column, same range rules as [`Self::get_column_range`]
    pub fn get_time(
        &self,
        offset: usize,
        limit: Option<usize>,
        length: Option<usize>,
    ) -> Option<ArrayView1<'_, f64>> {
        self.get_column_range(TIMESTAMP_STRING, offset, limit, length)
    }

    /// Overwrite a column in place. Absent names are ignored.
    pub fn set_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let Some(index) = self.column_index(name) else {
            return Ok(());
        };
        if values.len() != self.len() {
            return Err(SignalError::ShapeMismatch(format!(
                "column '{}' has {} rows, got {} values",
                name,
                self.len(),
                values.len()
            )));
        }
        for (cell, &value) in self.data.column_mut(index).iter_mut().zip(values) {
            *cell = value;
        }
        Ok(())
    }

    /// Stack columns; rows of the result follow `names`.
    ///
    /// `None` if any name is missing.
    pub fn get_columns<S: AsRef<str>>(&self, names: &[S]) -> Option<Array2<f64>> {
        let indices: Vec<usize> = names
            .iter()
            .map(|n| self.column_index(n.as_ref()))
            .collect::<Option<_>>()?;
        Some(Array2::from_shape_fn(
            (indices.len(), self.len()),
            |(row, sample)| self.data[[sample, indices[row]]],
        ))
    }

    /// Insert a column at the front of the header and rebuild the matrix.
    ///
    /// Channel kinds and the `has_*` group flags are recomputed.
    pub fn add_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        if self.column_index(name).is_some() {
            return Err(SignalError::DuplicateColumn(name.to_string()));
        }
        if values.len() != self.len() {
            return Err(SignalError::ShapeMismatch(format!(
                "new column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.len()
            )));
        }

        let column = ArrayView2::from_shape((values.len(), 1), values)
            .map_err(|e| SignalError::ShapeMismatch(e.to_string()))?;
        self.data = ndarray::concatenate(Axis(1), &[column, self.data.view()])
            .map_err(|e| SignalError::ShapeMismatch(e.to_string()))?;
        self.header.insert(0, name.to_string());
        self.kinds = classify_header(&self.header, &self.config);
        self.set_data_types();
        Ok(())
    }

    /// Index of the first row whose timestamp is at or after `from_time`
    pub fn get_time_index(&self, from_time: f64) -> Result<usize> {
        let time = self.timestamps()?;
        self.check_time_in_data(&time, from_time)?;
        time.iter()
            .position(|&t| t >= from_time)
            .ok_or_else(|| self.out_of_range(&time, from_time))
    }

    /// Column values between two timestamps.
    ///
    /// Inverted bounds are swapped. The range is `[first row >= from_time,
    /// first row >= to_time)`. Either bound outside the recorded span is a
    /// `TimeOutOfRange` error; a missing column is `Ok(None)`.
    pub fn get_column_by_time(
        &self,
        name: &str,
        from_time: f64,
        to_time: f64,
    ) -> Result<Option<ArrayView1<'_, f64>>> {
        let (from_time, to_time) = if from_time > to_time {
            (to_time, from_time)
        } else {
            (from_time, to_time)
        };

        let time = self.timestamps()?;
        self.check_time_in_data(&time, from_time)?;
        self.check_time_in_data(&time, to_time)?;

        let mut from_index = None;
        let mut to_index = None;
        for (i, &t) in time.iter().enumerate() {
            if t >= from_time && from_index.is_none() {
                from_index = Some(i);
            }
            if t >= to_time {
                to_index = Some(i);
                break;
            }
        }
        let (Some(from_index), Some(to_index)) = (from_index, to_index) else {
            return Err(self.out_of_range(&time, to_time));
        };

        Ok(self.get_column_range(name, from_index, Some(to_index), None))
    }

    fn timestamps(&self) -> Result<ArrayView1<'_, f64>> {
        self.get_column(TIMESTAMP_STRING)
            .ok_or_else(|| SignalError::ColumnNotFound(TIMESTAMP_STRING.to_string()))
    }

    fn check_time_in_data(&self, time: &ArrayView1<'_, f64>, t: f64) -> Result<()> {
        let (min, max) = min_max(time);
        if min <= t && t <= max {
            Ok(())
        } else {
            Err(self.out_of_range(time, t))
        }
    }

    fn out_of_range(&self, time: &ArrayView1<'_, f64>, t: f64) -> SignalError {
        let (start, end) = min_max(time);
        SignalError::TimeOutOfRange {
            time: t,
            start,
            end,
        }
    }

    /// Last minus first timestamp; `None` for an empty table
    pub fn duration(&self) -> Option<f64> {
        Some(self.end_time()? - self.start_time()?)
    }

    pub fn start_time(&self) -> Option<f64> {
        self.get_column(TIMESTAMP_STRING)?.first().copied()
    }

    pub fn end_time(&self) -> Option<f64> {
        let last = self.len().checked_sub(1)?;
        self.get_column(TIMESTAMP_STRING)?.get(last).copied()
    }

    /// Subtract the configured ground constant from every gyro column.
    ///
    /// Mutates in place and is not idempotent: a second call subtracts the
    /// ground again. Every ground is resolved first, so a missing constant
    /// leaves the table untouched.
    pub fn norm_gyro_data(&mut self) -> Result<()> {
        let grounds = self
            .header
            .iter()
            .zip(&self.kinds)
            .enumerate()
            .filter(|(_, (_, kind))| **kind == ChannelKind::Gyro)
            .map(|(index, (field, _))| {
                self.config
                    .gyro_ground(field)
                    .map(|ground| (index, ground))
                    .ok_or_else(|| SignalError::MissingConfig(crate::config::ground_key(field)))
            })
            .collect::<Result<Vec<(usize, f64)>>>()?;

        for (index, ground) in grounds {
            self.data.column_mut(index).mapv_inplace(|v| v - ground);
            log::debug!(
                "[TABLE] Normalized gyro field {} by {}",
                self.header[index],
                ground
            );
        }
        Ok(())
    }

    fn header_of_kind(&self, kind: ChannelKind) -> Vec<&String> {
        self.header
            .iter()
            .zip(&self.kinds)
            .filter(|(_, k)| **k == kind)
            .map(|(h, _)| h)
            .collect()
    }

    pub fn get_eeg_header(&self) -> Vec<&String> {
        self.header_of_kind(ChannelKind::Eeg)
    }

    pub fn get_gyro_header(&self) -> Vec<&String> {
        self.header_of_kind(ChannelKind::Gyro)
    }

    /// Quality columns, in the order of their EEG columns
    pub fn get_quality_header(&self) -> Vec<String> {
        self.get_eeg_header()
            .into_iter()
            .map(|eeg| format!("{}{}", QUALITY_PREFIX, eeg))
            .filter(|q| self.kind_of(q) == Some(ChannelKind::Quality))
            .collect()
    }

    pub fn get_ecg_header(&self) -> Option<&'static str> {
        self.has_ecg_data.then_some(ECG_HEADER)
    }

    pub fn get_eeg_data(&self) -> Option<Array2<f64>> {
        if !self.has_eeg_data {
            return None;
        }
        self.get_columns(&self.get_eeg_header())
    }

    pub fn get_gyro_data(&self) -> Option<Array2<f64>> {
        if !self.has_gyro_data {
            return None;
        }
        self.get_columns(&self.get_gyro_header())
    }

    pub fn get_quality_data(&self) -> Option<Array2<f64>> {
        if !self.has_eeg_quality {
            return None;
        }
        self.get_columns(&self.get_quality_header())
    }

    pub fn get_quality(&self, quality_field: &str) -> Option<ArrayView1<'_, f64>> {
        self.get_column(quality_field)
    }

    /// ECG lead as a single-row matrix
    pub fn get_ecg_data(&self) -> Option<Array2<f64>> {
        if !self.has_ecg_data {
            return None;
        }
        self.get_columns(&[ECG_HEADER])
    }
}

impl std::fmt::Display for TimeSeriesTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_path)
    }
}

fn min_max(values: &ArrayView1<'_, f64>) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}
