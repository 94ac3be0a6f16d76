//! Artifact correlation across ICA decompositions
//!
//! Template matching ("corrmap"): a component known to capture an artifact
//! (blink, heartbeat) is compared against every component of a list of
//! decompositions by the absolute correlation of their spatial maps. Matching
//! runs twice, the second time against the sign-aligned mean of the
//! first-pass matches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{NativeBackend, SignalBackend};
use crate::channel_set::ChannelSet;
use crate::error::{Result, SignalError};
use crate::ica::{ComponentDecomposition, QualityMetrics};
use crate::pipeline::SOURCE_PREFIX;

/// Minimum absolute spatial-map correlation for a match
pub const CORRMAP_THRESHOLD: f64 = 0.85;

/// Default reference channel for cross-correlation (gyro X axis)
pub const DEFAULT_REFERENCE_CHANNEL: &str = "X";

/// One component matched to the template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMatch {
    /// Position in the searched list; 0 is the template decomposition
    pub decomposition: usize,
    pub decomposition_id: Uuid,
    pub component: usize,
    /// Absolute correlation with the final template
    pub correlation: f64,
}

/// Components labelled with one artifact name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLabeling {
    pub label: String,
    pub matches: Vec<ComponentMatch>,
}

impl ArtifactLabeling {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Matched component indices of one decomposition
    pub fn components_for(&self, decomposition: usize) -> Vec<usize> {
        self.matches
            .iter()
            .filter(|m| m.decomposition == decomposition)
            .map(|m| m.component)
            .collect()
    }
}

/// Spatial map restricted to a channel order, `None` where a channel is missing
type AlignedMap = Vec<Option<f64>>;

pub struct ArtifactCorrelator<B: SignalBackend = NativeBackend> {
    backend: B,
}

impl ArtifactCorrelator<NativeBackend> {
    pub fn new() -> Self {
        Self::with_backend(NativeBackend)
    }
}

impl Default for ArtifactCorrelator<NativeBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: SignalBackend> ArtifactCorrelator<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Find components matching `template`'s component `template_component`
    /// across `template` and `others`.
    ///
    /// The result is empty unless at least one component other than the
    /// template itself exceeds [`CORRMAP_THRESHOLD`]; otherwise it contains
    /// the template component and every second-pass match.
    pub fn label_artifact(
        &self,
        template: &ComponentDecomposition,
        template_component: usize,
        others: &[&ComponentDecomposition],
        label: &str,
    ) -> Result<ArtifactLabeling> {
        let template_map = template
            .component(template_component)
            .ok_or_else(|| {
                SignalError::InvalidParameter(format!(
                    "template component {} out of range (decomposition has {})",
                    template_component,
                    template.n_components()
                ))
            })?
            .spatial_map
            .clone();

        let mut decompositions = Vec::with_capacity(others.len() + 1);
        decompositions.push(template);
        decompositions.extend_from_slice(others);

        let reference_channels = &template.channel_names;
        let first_pass = find_matches(&decompositions, reference_channels, &template_map);
        if !has_foreign_match(&first_pass, template_component) {
            log::info!(
                "[CORRMAP] No component above {} for '{}' (template {}:{})",
                CORRMAP_THRESHOLD,
                label,
                template.recording,
                template_component
            );
            return Ok(empty(label));
        }

        let mean_map = mean_template(&decompositions, reference_channels, &template_map, &first_pass);
        let mut second_pass = find_matches(&decompositions, reference_channels, &mean_map);
        if !has_foreign_match(&second_pass, template_component) {
            log::info!(
                "[CORRMAP] Mean template for '{}' matched only the template itself",
                label
            );
            return Ok(empty(label));
        }
        if !second_pass
            .iter()
            .any(|&(d, c, _)| d == 0 && c == template_component)
        {
            let r = map_correlation(
                reference_channels,
                &mean_map,
                &template.channel_names,
                &template_map,
            )
            .abs();
            second_pass.insert(0, (0, template_component, r));
        }

        let matches: Vec<ComponentMatch> = second_pass
            .into_iter()
            .map(|(d, component, correlation)| ComponentMatch {
                decomposition: d,
                decomposition_id: decompositions[d].id,
                component,
                correlation,
            })
            .collect();
        log::info!(
            "[CORRMAP] Labelled {} components as '{}' across {} decompositions",
            matches.len(),
            label,
            decompositions.len()
        );
        Ok(ArtifactLabeling {
            label: label.to_string(),
            matches,
        })
    }

    /// Full cross-correlation of `reference` against every source channel
    /// (`ICA…`); index `k` holds lag `k - (n - 1)` for an `n`-sample source
    pub fn cross_correlate_against_reference(
        &self,
        set: &ChannelSet,
        reference: &str,
    ) -> Result<BTreeMap<String, Vec<f64>>> {
        let reference_channel = set
            .channel(reference)
            .ok_or_else(|| SignalError::ColumnNotFound(reference.to_string()))?;

        let mut correlations = BTreeMap::new();
        for channel in set
            .channels
            .iter()
            .filter(|c| c.name.starts_with(SOURCE_PREFIX))
        {
            let z = self
                .backend
                .correlate(&reference_channel.samples, &channel.samples)?;
            correlations.insert(channel.name.clone(), z);
        }
        log::debug!(
            "[CORRMAP] Cross-correlated {} source channels against '{}'",
            correlations.len(),
            reference
        );
        Ok(correlations)
    }
}

fn empty(label: &str) -> ArtifactLabeling {
    ArtifactLabeling {
        label: label.to_string(),
        matches: Vec::new(),
    }
}

fn has_foreign_match(matches: &[(usize, usize, f64)], template_component: usize) -> bool {
    matches
        .iter()
        .any(|&(d, c, _)| !(d == 0 && c == template_component))
}

/// `(decomposition, component, |r|)` for every component above threshold
fn find_matches(
    decompositions: &[&ComponentDecomposition],
    reference_channels: &[String],
    template_map: &[f64],
) -> Vec<(usize, usize, f64)> {
    let mut matches = Vec::new();
    for (d, decomposition) in decompositions.iter().enumerate() {
        for component in &decomposition.components {
            let r = map_correlation(
                reference_channels,
                template_map,
                &decomposition.channel_names,
                &component.spatial_map,
            )
            .abs();
            log::debug!("[CORRMAP] {}:{} |r| = {:.3}", d, component.index, r);
            if r > CORRMAP_THRESHOLD {
                matches.push((d, component.index, r));
            }
        }
    }
    matches
}

/// Correlation of two maps over the channels they share (by name)
fn map_correlation(
    names_a: &[String],
    map_a: &[f64],
    names_b: &[String],
    map_b: &[f64],
) -> f64 {
    let (a, b): (Vec<f64>, Vec<f64>) = names_a
        .iter()
        .zip(map_a)
        .filter_map(|(name, &va)| {
            names_b
                .iter()
                .position(|n| n == name)
                .and_then(|j| map_b.get(j))
                .map(|&vb| (va, vb))
        })
        .unzip();
    if a.len() < 3 {
        return 0.0;
    }
    QualityMetrics::pearson(&a, &b)
}

fn align_map(reference_channels: &[String], names: &[String], map: &[f64]) -> AlignedMap {
    reference_channels
        .iter()
        .map(|channel| {
            names
                .iter()
                .position(|n| n == channel)
                .and_then(|j| map.get(j).copied())
        })
        .collect()
}

/// Mean of the standardized first-pass maps, each flipped to correlate
/// positively with the template
fn mean_template(
    decompositions: &[&ComponentDecomposition],
    reference_channels: &[String],
    template_map: &[f64],
    matches: &[(usize, usize, f64)],
) -> Vec<f64> {
    let mut sums = vec![0.0; reference_channels.len()];
    let mut counts = vec![0usize; reference_channels.len()];

    for &(d, c, _) in matches {
        let decomposition = decompositions[d];
        let Some(component) = decomposition.component(c) else {
            continue;
        };
        let sign = map_correlation(
            reference_channels,
            template_map,
            &decomposition.channel_names,
            &component.spatial_map,
        )
        .signum();

        let aligned = align_map(
            reference_channels,
            &decomposition.channel_names,
            &component.spatial_map,
        );
        let present: Vec<f64> = aligned.iter().flatten().copied().collect();
        let mean = QualityMetrics::mean(&present);
        let std = QualityMetrics::variance(&present).sqrt();
        if std < 1e-12 {
            continue;
        }
        for (i, value) in aligned.iter().enumerate() {
            if let Some(v) = value {
                sums[i] += sign * (v - mean) / std;
                counts[i] += 1;
            }
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(&s, &n)| if n > 0 { s / n as f64 } else { 0.0 })
        .collect()
}
