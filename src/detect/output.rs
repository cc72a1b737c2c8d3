//! Raw detection output decoding.
//!
//! Detection models emit `(4 + num_classes) × N` values per frame: box center
//! x, y, width, height and one score per class for each of N fixed slots. The
//! default layout is attribute-major (`[1, 4 + nc, N]`, value at
//! `attr * N + i`); candidate-major (`[1, N, 4 + nc]`) is also accepted.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::result::{Candidate, Selection};

/// Box attributes preceding the class scores.
pub const BOX_ATTRS: usize = 4;

/// Candidate count of a 640×640 single-scale-set detection head.
pub const DEFAULT_CANDIDATES: usize = 8400;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    #[default]
    AttributeMajor,
    CandidateMajor,
}

impl std::str::FromStr for OutputLayout {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "attribute_major" => Ok(Self::AttributeMajor),
            "candidate_major" => Ok(Self::CandidateMajor),
            other => Err(anyhow!(
                "unknown output layout '{}'; expected attribute_major or candidate_major",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputShape {
    pub candidates: usize,
    pub num_classes: usize,
    pub layout: OutputLayout,
}

impl OutputShape {
    pub fn new(candidates: usize, num_classes: usize, layout: OutputLayout) -> Self {
        Self {
            candidates,
            num_classes,
            layout,
        }
    }

    /// Values per candidate.
    pub fn attributes(&self) -> usize {
        BOX_ATTRS + self.num_classes
    }

    pub fn expected_len(&self) -> usize {
        self.attributes() * self.candidates
    }

    /// Offset of attribute `attr` of candidate `i`.
    pub fn offset(&self, attr: usize, i: usize) -> usize {
        match self.layout {
            OutputLayout::AttributeMajor => attr * self.candidates + i,
            OutputLayout::CandidateMajor => i * self.attributes() + attr,
        }
    }

    /// Infer the shape from a reported tensor shape (leading unit dims are ignored).
    pub fn from_dims(dims: &[usize], layout: OutputLayout) -> Result<Self> {
        let dims: Vec<usize> = dims.iter().copied().skip_while(|&d| d == 1).collect();
        let (attrs, candidates) = match (layout, dims.as_slice()) {
            (OutputLayout::AttributeMajor, [a, n]) => (*a, *n),
            (OutputLayout::CandidateMajor, [n, a]) => (*a, *n),
            _ => return Err(anyhow!("unsupported detection output shape {:?}", dims)),
        };
        if attrs <= BOX_ATTRS {
            return Err(anyhow!(
                "detection output has {} attributes; need at least {}",
                attrs,
                BOX_ATTRS + 1
            ));
        }
        Ok(Self::new(candidates, attrs - BOX_ATTRS, layout))
    }
}

/// Flat output buffer plus the shape needed to index it.
#[derive(Clone, Debug)]
pub struct RawOutput {
    data: Vec<f32>,
    shape: OutputShape,
}

impl RawOutput {
    pub fn new(data: Vec<f32>, shape: OutputShape) -> Result<Self> {
        if data.len() != shape.expected_len() {
            return Err(anyhow!(
                "detection output has {} values, expected {} ({} candidates x {} attributes)",
                data.len(),
                shape.expected_len(),
                shape.candidates,
                shape.attributes()
            ));
        }
        Ok(Self { data, shape })
    }

    /// Output with every value zero: no candidate scores anything.
    pub fn empty(shape: OutputShape) -> Self {
        Self {
            data: vec![0.0; shape.expected_len()],
            shape,
        }
    }

    pub fn shape(&self) -> OutputShape {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Write one candidate slot. Used by synthetic backends.
    pub fn set_candidate(&mut self, i: usize, bbox: [f32; 4], class: usize, score: f32) -> Result<()> {
        if i >= self.shape.candidates || class >= self.shape.num_classes {
            return Err(anyhow!(
                "candidate {} class {} out of range for {:?}",
                i,
                class,
                self.shape
            ));
        }
        for (attr, value) in bbox.into_iter().enumerate() {
            let offset = self.shape.offset(attr, i);
            self.data[offset] = value;
        }
        let offset = self.shape.offset(BOX_ATTRS + class, i);
        self.data[offset] = score;
        Ok(())
    }

    pub fn candidate(&self, i: usize, class: usize) -> Candidate {
        let at = |attr: usize| self.data[self.shape.offset(attr, i)];
        Candidate {
            index: i,
            x: at(0),
            y: at(1),
            w: at(2),
            h: at(3),
            confidence: at(BOX_ATTRS + class),
        }
    }

    /// Pick the highest-scoring candidate with `score >= threshold`.
    ///
    /// The comparison is inclusive on purpose: a score exactly at the
    /// threshold qualifies, where a strict `score > threshold` test would
    /// reject it.
    ///
    /// Scan order is slot order and only a strictly greater score replaces
    /// the current best, so equal scores resolve to the lowest index.
    /// Non-finite scores never qualify.
    pub fn select_best(&self, class: usize, threshold: f32) -> Result<Selection> {
        if class >= self.shape.num_classes {
            return Err(anyhow!(
                "target class {} out of range; model reports {} classes",
                class,
                self.shape.num_classes
            ));
        }
        let mut selection = Selection::default();
        let mut best_index = None;
        let mut best_score = f32::NEG_INFINITY;
        for i in 0..self.shape.candidates {
            let score = self.data[self.shape.offset(BOX_ATTRS + class, i)];
            if !score.is_finite() || score < threshold {
                continue;
            }
            selection.qualifying += 1;
            if score > best_score {
                best_score = score;
                best_index = Some(i);
            }
        }
        selection.best = best_index.map(|i| self.candidate(i, class));
        Ok(selection)
    }
}
