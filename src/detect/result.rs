/// One candidate slot from the model output, in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Slot index in scan order.
    pub index: usize,
    /// Box center.
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// Score for the target class.
    pub confidence: f32,
}

/// Outcome of scanning one inference output.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Selection {
    /// Best qualifying candidate, if any.
    pub best: Option<Candidate>,
    /// Number of candidates at or above the threshold.
    pub qualifying: usize,
}

impl Selection {
    pub fn qualified(&self) -> bool {
        self.best.is_some()
    }

    pub fn confidence(&self) -> Option<f32> {
        self.best.map(|c| c.confidence)
    }
}
