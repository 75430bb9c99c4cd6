use serde::Serialize;

/// Two-class contingency table of (ground truth, prediction) pairs.
/// Class `1` is "positive" on both axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    /// truth 1, predicted 1
    pub tp: usize,
    /// truth 0, predicted 0
    pub tn: usize,
    /// truth 0, predicted 1
    pub fp: usize,
    /// truth 1, predicted 0
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, truth: u8, predicted: u8) {
        match (truth != 0, predicted != 0) {
            (true, true) => self.tp += 1,
            (false, false) => self.tn += 1,
            (false, true) => self.fp += 1,
            (true, false) => self.fn_ += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn agreements(&self) -> usize {
        self.tp + self.tn
    }

    /// Fraction of pairs where prediction equals truth; `None` when empty.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.agreements() as f64 / total as f64)
    }

    /// Cohen's kappa: `(p_o - p_e) / (1 - p_e)`.
    ///
    /// Evaluated on integer counts as `(n·a - s) / (n² - s)` with `a` the
    /// agreements and `s = Σ_k truth_k · pred_k`, so the degenerate case
    /// `p_e = 1` (every truth and every prediction the same single class)
    /// is detected exactly and reported as `None`. Empty tables are `None`.
    pub fn cohen_kappa(&self) -> Option<f64> {
        let n = self.total() as u128;
        if n == 0 {
            return None;
        }
        let truth_pos = (self.tp + self.fn_) as u128;
        let truth_neg = (self.tn + self.fp) as u128;
        let pred_pos = (self.tp + self.fp) as u128;
        let pred_neg = (self.tn + self.fn_) as u128;

        let chance = truth_pos * pred_pos + truth_neg * pred_neg;
        let denominator = n * n - chance;
        if denominator == 0 {
            return None;
        }
        let numerator = (n * self.agreements() as u128) as f64 - chance as f64;
        Some(numerator / denominator as f64)
    }
}

/// Agreement statistics for one group of studies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgreementMetrics {
    pub studies: usize,
    /// `None` when undefined (degenerate table).
    pub kappa: Option<f64>,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

impl AgreementMetrics {
    /// `None` for an empty table.
    pub fn from_confusion(cm: ConfusionMatrix) -> Option<Self> {
        Some(Self {
            studies: cm.total(),
            kappa: cm.cohen_kappa(),
            accuracy: cm.accuracy()?,
            confusion: cm,
        })
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u8, u8)>) -> Option<Self> {
        let mut cm = ConfusionMatrix::new();
        for (truth, predicted) in pairs {
            cm.record(truth, predicted);
        }
        Self::from_confusion(cm)
    }

    /// `| name | studies | kappa | accuracy |`
    pub fn to_table_row(&self, name: &str) -> String {
        let kappa = match self.kappa {
            Some(k) => format!("{k:>7.4}"),
            None => format!("{:>7}", "n/a"),
        };
        format!(
            "| {:<12} | {:>7} | {} | {:>7.2}% |",
            name,
            self.studies,
            kappa,
            self.accuracy * 100.0
        )
    }

    pub fn table_header() -> String {
        format!(
            "| {:<12} | {:>7} | {:>7} | {:>8} |",
            "Region", "Studies", "Kappa", "Accuracy"
        )
    }

    pub fn table_separator() -> String {
        format!("|{:-<14}|{:->9}|{:->9}|{:->10}|", "", "", "", "")
    }
}
