/// Evaluation: per-study aggregation of image probabilities and agreement
/// metrics against the ground truth encoded in study paths.
///
/// ```text
///  Vec<InferenceResult>
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  group by study → mean → call → (truth, call) per region
///   └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ metrics   │  confusion matrix → Cohen's kappa, accuracy
///   └──────────┘
/// ```

pub mod aggregate;
pub mod metrics;
