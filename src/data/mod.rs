/// Data layer: manifest indexing, sample loading, and transforms.
///
/// Architecture:
/// ```text
///  manifest (.csv / .txt, one relative path per line)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  root + line → SampleAddress { path, label }
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  keep selected XR_* regions
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ MuraDataset  │  get(i): open image → Transform → Sample
///   └─────────────┘
/// ```

pub mod dataset;
pub mod filter;
pub mod loader;
pub mod model;
pub mod transform;
