//! Vector index mapping from source algorithms to target index types.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::core::{DataType, IndexSpec, VectorAlgorithm};

/// Metric used when neither the algorithm nor the field names one.
pub const DEFAULT_METRIC: &str = "COSINE";

const HNSW_DEFAULT_M: u32 = 4;
const HNSW_DEFAULT_EF_CONSTRUCTION: u32 = 400;
const HNSW_DEFAULT_EF_SEARCH: u32 = 500;

// Unknown algorithm kinds fall back to general-purpose HNSW settings.
const FALLBACK_M: u32 = 16;
const FALLBACK_EF_CONSTRUCTION: u32 = 256;
const FALLBACK_EF_SEARCH: u32 = 256;

/// Map a source metric name to the target metric.
pub fn map_metric(metric: &str) -> &'static str {
    match metric {
        "cosine" => "COSINE",
        "euclidean" => "L2",
        "dotProduct" => "IP",
        "hamming" => "HAMMING",
        _ => DEFAULT_METRIC,
    }
}

fn params(pairs: &[(&str, u32)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

/// Build the index request for a vector field.
///
/// `metric` overrides the algorithm's own metric (fields may carry one).
/// Binary vectors always use a flat Hamming index, the only combination the
/// target accepts for packed bits.
pub fn map_index(
    field: &str,
    algorithm: Option<&VectorAlgorithm>,
    metric: Option<&str>,
    data_type: DataType,
) -> IndexSpec {
    let metric_name = metric
        .or_else(|| algorithm.and_then(|a| a.metric.as_deref()))
        .map(map_metric)
        .unwrap_or(DEFAULT_METRIC);

    let kind = algorithm.map(|a| a.kind.as_str());

    let (index_type, metric_type, params, search_params) = if data_type == DataType::BinaryVector
    {
        ("BIN_FLAT", "HAMMING", Map::new(), Map::new())
    } else {
        match kind {
            Some("hnsw") | None => {
                let m = algorithm.and_then(|a| a.m).unwrap_or(HNSW_DEFAULT_M);
                let ef_c = algorithm
                    .and_then(|a| a.ef_construction)
                    .unwrap_or(HNSW_DEFAULT_EF_CONSTRUCTION);
                let ef = algorithm
                    .and_then(|a| a.ef_search)
                    .unwrap_or(HNSW_DEFAULT_EF_SEARCH);
                (
                    "HNSW",
                    metric_name,
                    params(&[("M", m), ("efConstruction", ef_c)]),
                    params(&[("ef", ef)]),
                )
            }
            Some("exhaustiveKnn") => ("FLAT", metric_name, Map::new(), Map::new()),
            Some(other) => {
                tracing::warn!(
                    "Unknown vector algorithm '{}' on field {}, using HNSW defaults",
                    other,
                    field
                );
                (
                    "HNSW",
                    metric_name,
                    params(&[("M", FALLBACK_M), ("efConstruction", FALLBACK_EF_CONSTRUCTION)]),
                    params(&[("ef", FALLBACK_EF_SEARCH)]),
                )
            }
        }
    };

    IndexSpec {
        field: field.to_string(),
        index_type: index_type.to_string(),
        metric_type: metric_type.to_string(),
        params,
        search_params,
        source_profile: None,
        source_algorithm: algorithm.map(|a| a.name.clone()),
    }
}

/// Vector layout an index family works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VectorShape {
    /// FLOAT_VECTOR and FLOAT16_VECTOR.
    Dense,
    Binary,
    /// SPARSE_FLOAT_VECTOR, typically derived from text.
    Sparse,
}

impl VectorShape {
    /// Shape of a collection field, if it is a vector.
    pub fn of(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::FloatVector | DataType::Float16Vector => Some(Self::Dense),
            DataType::BinaryVector => Some(Self::Binary),
            _ => None,
        }
    }
}

/// An index type the target offers that has no source counterpart.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusiveIndex {
    pub name: &'static str,
    pub description: &'static str,
    pub use_case: &'static str,
    pub shape: VectorShape,
    pub requires_gpu: bool,
    #[serde(skip)]
    params: &'static [(&'static str, u32)],
}

impl ExclusiveIndex {
    /// Typical build parameters.
    pub fn params_example(&self) -> Map<String, Value> {
        params(self.params)
    }
}

const fn exclusive(
    name: &'static str,
    description: &'static str,
    use_case: &'static str,
    shape: VectorShape,
    requires_gpu: bool,
    params: &'static [(&'static str, u32)],
) -> ExclusiveIndex {
    ExclusiveIndex {
        name,
        description,
        use_case,
        shape,
        requires_gpu,
        params,
    }
}

pub const EXCLUSIVE_INDEXES: &[ExclusiveIndex] = &[
    exclusive(
        "IVF_FLAT",
        "Inverted file index over uncompressed vectors",
        "Balanced memory and speed for millions to tens of millions of vectors",
        VectorShape::Dense,
        false,
        &[("nlist", 1024)],
    ),
    exclusive(
        "IVF_SQ8",
        "Inverted file index with 8-bit scalar quantization",
        "Cuts vector memory by about 70-75% at a small recall cost",
        VectorShape::Dense,
        false,
        &[("nlist", 1024)],
    ),
    exclusive(
        "IVF_PQ",
        "Inverted file index with product quantization",
        "Very large datasets where memory dominates cost",
        VectorShape::Dense,
        false,
        &[("nlist", 1024), ("m", 8), ("nbits", 8)],
    ),
    exclusive(
        "SCANN",
        "Score-aware anisotropic vector quantization",
        "Higher recall than IVF_PQ at similar memory",
        VectorShape::Dense,
        false,
        &[("nlist", 1024)],
    ),
    exclusive(
        "DISKANN",
        "Disk-resident graph index",
        "Datasets that do not fit in memory, served from SSD or NVMe",
        VectorShape::Dense,
        false,
        &[],
    ),
    exclusive(
        "GPU_IVF_FLAT",
        "IVF_FLAT on the GPU",
        "High-throughput search on GPU nodes",
        VectorShape::Dense,
        true,
        &[("nlist", 1024)],
    ),
    exclusive(
        "GPU_IVF_PQ",
        "IVF_PQ on the GPU",
        "Large datasets with GPU-speed search",
        VectorShape::Dense,
        true,
        &[("nlist", 1024), ("m", 8), ("nbits", 8)],
    ),
    exclusive(
        "GPU_CAGRA",
        "GPU-native graph index",
        "Lowest-latency search where GPUs are available",
        VectorShape::Dense,
        true,
        &[("intermediate_graph_degree", 64), ("graph_degree", 32)],
    ),
    exclusive(
        "GPU_BRUTE_FORCE",
        "Exact search on the GPU",
        "Small to medium datasets that need 100% recall",
        VectorShape::Dense,
        true,
        &[],
    ),
    exclusive(
        "BIN_IVF_FLAT",
        "Inverted file index over packed bit vectors",
        "Faster Hamming search than BIN_FLAT on large binary collections",
        VectorShape::Binary,
        false,
        &[("nlist", 1024)],
    ),
    exclusive(
        "SPARSE_INVERTED_INDEX",
        "Inverted index for sparse vectors",
        "Hybrid search with BM25 or SPLADE term weights",
        VectorShape::Sparse,
        false,
        &[],
    ),
    exclusive(
        "SPARSE_WAND",
        "WAND top-k pruning for sparse vectors",
        "Fast top-k over large sparse collections",
        VectorShape::Sparse,
        false,
        &[],
    ),
];

/// Catalogue entries for one vector shape.
pub fn exclusive_indexes(shape: VectorShape) -> impl Iterator<Item = &'static ExclusiveIndex> {
    EXCLUSIVE_INDEXES.iter().filter(move |i| i.shape == shape)
}
