//! Feature table assembly.
//!
//! Reads the resource list and vector file an embedding process produced,
//! checks that they line up, and builds a [`FeatureTable`] with one string
//! identifier column and one numeric column per embedding dimension.

pub mod arff;

use std::path::Path;

use tracing::{error, info, instrument};

use graphfeat_shared::{
    EmbeddingResult, FeatureRow, FeatureTable, GraphFeatError, Result,
};

pub use arff::{render_arff, write_arff};

/// Name of the identifier attribute.
pub const IDENTIFIER_ATTRIBUTE: &str = "URI";

/// Prefix of the numeric dimension attributes (`dim1`, `dim2`, ...).
pub const DIMENSION_PREFIX: &str = "dim";

/// Read the algorithm's two output files.
///
/// A missing file means the algorithm failed or produced nothing; which of
/// the two is not distinguishable from here.
#[instrument(skip_all, fields(resources = %resources.display(), vectors = %vectors.display()))]
pub fn read_embedding_result(resources: &Path, vectors: &Path) -> Result<EmbeddingResult> {
    let resource_text = read_output(resources)?;
    let vector_text = read_output(vectors)?;

    let resource_uris: Vec<String> = resource_text.lines().map(str::to_string).collect();
    let vectors = vector_text
        .lines()
        .enumerate()
        .map(|(i, line)| parse_vector_line(line, i + 1))
        .collect::<Result<Vec<_>>>()?;

    Ok(EmbeddingResult {
        resource_uris,
        vectors,
    })
}

/// Parse one tab-separated vector line. `line_no` is 1-based, for messages.
///
/// Only finite numbers are accepted; `NaN` and infinities have no ARFF
/// numeric form.
pub fn parse_vector_line(line: &str, line_no: usize) -> Result<Vec<f64>> {
    line.split('\t')
        .map(|field| match field.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            Ok(_) => Err(GraphFeatError::assembly(format!(
                "vectors line {line_no}: '{field}' is not a finite number"
            ))),
            Err(_) => Err(GraphFeatError::assembly(format!(
                "vectors line {line_no}: '{field}' is not a number"
            ))),
        })
        .collect()
}

/// Build a feature table named after `method` from an embedding result.
///
/// The resource and vector counts must match and every vector must have
/// the width of the first one.
pub fn assemble(method: &str, result: EmbeddingResult) -> Result<FeatureTable> {
    let EmbeddingResult {
        resource_uris,
        vectors,
    } = result;

    if resource_uris.len() != vectors.len() {
        return Err(GraphFeatError::assembly(format!(
            "{} resources but {} vectors",
            resource_uris.len(),
            vectors.len()
        )));
    }

    let Some(width) = vectors.first().map(Vec::len) else {
        return Err(GraphFeatError::assembly("embedding produced no vectors"));
    };

    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != width) {
        return Err(GraphFeatError::assembly(format!(
            "vector {} has {} dimensions, expected {width}",
            i + 1,
            v.len()
        )));
    }

    let mut attribute_names = Vec::with_capacity(width + 1);
    attribute_names.push(IDENTIFIER_ATTRIBUTE.to_string());
    attribute_names.extend((1..=width).map(|d| format!("{DIMENSION_PREFIX}{d}")));

    let rows = resource_uris
        .into_iter()
        .zip(vectors)
        .map(|(identifier, values)| FeatureRow { identifier, values })
        .collect();

    Ok(FeatureTable {
        relation_name: method.to_uppercase(),
        attribute_names,
        rows,
    })
}

/// Read output files and assemble them in one step.
pub fn assemble_from_files(method: &str, resources: &Path, vectors: &Path) -> Result<FeatureTable> {
    let result = read_embedding_result(resources, vectors)?;
    let table = assemble(method, result)?;

    info!(
        relation = %table.relation_name,
        rows = table.rows.len(),
        dimensions = table.dimensions(),
        "feature table assembled"
    );

    Ok(table)
}

fn read_output(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(
                path = %path.display(),
                "embedding output missing; the source data is probably malformed (e.g. invalid RDF syntax)"
            );
            Err(GraphFeatError::AlgorithmOutputMissing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(GraphFeatError::io(path, e)),
    }
}
