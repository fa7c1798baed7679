//! ARFF (attribute-relation file format) rendering of feature tables.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use graphfeat_shared::{FeatureTable, GraphFeatError, Result};

/// File name of the rendered table inside a run's work directory.
pub const ARFF_FILE: &str = "dataset.arff";

/// Render a table as ARFF text.
///
/// ```text
/// @RELATION RESCAL
///
/// @ATTRIBUTE URI STRING
/// @ATTRIBUTE dim1 NUMERIC
///
/// @DATA
/// "ex:A",0.1
/// ```
pub fn render_arff(table: &FeatureTable) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "@RELATION {}", table.relation_name);
    out.push('\n');

    let mut attributes = table.attribute_names.iter();
    if let Some(identifier) = attributes.next() {
        let _ = writeln!(out, "@ATTRIBUTE {identifier} STRING");
    }
    for name in attributes {
        let _ = writeln!(out, "@ATTRIBUTE {name} NUMERIC");
    }

    out.push('\n');
    out.push_str("@DATA\n");

    for row in &table.rows {
        out.push('"');
        out.push_str(&escape_string(&row.identifier));
        out.push('"');
        for value in &row.values {
            out.push(',');
            out.push_str(&format_value(*value));
        }
        out.push('\n');
    }

    out
}

/// ARFF numeric token for a value: the shorter of plain and exponent
/// notation, or the missing-value marker `?` for non-finite values.
fn format_value(value: f64) -> String {
    if !value.is_finite() {
        return "?".to_string();
    }
    let plain = value.to_string();
    let scientific = format!("{value:e}");
    if scientific.len() < plain.len() {
        scientific
    } else {
        plain
    }
}

/// Write the rendered table to `<dir>/dataset.arff` and return its path.
///
/// The file is written to a temp name first and renamed into place.
#[instrument(skip_all, fields(dir = %dir.display(), rows = table.rows.len()))]
pub fn write_arff(table: &FeatureTable, dir: &Path) -> Result<PathBuf> {
    let content = render_arff(table);
    let target = dir.join(ARFF_FILE);
    let temp = dir.join(format!(".{ARFF_FILE}.tmp"));

    std::fs::write(&temp, &content).map_err(|e| GraphFeatError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| GraphFeatError::io(&target, e))?;

    debug!(path = %target.display(), size_bytes = content.len(), "wrote feature table");
    Ok(target)
}

/// Escape backslashes and double quotes for a quoted ARFF string.
fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use graphfeat_shared::FeatureRow;

    use super::*;

    fn sample_table() -> FeatureTable {
        FeatureTable {
            relation_name: "RESCAL".into(),
            attribute_names: vec!["URI".into(), "dim1".into(), "dim2".into()],
            rows: vec![
                FeatureRow {
                    identifier: "ex:A".into(),
                    values: vec![0.1, 0.2],
                },
                FeatureRow {
                    identifier: "ex:B".into(),
                    values: vec![0.3, -0.4],
                },
            ],
        }
    }

    #[test]
    fn renders_header_and_rows() {
        let arff = render_arff(&sample_table());
        let expected = "@RELATION RESCAL\n\
                        \n\
                        @ATTRIBUTE URI STRING\n\
                        @ATTRIBUTE dim1 NUMERIC\n\
                        @ATTRIBUTE dim2 NUMERIC\n\
                        \n\
                        @DATA\n\
                        \"ex:A\",0.1,0.2\n\
                        \"ex:B\",0.3,-0.4\n";
        assert_eq!(arff, expected);
    }

    #[test]
    fn escapes_quotes_in_identifiers() {
        let mut table = sample_table();
        table.rows[0].identifier = "\"quoted\"@en".into();
        let arff = render_arff(&table);
        assert!(arff.contains("\"\\\"quoted\\\"@en\",0.1,0.2\n"));
    }

    #[test]
    fn values_keep_compact_notation() {
        assert_eq!(format_value(0.1), "0.1");
        assert_eq!(format_value(-2.0), "-2");
        assert_eq!(format_value(1e-20), "1e-20");
        assert_eq!(format_value(123456789e30), "1.23456789e38");
        assert_eq!(format_value(f64::NAN), "?");
        assert_eq!(format_value(f64::INFINITY), "?");

        let mut table = sample_table();
        table.rows[0].values = vec![1e-20, f64::NEG_INFINITY];
        assert!(render_arff(&table).contains("\"ex:A\",1e-20,?\n"));
    }

    #[test]
    fn write_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join(format!("gf-arff-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = write_arff(&sample_table(), &dir).unwrap();
        assert_eq!(path, dir.join(ARFF_FILE));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), render_arff(&sample_table()));

        for entry in std::fs::read_dir(&dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
