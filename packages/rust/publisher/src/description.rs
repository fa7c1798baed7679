//! Repository dataset descriptions.

use chrono::Utc;

use graphfeat_shared::Hyperparameters;

/// XML namespace of OpenML description documents.
const OML_NAMESPACE: &str = "http://openml.org/openml";

/// Descriptive metadata sent alongside a published table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescription {
    pub name: String,
    pub description: String,
    pub format: String,
    pub default_target_attribute: String,
    pub licence: String,
    /// `YYYY-MM-DD`.
    pub collection_date: String,
}

impl DatasetDescription {
    /// Description of an embedding run's output table, dated today.
    pub fn for_embedding(name: &str, method: &str, hyperparameters: &Hyperparameters) -> Self {
        Self {
            name: name.to_string(),
            description: summary(name, method, hyperparameters),
            format: "arff".into(),
            default_target_attribute: "class".into(),
            licence: "public".into(),
            collection_date: Utc::now().format("%Y-%m-%d").to_string(),
        }
    }

    /// Serialize as an OpenML `data_set_description` document.
    pub fn to_xml(&self) -> String {
        let fields = [
            ("name", &self.name),
            ("description", &self.description),
            ("format", &self.format),
            ("collection_date", &self.collection_date),
            ("licence", &self.licence),
            ("default_target_attribute", &self.default_target_attribute),
        ];

        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<oml:data_set_description xmlns:oml=\"{OML_NAMESPACE}\">\n"
        );
        for (tag, value) in fields {
            xml.push_str(&format!("  <oml:{tag}>{}</oml:{tag}>\n", escape_xml(value)));
        }
        xml.push_str("</oml:data_set_description>\n");
        xml
    }
}

/// Human-readable summary of what was embedded and how.
pub fn summary(name: &str, method: &str, hyperparameters: &Hyperparameters) -> String {
    format!(
        "Knowledge Graph Embedding model for dataset {name} using method {method} \
         with hyperparameters {hyperparameters}."
    )
}

pub(crate) fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
