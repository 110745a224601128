//! This module defines [ColumnDef], the metadata describing a column.

use serde::{Deserialize, Serialize};

use crate::{columnar::column_type::ColumnType, datavalues::Time, tolerance::ToleranceStrategy};

/// Metadata of a column.
///
/// Definitions are usually supplied by collaborators that load variable metadata,
/// e.g. as json:
/// ```json
/// { "slug": "gdp", "type": "Numeric", "name": "GDP per capita", "tolerance": 5 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Unique identifier of the column
    pub slug: String,
    /// Declared type; inferred from the values if not given
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    /// Name used for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unit of the values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Abbreviated unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_unit: Option<String>,
    /// Identifier of the source this data was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Maximal time distance for substituting a nearby observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Time>,
    /// Direction in which nearby observations may be substituted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_strategy: Option<ToleranceStrategy>,
    /// Color used when charting this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ColumnDef {
    /// Create a new [ColumnDef] with the given slug and no further metadata.
    pub fn new<S: Into<String>>(slug: S) -> Self {
        Self {
            slug: slug.into(),
            ..Default::default()
        }
    }

    /// Create a new [ColumnDef] with the given slug and type.
    pub fn typed<S: Into<String>>(slug: S, column_type: ColumnType) -> Self {
        Self::new(slug).with_type(column_type)
    }

    /// Set the declared type.
    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    /// Set the display name.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the source identifier.
    pub fn with_source_id<S: Into<String>>(mut self, source_id: S) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Set the time tolerance.
    pub fn with_tolerance(mut self, tolerance: Time) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Set the tolerance strategy.
    pub fn with_tolerance_strategy(mut self, strategy: ToleranceStrategy) -> Self {
        self.tolerance_strategy = Some(strategy);
        self
    }

    /// Name used for display, falling back to the slug.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.slug)
    }

    /// Parse a list of column definitions from json.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn defs_from_json() {
        let defs = ColumnDef::list_from_json(
            r#"[
                {"slug": "gdp", "type": "Numeric", "name": "GDP", "sourceId": "wb-42", "tolerance": 5, "toleranceStrategy": "backwards"},
                {"slug": "entityName"}
            ]"#,
        )
        .expect("valid json");

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].column_type, Some(ColumnType::Numeric));
        assert_eq!(defs[0].display_name(), "GDP");
        assert_eq!(defs[0].source_id.as_deref(), Some("wb-42"));
        assert_eq!(defs[0].tolerance, Some(5));
        assert_eq!(
            defs[0].tolerance_strategy,
            Some(ToleranceStrategy::Backwards)
        );
        assert_eq!(defs[1].column_type, None);
        assert_eq!(defs[1].display_name(), "entityName");
    }
}
