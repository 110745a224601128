//! This module defines [TableOptions], the configuration used when constructing tables.

use serde::{Deserialize, Serialize};

use crate::columnar::{column_def::ColumnDef, column_store::ColumnStore};

/// Slugs that are recognized as entity column, in order of preference.
pub const ENTITY_SLUG_CANDIDATES: [&str; 3] = ["entityName", "entity", "country"];

/// Slugs that are recognized as time column, in order of preference.
pub const TIME_SLUG_CANDIDATES: [&str; 4] = ["time", "year", "day", "date"];

/// Slug of the column holding entity codes.
pub const ENTITY_CODE_SLUG: &str = "entityCode";

/// Slug of the column holding numeric entity ids.
pub const ENTITY_ID_SLUG: &str = "entityId";

/// Configuration of a table.
///
/// All fields are optional; by default, entity and time columns are detected
/// from well-known slugs and column types are inferred from the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    /// Slug of the column naming the entity of each row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_slug: Option<String>,
    /// Slug of the column holding the time of each row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slug: Option<String>,
    /// Delimiter of delimited input; detected from the header line if not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<u8>,
    /// Metadata of columns; types declared here take precedence over inference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_defs: Vec<ColumnDef>,
}

impl TableOptions {
    /// Create default [TableOptions].
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given column as entity column.
    pub fn with_entity_slug<S: Into<String>>(mut self, slug: S) -> Self {
        self.entity_slug = Some(slug.into());
        self
    }

    /// Use the given column as time column.
    pub fn with_time_slug<S: Into<String>>(mut self, slug: S) -> Self {
        self.time_slug = Some(slug.into());
        self
    }

    /// Use the given delimiter for delimited input.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Use the given column metadata.
    pub fn with_column_defs(mut self, column_defs: Vec<ColumnDef>) -> Self {
        self.column_defs = column_defs;
        self
    }

    /// Return the metadata supplied for the given column, if any.
    pub fn column_def(&self, slug: &str) -> Option<&ColumnDef> {
        self.column_defs.iter().find(|def| def.slug == slug)
    }

    /// Metadata for a column read from input: the supplied definition, or a bare one.
    pub(crate) fn def_for(&self, slug: &str) -> ColumnDef {
        self.column_def(slug)
            .cloned()
            .unwrap_or_else(|| ColumnDef::new(slug))
    }

    /// Determine the entity column of a store.
    pub(crate) fn resolve_entity_slug(&self, store: &ColumnStore) -> Option<String> {
        match &self.entity_slug {
            Some(slug) if store.has(slug) => Some(slug.clone()),
            Some(slug) => {
                log::warn!("configured entity column `{slug}` does not exist");
                None
            }
            None => ENTITY_SLUG_CANDIDATES
                .iter()
                .find(|slug| store.has(slug))
                .map(|slug| slug.to_string()),
        }
    }

    /// Determine the time column of a store.
    ///
    /// Without configuration, well-known slugs are tried first,
    /// then the first column with a time type.
    pub(crate) fn resolve_time_slug(&self, store: &ColumnStore) -> Option<String> {
        match &self.time_slug {
            Some(slug) if store.has(slug) => Some(slug.clone()),
            Some(slug) => {
                log::warn!("configured time column `{slug}` does not exist");
                None
            }
            None => TIME_SLUG_CANDIDATES
                .iter()
                .find(|slug| store.has(slug))
                .map(|slug| slug.to_string())
                .or_else(|| {
                    store
                        .columns()
                        .find(|column| column.column_type().is_time())
                        .map(|column| column.slug().to_string())
                }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{columnar::column_type::ColumnType, datavalues::CellValue};
    use test_log::test;

    fn store(slugs: &[(&str, ColumnType)]) -> ColumnStore {
        let mut store = ColumnStore::new();
        for (slug, column_type) in slugs {
            store
                .add_column(
                    ColumnDef::typed(*slug, *column_type),
                    vec![CellValue::Number(1.0)].into(),
                )
                .expect("same length");
        }
        store
    }

    #[test]
    fn well_known_slugs() {
        let store = store(&[
            ("entity", ColumnType::String),
            ("year", ColumnType::Year),
            ("gdp", ColumnType::Numeric),
        ]);
        let options = TableOptions::new();
        assert_eq!(options.resolve_entity_slug(&store).as_deref(), Some("entity"));
        assert_eq!(options.resolve_time_slug(&store).as_deref(), Some("year"));
    }

    #[test]
    fn configured_slugs() {
        let store = store(&[
            ("region", ColumnType::String),
            ("period", ColumnType::Day),
        ]);
        let options = TableOptions::new().with_entity_slug("region");
        assert_eq!(options.resolve_entity_slug(&store).as_deref(), Some("region"));
        assert_eq!(options.resolve_time_slug(&store).as_deref(), Some("period"));

        let options = TableOptions::new().with_time_slug("nope");
        assert_eq!(options.resolve_time_slug(&store), None);
        assert_eq!(TableOptions::new().resolve_entity_slug(&store), None);
    }

    #[test]
    fn options_from_json() {
        let options: TableOptions = serde_json::from_str(
            r#"{"entitySlug": "country", "columnDefs": [{"slug": "gdp", "type": "Numeric"}]}"#,
        )
        .expect("valid json");
        assert_eq!(options.entity_slug.as_deref(), Some("country"));
        assert_eq!(
            options.column_def("gdp").and_then(|def| def.column_type),
            Some(ColumnType::Numeric)
        );
        assert!(options.column_def("pop").is_none());
    }
}
