//! This module defines [ColumnType].

use enum_assoc::Assoc;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::datavalues::{
    format_date, is_numeric_or_blank, parse_boolean, parse_date, parse_number, parse_string,
    CellValue, MissingReason,
};

/// Declared type of a column.
///
/// The type decides how raw input is parsed into [CellValue]s.
#[derive(Assoc, EnumIter, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[func(pub fn name(&self) -> &'static str)]
pub enum ColumnType {
    /// Floating point numbers
    #[assoc(name = "Numeric")]
    Numeric,
    /// Whole numbers
    #[assoc(name = "Integer")]
    Integer,
    /// Free text
    #[assoc(name = "String")]
    String,
    /// Text from a small set of categories
    #[assoc(name = "Categorical")]
    Categorical,
    /// `true` or `false`
    #[assoc(name = "Boolean")]
    Boolean,
    /// A year, used as time
    #[assoc(name = "Year")]
    Year,
    /// A day number, used as time
    #[assoc(name = "Day")]
    Day,
    /// A calendar date, stored as day number since 1970-01-01
    #[assoc(name = "Date")]
    Date,
    /// Name of an entity
    #[assoc(name = "EntityName")]
    EntityName,
    /// Short code of an entity, e.g. an ISO country code
    #[assoc(name = "EntityCode")]
    EntityCode,
    /// Numeric identifier of an entity
    #[assoc(name = "EntityId")]
    EntityId,
}

impl Default for ColumnType {
    fn default() -> Self {
        Self::Numeric
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl ColumnType {
    /// Find the [ColumnType] with the given name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::iter().find(|column_type| column_type.name() == name)
    }

    /// Return `true` if cells of this type are stored as numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Numeric | Self::Integer | Self::Year | Self::Day | Self::Date | Self::EntityId
        )
    }

    /// Return `true` if this type can serve as the time of an observation.
    pub fn is_time(&self) -> bool {
        matches!(self, Self::Year | Self::Day | Self::Date)
    }

    /// Type implied by a well-known column slug.
    pub fn from_well_known_slug(slug: &str) -> Option<Self> {
        match slug {
            "year" => Some(Self::Year),
            "day" => Some(Self::Day),
            "date" => Some(Self::Date),
            "entityName" => Some(Self::EntityName),
            "entityCode" => Some(Self::EntityCode),
            "entityId" => Some(Self::EntityId),
            _ => None,
        }
    }

    /// Infer the type of a column from its slug and its raw values.
    ///
    /// A column is numeric if every non-blank value parses as a number.
    /// Blank values never force the string fallback.
    pub fn infer<'a, I>(slug: &str, raw_values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some(column_type) = Self::from_well_known_slug(slug) {
            return column_type;
        }

        let mut raw_values = raw_values.into_iter();
        if raw_values.all(is_numeric_or_blank) {
            Self::Numeric
        } else {
            Self::String
        }
    }

    /// Infer the type of a column whose values are already [CellValue]s.
    pub fn infer_from_cells<'a, I>(slug: &str, values: I) -> Self
    where
        I: IntoIterator<Item = &'a CellValue>,
    {
        if let Some(column_type) = Self::from_well_known_slug(slug) {
            return column_type;
        }

        let mut result = Self::Numeric;
        let mut seen_present = false;
        for value in values {
            let current = match value {
                CellValue::Number(_) => Self::Numeric,
                CellValue::Boolean(_) => Self::Boolean,
                CellValue::Text(_) => return Self::String,
                CellValue::Missing(_) => continue,
            };

            if seen_present && current != result {
                return Self::String;
            }
            seen_present = true;
            result = current;
        }

        result
    }

    /// Parse a raw string into a cell of this type.
    pub fn parse(&self, raw: &str) -> CellValue {
        match self {
            Self::Numeric | Self::Integer | Self::Year | Self::Day | Self::EntityId => {
                parse_number(raw)
            }
            Self::Date => parse_date(raw),
            Self::Boolean => parse_boolean(raw),
            Self::String | Self::Categorical | Self::EntityName | Self::EntityCode => {
                parse_string(raw)
            }
        }
    }

    /// Bring an already typed cell into the representation of this type.
    ///
    /// Valid cells of the right kind are returned unchanged.
    pub fn coerce(&self, value: CellValue) -> CellValue {
        match (self.is_numeric(), *self == Self::Boolean, value) {
            (_, _, CellValue::Missing(reason)) => CellValue::Missing(reason),
            (true, _, CellValue::Number(number)) => CellValue::from(number),
            (true, _, CellValue::Text(text)) => self.parse(&text),
            (true, _, CellValue::Boolean(_)) => {
                CellValue::Missing(MissingReason::NotAParseableNumberButShouldBeNumber)
            }
            (false, true, CellValue::Boolean(value)) => CellValue::Boolean(value),
            (false, true, CellValue::Number(number)) if number == 0.0 || number == 1.0 => {
                CellValue::Boolean(number == 1.0)
            }
            (false, true, CellValue::Number(_)) => {
                CellValue::Missing(MissingReason::NotAParseableBoolean)
            }
            (false, true, CellValue::Text(text)) => parse_boolean(&text),
            (false, false, CellValue::Text(text)) => parse_string(&text),
            (false, false, other) => CellValue::Text(other.to_string()),
        }
    }

    /// Render a cell of this type for delimited output.
    ///
    /// Missing cells are rendered as the empty string.
    pub fn format(&self, value: &CellValue) -> String {
        match (self, value.as_time()) {
            (Self::Date, Some(day)) => format_date(day),
            _ => value.to_string(),
        }
    }
}
