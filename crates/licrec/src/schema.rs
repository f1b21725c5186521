//! The licensing-record field schema.
//!
//! A closed, ordered registry of target fields. Recognizers, the scorer,
//! the validator and the assembler are all driven off this table rather
//! than hard-coded field lists.

use serde::{Deserialize, Serialize};

/// Field type, used to select recognizers and validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Council,
    Reference,
    Address,
    Date,
    PersonName,
    Count,
}

/// How heavily a field weighs into the overall quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    Important,
    Standard,
}

impl Criticality {
    pub fn weight(self) -> f64 {
        match self {
            Criticality::Critical => 3.0,
            Criticality::Important => 2.0,
            Criticality::Standard => 1.0,
        }
    }
}

/// One target field of the output record.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub criticality: Criticality,
    pub required: bool,
}

/// Ordered list of target fields.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// The HMO licensing-record schema.
    pub fn licensing() -> Self {
        use Criticality::{Critical, Important, Standard};
        use FieldKind::{Address, Council, Count, Date, PersonName, Reference};

        let spec = |name, kind, criticality, required| FieldSpec {
            name,
            kind,
            criticality,
            required,
        };

        Self {
            fields: vec![
                spec("council", Council, Critical, true),
                spec("reference", Reference, Critical, true),
                spec("hmo_address", Address, Critical, true),
                spec("licence_start", Date, Important, true),
                spec("licence_expiry", Date, Important, true),
                spec("max_occupancy", Count, Important, true),
                spec("hmo_manager_name", PersonName, Standard, false),
                spec("hmo_manager_address", Address, Standard, false),
                spec("licence_holder_name", PersonName, Standard, false),
                spec("licence_holder_address", Address, Standard, false),
                spec("number_of_households", Count, Standard, false),
                spec("number_of_shared_kitchens", Count, Standard, false),
                spec("number_of_shared_bathrooms", Count, Standard, false),
                spec("number_of_shared_toilets", Count, Standard, false),
                spec("number_of_storeys", Count, Standard, false),
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Sum of criticality weights across all fields.
    pub fn total_weight(&self) -> f64 {
        self.fields.iter().map(|f| f.criticality.weight()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_licensing_schema_has_all_fields() {
        let schema = FieldSchema::licensing();
        assert_eq!(schema.fields().len(), 15);
        assert!(schema.contains("council"));
        assert!(schema.contains("hmo_address"));
        assert!(schema.contains("number_of_storeys"));
        assert!(!schema.contains("unknown_field"));
    }

    #[test]
    fn test_required_fields() {
        let schema = FieldSchema::licensing();
        let required: Vec<&str> = schema
            .fields()
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();
        assert_eq!(
            required,
            vec![
                "council",
                "reference",
                "hmo_address",
                "licence_start",
                "licence_expiry",
                "max_occupancy"
            ]
        );
    }

    #[test]
    fn test_criticality_weights() {
        let schema = FieldSchema::licensing();
        assert_eq!(
            schema.field("council").unwrap().criticality.weight(),
            3.0
        );
        assert_eq!(
            schema.field("licence_start").unwrap().criticality.weight(),
            2.0
        );
        assert_eq!(
            schema
                .field("number_of_households")
                .unwrap()
                .criticality
                .weight(),
            1.0
        );
        // 3 critical + 3 important + 9 standard
        assert_eq!(schema.total_weight(), 3.0 * 3.0 + 3.0 * 2.0 + 9.0);
    }

    #[test]
    fn test_field_kind_lookup() {
        let schema = FieldSchema::licensing();
        assert_eq!(schema.field("licence_expiry").unwrap().kind, FieldKind::Date);
        assert_eq!(
            schema.field("hmo_manager_name").unwrap().kind,
            FieldKind::PersonName
        );
        assert_eq!(schema.field("max_occupancy").unwrap().kind, FieldKind::Count);
    }
}
