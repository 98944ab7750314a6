// 📐 Shape Layer - Schema Definitions
// Schemas are values. Composition always returns a new schema.

use crate::attributes::FieldRule;
use crate::record::ValidatedRecord;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Configuration errors, raised while a schema is being built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("union `{union}` needs at least two variants, got {count}")]
    TooFewVariants { union: String, count: usize },

    #[error("union `{union}`: variant `{variant}` declares no fields")]
    EmptyVariant { union: String, variant: String },

    #[error("union `{union}`: field `{field}` appears in more than one variant or in the shared fields")]
    OverlappingFields { union: String, field: String },

    #[error("union `{union}`: variant `{variant}` declares a nested union")]
    NestedUnion { union: String, variant: String },
}

/// Raised by a transform; surfaces as a `TransformFailed` validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(msg: impl Into<String>) -> Self {
        TransformError(msg.into())
    }
}

pub type TransformFn =
    Arc<dyn Fn(ValidatedRecord) -> Result<ValidatedRecord, TransformError> + Send + Sync>;

/// Named post-validation rewrite.
#[derive(Clone)]
pub struct Transform {
    pub name: String,
    pub apply: TransformFn,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// Raw keys starting with `prefix` are moved into the object field `target`,
/// with the remainder of each key converted to camelCase.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub prefix: String,
    pub target: String,
}

/// Mutually exclusive field groups. Exactly one variant must match.
#[derive(Debug, Clone)]
pub struct UnionGroup {
    pub name: String,
    pub variants: Vec<SchemaDefinition>,
}

// ============================================================================
// SCHEMA DEFINITION
// ============================================================================

#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    name: String,
    fields: Vec<FieldRule>,
    unions: Vec<UnionGroup>,
    promotions: Vec<Promotion>,
    transforms: Vec<Transform>,
    strict: bool,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        SchemaDefinition {
            name: name.into(),
            fields: Vec::new(),
            unions: Vec::new(),
            promotions: Vec::new(),
            transforms: Vec::new(),
            strict: false,
        }
    }

    /// Builder: append a field, replacing any field with the same name in place.
    pub fn field(mut self, rule: FieldRule) -> Self {
        match self.fields.iter_mut().find(|f| f.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.fields.push(rule),
        }
        self
    }

    /// Builder: reject keys no rule reads.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn promote(mut self, prefix: impl Into<String>, target: impl Into<String>) -> Self {
        self.promotions.push(Promotion {
            prefix: prefix.into(),
            target: target.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn unions(&self) -> &[UnionGroup] {
        &self.unions
    }

    pub fn promotions(&self) -> &[Promotion] {
        &self.promotions
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Canonical field names in declaration order, union variant fields last.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        for group in &self.unions {
            for variant in &group.variants {
                names.extend(variant.fields.iter().map(|f| f.name.as_str()));
            }
        }
        names
    }

    /// Every raw key any rule of this schema (or its unions) may read.
    pub fn known_keys(&self) -> HashSet<&str> {
        let mut keys: HashSet<&str> = self.fields.iter().flat_map(|f| f.source_keys()).collect();
        for group in &self.unions {
            for variant in &group.variants {
                keys.extend(variant.fields.iter().flat_map(|f| f.source_keys()));
            }
        }
        keys
    }

    // ------------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------------

    /// New schema with `additional` fields; same-named fields override in place.
    /// Fails if an added field collides with a union variant field.
    pub fn extend<I>(&self, additional: I) -> Result<SchemaDefinition, SchemaError>
    where
        I: IntoIterator<Item = FieldRule>,
    {
        let extended = additional
            .into_iter()
            .fold(self.clone(), |schema, rule| schema.field(rule));
        extended.check_unions()?;
        Ok(extended)
    }

    /// New schema combining fields, unions, promotions and transforms.
    /// `other` wins on same-named fields; its transforms run after ours.
    pub fn merge(&self, other: &SchemaDefinition) -> Result<SchemaDefinition, SchemaError> {
        let mut merged = self.extend(other.fields.iter().cloned())?;
        merged.promotions.extend(other.promotions.iter().cloned());
        merged.transforms.extend(other.transforms.iter().cloned());
        merged.strict = self.strict || other.strict;
        for group in &other.unions {
            merged = merged.with_union(&group.name, group.variants.clone())?;
        }
        Ok(merged)
    }

    /// Every field name or wire key must belong to the shared fields or to
    /// exactly one union variant.
    pub fn check_unions(&self) -> Result<(), SchemaError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for rule in &self.fields {
            seen.insert(rule.name.as_str());
            seen.extend(rule.source_keys());
        }
        for group in &self.unions {
            for variant in &group.variants {
                let mut own: HashSet<&str> = HashSet::new();
                for rule in &variant.fields {
                    own.insert(rule.name.as_str());
                    own.extend(rule.source_keys());
                }
                if let Some(field) = own.iter().find(|k| seen.contains(*k)) {
                    return Err(SchemaError::OverlappingFields {
                        union: group.name.clone(),
                        field: field.to_string(),
                    });
                }
                seen.extend(own);
            }
        }
        Ok(())
    }

    /// Schema consisting only of one union over `variants`.
    pub fn union(
        name: impl Into<String>,
        variants: Vec<SchemaDefinition>,
    ) -> Result<SchemaDefinition, SchemaError> {
        let name = name.into();
        SchemaDefinition::new(name.clone()).with_union(&name, variants)
    }

    /// New schema with an added union group.
    ///
    /// Fails if fewer than two variants are given, a variant is empty, or any
    /// field name or wire key appears in two variants or in the shared fields.
    pub fn with_union(
        &self,
        union: &str,
        variants: Vec<SchemaDefinition>,
    ) -> Result<SchemaDefinition, SchemaError> {
        if variants.len() < 2 {
            return Err(SchemaError::TooFewVariants {
                union: union.to_string(),
                count: variants.len(),
            });
        }

        for variant in &variants {
            if variant.fields.is_empty() {
                return Err(SchemaError::EmptyVariant {
                    union: union.to_string(),
                    variant: variant.name.clone(),
                });
            }
            if !variant.unions.is_empty() {
                return Err(SchemaError::NestedUnion {
                    union: union.to_string(),
                    variant: variant.name.clone(),
                });
            }
        }

        let mut schema = self.clone();
        schema.unions.push(UnionGroup {
            name: union.to_string(),
            variants,
        });
        schema.check_unions()?;
        Ok(schema)
    }

    /// New schema whose validated output is post-processed by `f`.
    pub fn with_transform<F>(&self, name: impl Into<String>, f: F) -> SchemaDefinition
    where
        F: Fn(ValidatedRecord) -> Result<ValidatedRecord, TransformError> + Send + Sync + 'static,
    {
        let mut schema = self.clone();
        schema.transforms.push(Transform {
            name: name.into(),
            apply: Arc::new(f),
        });
        schema
    }

    /// New schema with a different name; useful when deriving variants.
    pub fn renamed(&self, name: impl Into<String>) -> SchemaDefinition {
        let mut schema = self.clone();
        schema.name = name.into();
        schema
    }
}
