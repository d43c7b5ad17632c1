//! Field definition compiler: raw field specs -> normalized schema descriptors.

use crate::config::resolved::{FieldDescriptor, SchemaDescriptor, StorageType};
use crate::config::types::{FieldMap, FieldSpec};

/// Resolve a type name (any case) to a storage type. Unknown or missing names fall back to `Mixed`.
pub fn resolve_type(type_name: Option<&str>) -> StorageType {
    let Some(name) = type_name else {
        return StorageType::Mixed;
    };
    match name.trim().to_lowercase().as_str() {
        "string" => StorageType::String,
        "number" => StorageType::Number,
        "boolean" => StorageType::Boolean,
        "date" => StorageType::Date,
        "objectid" => StorageType::ObjectId,
        "array" => StorageType::Array,
        "mixed" => StorageType::Mixed,
        _ => StorageType::Mixed,
    }
}

/// Compile one field definition. Recursion only descends into strictly smaller subtrees.
pub fn compile_field(spec: &FieldSpec) -> FieldDescriptor {
    match spec {
        FieldSpec::Array(elem) => FieldDescriptor::Array(Box::new(compile_field(elem))),
        FieldSpec::UntypedArray => FieldDescriptor::Array(Box::new(FieldDescriptor::scalar(StorageType::Mixed))),
        FieldSpec::Primitive(name) => FieldDescriptor::scalar(resolve_type(Some(name))),
        FieldSpec::Typed {
            type_name,
            constraints,
        } => FieldDescriptor::Scalar {
            storage: resolve_type(type_name.as_deref()),
            constraints: constraints.clone(),
        },
        FieldSpec::Embedded(fields) => FieldDescriptor::Embedded(build_schema(fields)),
        FieldSpec::Untyped => FieldDescriptor::scalar(StorageType::Mixed),
    }
}

/// Compile every field of an entity (or embedded document).
pub fn build_schema(fields: &FieldMap) -> SchemaDescriptor {
    let mut schema = SchemaDescriptor::new();
    for (name, spec) in fields {
        schema.insert(name.clone(), compile_field(spec));
    }
    schema
}
