//! Frontend field catalog: what UI renderers receive for each entity field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Known render kinds. Unknown type strings render as [`RenderKind::Text`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderKind {
    Text,
    Textarea,
    Number,
    Email,
    Phone,
    Password,
    Boolean,
    Date,
    Time,
    DateTime,
    Dropdown,
    Checkbox,
    Tags,
    File,
    SubForm,
    Geolocation,
}

impl RenderKind {
    pub fn from_type(type_name: &str) -> RenderKind {
        match type_name {
            "textarea" => RenderKind::Textarea,
            "number" => RenderKind::Number,
            "email" => RenderKind::Email,
            "phone" => RenderKind::Phone,
            "password" => RenderKind::Password,
            "boolean" => RenderKind::Boolean,
            "Date" => RenderKind::Date,
            "Time" => RenderKind::Time,
            "DateTime" => RenderKind::DateTime,
            "dropdown" => RenderKind::Dropdown,
            "checkbox" => RenderKind::Checkbox,
            "tags" => RenderKind::Tags,
            "imageLink" | "file" => RenderKind::File,
            "subString" | "safetychecks" | "permitchecklists" => RenderKind::SubForm,
            "geolocation" => RenderKind::Geolocation,
            _ => RenderKind::Text,
        }
    }
}

/// `array` arrives as `true` or `"true"` in the wild.
fn flag_from_json<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s == "true",
        _ => false,
    })
}

/// One field of a frontend form/table definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiField {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Endpoint the renderer loads dropdown options from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<UiField>,
    #[serde(default, deserialize_with = "flag_from_json")]
    pub array: bool,
}

impl UiField {
    pub fn render_kind(&self) -> RenderKind {
        RenderKind::from_type(&self.type_name)
    }

    /// Empty form value a renderer starts from: `[]` for multi-select checkboxes,
    /// `false` for booleans, `""` for everything else.
    pub fn initial_value(&self) -> Value {
        match self.render_kind() {
            RenderKind::Checkbox if self.array => Value::Array(Vec::new()),
            RenderKind::Boolean => Value::Bool(false),
            _ => Value::String(String::new()),
        }
    }

    /// Catalog entry served to renderers: the field plus its resolved kind and initial value.
    pub fn describe(&self) -> Value {
        let mut v = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(obj) = &mut v {
            obj.insert(
                "renderKind".into(),
                serde_json::to_value(self.render_kind()).unwrap_or(Value::Null),
            );
            obj.insert("initialValue".into(), self.initial_value());
            if !self.sub_fields.is_empty() {
                obj.insert(
                    "subFields".into(),
                    Value::Array(self.sub_fields.iter().map(UiField::describe).collect()),
                );
            }
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(v: Value) -> UiField {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn unknown_types_fall_back_to_text() {
        assert_eq!(RenderKind::from_type("hologram"), RenderKind::Text);
        assert_eq!(RenderKind::from_type("imageLink"), RenderKind::File);
        assert_eq!(RenderKind::from_type("permitchecklists"), RenderKind::SubForm);
    }

    #[test]
    fn initial_values_follow_kind_and_array_flag() {
        assert_eq!(field(json!({"name": "active", "type": "boolean"})).initial_value(), json!(false));
        assert_eq!(field(json!({"name": "ok", "type": "checkbox"})).initial_value(), json!(""));
        assert_eq!(
            field(json!({"name": "opts", "type": "checkbox", "array": "true"})).initial_value(),
            json!([])
        );
        assert_eq!(field(json!({"name": "tags", "type": "tags", "array": true})).initial_value(), json!(""));
        assert_eq!(field(json!({"name": "checks", "type": "safetychecks"})).initial_value(), json!(""));
        assert_eq!(field(json!({"name": "title", "type": "text"})).initial_value(), json!(""));
    }

    #[test]
    fn describe_adds_render_kind_recursively() {
        let f = field(json!({
            "name": "contacts", "label": "Contacts", "type": "subString",
            "subFields": [{"name": "phone", "type": "phone"}]
        }));
        let d = f.describe();
        assert_eq!(d["renderKind"], json!("subForm"));
        assert_eq!(d["subFields"][0]["renderKind"], json!("phone"));
        assert_eq!(d["initialValue"], json!(""));
    }
}
