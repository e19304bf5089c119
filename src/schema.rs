//! Document-type mappings for the archive index.
//!
//! The archiver, the Lua request layer and the browser client all query
//! these exact field names and types. The table is contract data, not
//! configuration: once documents have been written, changing a field here
//! makes the index incompatible with the data already in it.
//!
//! Every document type is a [`DocType`] variant owning a static list of
//! `(field name, FieldSpec)` pairs. [`mappings`] renders the whole registry
//! into the `mappings` object of a create-index request, in the vocabulary
//! ([`MappingDialect`]) the target engine understands.

use serde_json::{json, Map, Value};

/// Engine-level field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Tokenized full-text string.
    Text,
    /// Exact-match string.
    Keyword,
    Long,
    Boolean,
    Date,
    Binary,
    /// Inner object, optionally with its own properties.
    Object,
}

/// A named field and its specification.
pub type Field = (&'static str, FieldSpec);

/// Mapping of a single field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub data_type: DataType,
    /// `false` pins the field to exact-match indexing.
    pub analyzed: bool,
    pub date_format: Option<&'static str>,
    /// Keep the original value retrievable on its own.
    pub stored: bool,
    /// Sub-fields of an [`DataType::Object`] field.
    pub properties: &'static [Field],
}

impl FieldSpec {
    const fn of(data_type: DataType) -> Self {
        Self {
            data_type,
            analyzed: !matches!(data_type, DataType::Keyword),
            date_format: None,
            stored: false,
            properties: NO_FIELDS,
        }
    }

    pub const fn text() -> Self {
        Self::of(DataType::Text)
    }

    pub const fn keyword() -> Self {
        Self::of(DataType::Keyword)
    }

    pub const fn long() -> Self {
        Self::of(DataType::Long)
    }

    pub const fn boolean() -> Self {
        Self::of(DataType::Boolean)
    }

    pub const fn binary() -> Self {
        Self::of(DataType::Binary)
    }

    pub const fn date(format: &'static str) -> Self {
        Self {
            date_format: Some(format),
            ..Self::of(DataType::Date)
        }
    }

    pub const fn object(properties: &'static [Field]) -> Self {
        Self {
            properties,
            ..Self::of(DataType::Object)
        }
    }

    pub const fn stored(self) -> Self {
        Self {
            stored: true,
            ..self
        }
    }

    pub const fn not_analyzed(self) -> Self {
        Self {
            analyzed: false,
            ..self
        }
    }

    /// Render this field as an engine mapping fragment.
    pub fn to_mapping(&self, dialect: MappingDialect) -> Value {
        let mut m = Map::new();

        if self.data_type == DataType::Object && !self.properties.is_empty() {
            m.insert("properties".into(), properties(self.properties, dialect));
            return Value::Object(m);
        }

        let type_name = match (dialect, self.data_type) {
            (MappingDialect::Legacy, DataType::Text | DataType::Keyword) => "string",
            (MappingDialect::Modern, DataType::Text) => "text",
            (MappingDialect::Modern, DataType::Keyword) => "keyword",
            (_, DataType::Long) => "long",
            (_, DataType::Boolean) => "boolean",
            (_, DataType::Date) => "date",
            (_, DataType::Binary) => "binary",
            (_, DataType::Object) => "object",
        };
        m.insert("type".into(), json!(type_name));

        if self.stored {
            m.insert("store".into(), json!(true));
        }
        if let Some(format) = self.date_format {
            m.insert("format".into(), json!(format));
        }
        // Modern engines express exactness through the keyword type alone.
        if dialect == MappingDialect::Legacy && !self.analyzed {
            m.insert("index".into(), json!("not_analyzed"));
        }

        Value::Object(m)
    }
}

fn properties(fields: &[Field], dialect: MappingDialect) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(name, spec)| (name.to_string(), spec.to_mapping(dialect)))
        .collect();
    Value::Object(map)
}

/// Field-type vocabulary of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingDialect {
    /// Engines before 5.x: `string` with `index: not_analyzed`.
    Legacy,
    /// 5.x: `text` and `keyword`. Later engines allow a single mapping
    /// type per index and are refused before any create call.
    Modern,
}

impl MappingDialect {
    /// Pick the dialect for an engine major version. Unknown versions get
    /// the modern vocabulary.
    pub fn for_engine(major: Option<u32>) -> Self {
        match major {
            Some(v) if v < 5 => MappingDialect::Legacy,
            _ => MappingDialect::Modern,
        }
    }
}

const IMPORT_DATE_FORMAT: &str = "yyyy/MM/dd HH:mm:ss||yyyy/MM/dd";
const MESSAGE_DATE_FORMAT: &str = "yyyy/MM/dd HH:mm:ss";

const ATTACHMENT_META_FIELDS: &[Field] = &[
    ("content_type", FieldSpec::keyword()),
    ("filename", FieldSpec::keyword()),
    ("hash", FieldSpec::keyword()),
    ("size", FieldSpec::long()),
];

const MBOX_FIELDS: &[Field] = &[
    ("@import_timestamp", FieldSpec::date(IMPORT_DATE_FORMAT)),
    ("attachments", FieldSpec::object(ATTACHMENT_META_FIELDS)),
    ("body", FieldSpec::text()),
    ("cc", FieldSpec::text()),
    (
        "date",
        FieldSpec::date(MESSAGE_DATE_FORMAT).stored().not_analyzed(),
    ),
    // seconds since the epoch
    ("epoch", FieldSpec::long().not_analyzed()),
    ("from", FieldSpec::text()),
    ("from_raw", FieldSpec::keyword()),
    ("in-reply-to", FieldSpec::text()),
    ("list", FieldSpec::text()),
    ("list_raw", FieldSpec::keyword()),
    ("message-id", FieldSpec::keyword()),
    ("mid", FieldSpec::text()),
    ("private", FieldSpec::boolean()),
    ("references", FieldSpec::text()),
    ("subject", FieldSpec::text()),
    ("to", FieldSpec::text()),
];

const ATTACHMENT_FIELDS: &[Field] = &[("source", FieldSpec::binary())];

const MBOX_SOURCE_FIELDS: &[Field] = &[
    ("source", FieldSpec::binary()),
    ("message-id", FieldSpec::keyword()),
    ("mid", FieldSpec::text()),
];

const MAILINGLISTS_FIELDS: &[Field] = &[
    ("list", FieldSpec::text()),
    ("name", FieldSpec::text()),
    ("description", FieldSpec::text()),
];

const NO_FIELDS: &[Field] = &[];

const CREDENTIAL_FIELDS: &[Field] = &[
    ("altemail", FieldSpec::object(NO_FIELDS)),
    ("email", FieldSpec::keyword()),
    ("fullname", FieldSpec::keyword()),
    ("uid", FieldSpec::keyword()),
];

const ACCOUNT_INTERNAL_FIELDS: &[Field] = &[
    ("cookie", FieldSpec::keyword()),
    ("ip", FieldSpec::keyword()),
    ("oauth_used", FieldSpec::keyword()),
];

const ACCOUNT_FIELDS: &[Field] = &[
    ("cid", FieldSpec::keyword()),
    ("credentials", FieldSpec::object(CREDENTIAL_FIELDS)),
    ("internal", FieldSpec::object(ACCOUNT_INTERNAL_FIELDS)),
    ("request_id", FieldSpec::keyword()),
];

const NOTIFICATIONS_FIELDS: &[Field] = &[
    ("date", FieldSpec::date(MESSAGE_DATE_FORMAT).stored()),
    ("epoch", FieldSpec::long()),
    ("from", FieldSpec::text()),
    ("in-reply-to", FieldSpec::text()),
    ("list", FieldSpec::text()),
    ("message-id", FieldSpec::keyword()),
    ("mid", FieldSpec::text()),
    ("private", FieldSpec::boolean()),
    ("recipient", FieldSpec::keyword()),
    ("seen", FieldSpec::long()),
    ("subject", FieldSpec::text()),
    ("to", FieldSpec::text()),
    ("type", FieldSpec::keyword()),
];

/// Document types stored in the archive index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocType {
    /// A parsed mail message.
    Mbox,
    /// Attachment payload, referenced by hash from `mbox`.
    Attachment,
    /// Raw message source.
    MboxSource,
    MailingLists,
    Account,
    Notifications,
}

impl DocType {
    pub const ALL: [DocType; 6] = [
        DocType::Mbox,
        DocType::Attachment,
        DocType::MboxSource,
        DocType::MailingLists,
        DocType::Account,
        DocType::Notifications,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DocType::Mbox => "mbox",
            DocType::Attachment => "attachment",
            DocType::MboxSource => "mbox_source",
            DocType::MailingLists => "mailinglists",
            DocType::Account => "account",
            DocType::Notifications => "notifications",
        }
    }

    /// Whether the type takes part in catch-all (`_all`) search.
    pub fn searchable(self) -> bool {
        !matches!(
            self,
            DocType::MboxSource | DocType::Account | DocType::Notifications
        )
    }

    pub fn fields(self) -> &'static [Field] {
        match self {
            DocType::Mbox => MBOX_FIELDS,
            DocType::Attachment => ATTACHMENT_FIELDS,
            DocType::MboxSource => MBOX_SOURCE_FIELDS,
            DocType::MailingLists => MAILINGLISTS_FIELDS,
            DocType::Account => ACCOUNT_FIELDS,
            DocType::Notifications => NOTIFICATIONS_FIELDS,
        }
    }

    /// Look up a top-level field by name.
    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, spec)| spec)
    }

    pub fn to_mapping(self, dialect: MappingDialect) -> Value {
        let mut m = Map::new();
        if !self.searchable() {
            m.insert("_all".into(), json!({ "enabled": false }));
        }
        m.insert("properties".into(), properties(self.fields(), dialect));
        Value::Object(m)
    }
}

/// Render the given document types into a create-index `mappings` object.
pub fn mappings(types: &[DocType], dialect: MappingDialect) -> Value {
    let map: Map<String, Value> = types
        .iter()
        .map(|t| (t.name().to_string(), t.to_mapping(dialect)))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_has_six_distinct_types() {
        let names: HashSet<_> = DocType::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), 6);

        let m = mappings(&DocType::ALL, MappingDialect::Modern);
        let obj = m.as_object().unwrap();
        for name in [
            "mbox",
            "attachment",
            "mbox_source",
            "mailinglists",
            "account",
            "notifications",
        ] {
            assert!(obj.contains_key(name), "missing type {}", name);
        }
    }

    #[test]
    fn field_names_unique_within_each_type() {
        for t in DocType::ALL {
            let names: HashSet<_> = t.fields().iter().map(|(n, _)| *n).collect();
            assert_eq!(names.len(), t.fields().len(), "duplicate in {}", t.name());
        }
    }

    #[test]
    fn legacy_dialect_marks_exact_strings() {
        let spec = DocType::Mbox.field("message-id").unwrap();
        assert_eq!(
            spec.to_mapping(MappingDialect::Legacy),
            json!({ "type": "string", "index": "not_analyzed" })
        );
        assert_eq!(
            spec.to_mapping(MappingDialect::Modern),
            json!({ "type": "keyword" })
        );
    }

    #[test]
    fn analyzed_text_maps_per_dialect() {
        let body = DocType::Mbox.field("body").unwrap();
        assert_eq!(body.to_mapping(MappingDialect::Legacy), json!({ "type": "string" }));
        assert_eq!(body.to_mapping(MappingDialect::Modern), json!({ "type": "text" }));
    }

    #[test]
    fn mbox_date_is_stored_with_format() {
        let date = DocType::Mbox.field("date").unwrap();
        assert_eq!(
            date.to_mapping(MappingDialect::Legacy),
            json!({
                "type": "date",
                "store": true,
                "format": "yyyy/MM/dd HH:mm:ss",
                "index": "not_analyzed"
            })
        );
        assert_eq!(
            date.to_mapping(MappingDialect::Modern),
            json!({ "type": "date", "store": true, "format": "yyyy/MM/dd HH:mm:ss" })
        );
    }

    #[test]
    fn nested_objects_render_properties() {
        let m = DocType::Account.to_mapping(MappingDialect::Modern);
        assert_eq!(
            m["properties"]["credentials"]["properties"]["email"],
            json!({ "type": "keyword" })
        );
        assert_eq!(
            m["properties"]["credentials"]["properties"]["altemail"],
            json!({ "type": "object" })
        );
        assert!(m["properties"]["credentials"].get("type").is_none());
    }

    #[test]
    fn unsearchable_types_disable_all() {
        let m = mappings(&DocType::ALL, MappingDialect::Modern);
        for t in DocType::ALL {
            let all = m[t.name()].get("_all");
            if t.searchable() {
                assert!(all.is_none(), "{} should be searchable", t.name());
            } else {
                assert_eq!(all, Some(&json!({ "enabled": false })));
            }
        }
    }

    #[test]
    fn dialect_follows_engine_major() {
        assert_eq!(MappingDialect::for_engine(Some(2)), MappingDialect::Legacy);
        assert_eq!(MappingDialect::for_engine(Some(5)), MappingDialect::Modern);
        assert_eq!(MappingDialect::for_engine(None), MappingDialect::Modern);
    }
}
