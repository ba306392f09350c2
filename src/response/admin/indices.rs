use log::trace;
use serde_json::Value;

use crate::{
    error::Result,
    record::{from_body, Record},
    response::{
        admin::{flatten_settings, json_entries, Settings},
        FromResponse,
    },
};

use std::collections::BTreeMap;

/// Mapping type used by servers that no longer key mappings by type.
pub const TYPELESS: &str = "_doc";

/// Mappings by index, then by type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetMappings {
    pub indices: BTreeMap<String, BTreeMap<String, Value>>,
}

impl GetMappings {
    pub fn mapping(&self, index: &str, ty: &str) -> Option<&Value> {
        self.indices.get(index).and_then(|types| types.get(ty))
    }
}

impl FromResponse for GetMappings {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let indices = record
                .entries()
                .map(|(index, entry)| (index.to_owned(), mappings_by_type(entry.record("mappings"))))
                .collect();
            Ok(GetMappings { indices })
        })
    }
}

fn mappings_by_type(mappings: Option<Record<'_>>) -> BTreeMap<String, Value> {
    match mappings {
        Some(mappings) if mappings.contains("properties") || mappings.contains("dynamic") => {
            trace!("typeless mapping filed under {}", TYPELESS);
            let mut types = BTreeMap::new();
            types.insert(TYPELESS.to_owned(), Value::Object(mappings.map().clone()));
            types
        }
        mappings => json_entries(mappings),
    }
}

/// Flattened settings by index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetSettings {
    pub indices: BTreeMap<String, Settings>,
}

impl GetSettings {
    pub fn setting(&self, index: &str, key: &str) -> Option<&str> {
        self.indices
            .get(index)
            .and_then(|settings| settings.get(key))
            .map(String::as_str)
    }
}

impl FromResponse for GetSettings {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let indices = record
                .entries()
                .map(|(index, entry)| (index.to_owned(), flatten_settings(entry.record("settings"))))
                .collect();
            Ok(GetSettings { indices })
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AliasMetadata {
    pub alias: String,
    pub filter: Option<Value>,
    pub index_routing: Option<String>,
    pub search_routing: Option<String>,
    pub is_write_index: Option<bool>,
}

impl AliasMetadata {
    fn from_record(alias: &str, record: Record<'_>) -> Self {
        // a shared `routing` applies to both sides
        let routing = record.string("routing");
        AliasMetadata {
            alias: alias.to_owned(),
            filter: record.get("filter").cloned(),
            index_routing: record.string("index_routing").or_else(|| routing.clone()),
            search_routing: record.string("search_routing").or(routing),
            is_write_index: record.bool("is_write_index"),
        }
    }
}

fn aliases_of(aliases: Option<Record<'_>>) -> Vec<AliasMetadata> {
    aliases
        .iter()
        .flat_map(Record::entries)
        .map(|(alias, record)| AliasMetadata::from_record(alias, record))
        .collect()
}

/// Aliases by index; indices without aliases map to an empty list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetAliases {
    pub indices: BTreeMap<String, Vec<AliasMetadata>>,
}

impl GetAliases {
    pub fn aliases(&self, index: &str) -> &[AliasMetadata] {
        self.indices.get(index).map(Vec::as_slice).unwrap_or_default()
    }
}

impl FromResponse for GetAliases {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let indices = record
                .entries()
                .map(|(index, entry)| (index.to_owned(), aliases_of(entry.record("aliases"))))
                .collect();
            Ok(GetAliases { indices })
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexTemplate {
    pub name: String,
    pub order: i32,
    pub version: Option<i64>,
    /// `template` on older servers, `index_patterns` on newer ones.
    pub patterns: Vec<String>,
    pub settings: Settings,
    pub mappings: BTreeMap<String, Value>,
    pub aliases: Vec<AliasMetadata>,
    pub warmers: BTreeMap<String, Value>,
}

impl IndexTemplate {
    fn from_record(name: &str, record: Record<'_>) -> Self {
        let patterns = match record.string("template") {
            Some(pattern) => vec![pattern],
            None => record.strings("index_patterns").unwrap_or_default(),
        };
        IndexTemplate {
            name: name.to_owned(),
            order: record.i32("order").unwrap_or(0),
            version: record.i64("version"),
            patterns,
            settings: flatten_settings(record.record("settings")),
            mappings: mappings_by_type(record.record("mappings")),
            aliases: aliases_of(record.record("aliases")),
            warmers: json_entries(record.record("warmers")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetIndexTemplates {
    pub templates: Vec<IndexTemplate>,
}

impl GetIndexTemplates {
    pub fn template(&self, name: &str) -> Option<&IndexTemplate> {
        self.templates.iter().find(|template| template.name == name)
    }
}

impl FromResponse for GetIndexTemplates {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let templates = record
                .entries()
                .map(|(name, template)| IndexTemplate::from_record(name, template))
                .collect();
            Ok(GetIndexTemplates { templates })
        })
    }
}
