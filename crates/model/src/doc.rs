//! Structured document serialization
//!
//! Besides the binary wire format, the catalog serializes to a
//! self-describing key/value tree. Three contexts are distinguished by a
//! mode carried through the tree:
//!
//! - [`ContextMode::Api`]: for a caller reading the cluster state; emits
//!   only customs marked API, template mappings in the reduced
//!   (unwrapped) form
//! - [`ContextMode::Gateway`]: the on-disk persistence snapshot; the root
//!   object is named `meta-data`, carries the version field, and emits only
//!   customs marked GATEWAY; template mappings keep the legacy type-wrapped
//!   form
//! - [`ContextMode::Snapshot`]: for a snapshot's global-state file; emits
//!   only customs marked SNAPSHOT
//!
//! Round-trip contract: for any catalog `m`, parsing the GATEWAY document
//! and re-building yields a value equal to `m` in its GATEWAY-reachable
//! subset (transient settings and API-only customs are not persisted).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::version::TransportVersion;

use crate::coordination::{CoordinationMetadata, VotingConfigExclusion};
use crate::customs::{Custom, IndexGraveyard, INDEX_GRAVEYARD_NAME};
use crate::datastream::{DataStream, DataStreamAlias};
use crate::immutable_state::{ImmutableStateHandlerMetadata, ImmutableStateMetadata};
use crate::index::{AliasMetadata, Index, IndexMetadata, IndexState};
use crate::mapping::MappingMetadata;
use crate::metadata::{Metadata, MetadataBuilder};
use crate::settings::Settings;
use crate::template::{
    reduce_mappings, wrap_mappings_legacy, ComponentTemplate, ComposableIndexTemplate,
    DataStreamTemplate, IndexTemplateMetadata, Template,
};

/// Root object name of the GATEWAY document
pub const GATEWAY_ROOT: &str = "meta-data";

/// Serialization context carried through the document tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextMode {
    /// Cluster-state API responses
    Api,
    /// On-disk persistence
    Gateway,
    /// Snapshot global-state files
    Snapshot,
}

// ============================================================================
// Emission
// ============================================================================

/// Render the catalog as a document for the given context
pub fn to_document(metadata: &Metadata, mode: ContextMode) -> Value {
    let mut root = Map::new();
    if mode == ContextMode::Gateway {
        root.insert("version".to_string(), json!(metadata.version()));
    }
    root.insert("cluster_uuid".to_string(), json!(metadata.cluster_uuid()));
    root.insert(
        "cluster_uuid_committed".to_string(),
        json!(metadata.cluster_uuid_committed()),
    );
    root.insert(
        "cluster_coordination".to_string(),
        coordination_to_doc(metadata.coordination()),
    );
    match mode {
        ContextMode::Gateway => {
            root.insert(
                "settings".to_string(),
                metadata.persistent_settings().to_nested_json(),
            );
        }
        _ => {
            root.insert(
                "persistent_settings".to_string(),
                metadata.persistent_settings().to_nested_json(),
            );
            root.insert(
                "transient_settings".to_string(),
                metadata.transient_settings().to_nested_json(),
            );
        }
    }

    let mut templates = Map::new();
    for (name, template) in metadata.templates() {
        templates.insert(name.clone(), legacy_template_to_doc(template, mode));
    }
    root.insert("templates".to_string(), Value::Object(templates));

    let mut component_templates = Map::new();
    for (name, template) in metadata.component_templates() {
        component_templates.insert(name.clone(), component_template_to_doc(template));
    }
    root.insert(
        "component_template".to_string(),
        Value::Object(component_templates),
    );

    let mut composable_templates = Map::new();
    for (name, template) in metadata.composable_templates() {
        composable_templates.insert(name.clone(), composable_template_to_doc(template));
    }
    root.insert(
        "index_template".to_string(),
        Value::Object(composable_templates),
    );

    let mut indices = Map::new();
    for (name, index) in metadata.indices() {
        indices.insert(name.clone(), index_to_doc(index));
    }
    root.insert("indices".to_string(), Value::Object(indices));

    let mut streams = Map::new();
    for (name, stream) in metadata.data_streams() {
        streams.insert(name.clone(), data_stream_to_doc(stream));
    }
    let mut stream_aliases = Map::new();
    for (name, alias) in metadata.data_stream_aliases() {
        stream_aliases.insert(name.clone(), data_stream_alias_to_doc(alias));
    }
    root.insert(
        "data_stream".to_string(),
        json!({
            "data_streams": Value::Object(streams),
            "data_stream_aliases": Value::Object(stream_aliases),
        }),
    );

    for (name, custom) in metadata.customs() {
        if custom.contexts().contains(&mode) {
            if let Some(doc) = custom_to_doc(custom) {
                root.insert(name.clone(), doc);
            }
        }
    }

    let mut immutable = Map::new();
    for (name, state) in metadata.immutable_states() {
        immutable.insert(name.clone(), immutable_state_to_doc(state));
    }
    root.insert("immutable_state".to_string(), Value::Object(immutable));

    match mode {
        ContextMode::Gateway => json!({ GATEWAY_ROOT: Value::Object(root) }),
        _ => Value::Object(root),
    }
}

fn coordination_to_doc(coordination: &CoordinationMetadata) -> Value {
    json!({
        "term": coordination.term,
        "last_committed_config": coordination.last_committed_config.iter().collect::<Vec<_>>(),
        "last_accepted_config": coordination.last_accepted_config.iter().collect::<Vec<_>>(),
        "voting_config_exclusions": coordination
            .voting_config_exclusions
            .iter()
            .map(|e| json!({"node_id": e.node_id, "node_name": e.node_name}))
            .collect::<Vec<_>>(),
    })
}

fn alias_to_doc(alias: &AliasMetadata) -> Value {
    let mut doc = Map::new();
    if let Some(filter) = &alias.filter {
        doc.insert("filter".to_string(), filter.clone());
    }
    if let Some(routing) = &alias.index_routing {
        doc.insert("index_routing".to_string(), json!(routing));
    }
    if let Some(routing) = &alias.search_routing {
        doc.insert("search_routing".to_string(), json!(routing));
    }
    if let Some(write) = alias.is_write_index {
        doc.insert("is_write_index".to_string(), json!(write));
    }
    if let Some(hidden) = alias.is_hidden {
        doc.insert("is_hidden".to_string(), json!(hidden));
    }
    Value::Object(doc)
}

fn index_to_doc(index: &IndexMetadata) -> Value {
    let mut aliases = Map::new();
    for (name, alias) in index.aliases() {
        aliases.insert(name.clone(), alias_to_doc(alias));
    }
    let mut doc = Map::new();
    doc.insert("version".to_string(), json!(index.version()));
    doc.insert("mapping_version".to_string(), json!(index.mapping_version()));
    doc.insert(
        "settings_version".to_string(),
        json!(index.settings_version()),
    );
    doc.insert("aliases_version".to_string(), json!(index.aliases_version()));
    doc.insert(
        "state".to_string(),
        json!(match index.state() {
            IndexState::Open => "open",
            IndexState::Closed => "close",
        }),
    );
    doc.insert("uuid".to_string(), json!(index.index().uuid()));
    doc.insert("settings".to_string(), index.settings().to_nested_json());
    if let Some(mapping) = index.mapping() {
        doc.insert("mappings".to_string(), mapping.source().clone());
    }
    doc.insert("aliases".to_string(), Value::Object(aliases));
    doc.insert("system".to_string(), json!(index.is_system()));
    if !index.customs().is_empty() {
        doc.insert("customs".to_string(), json!(index.customs()));
    }
    doc.insert(
        "creation_version".to_string(),
        json!(index.creation_version().id()),
    );
    doc.insert(
        "compatibility_version".to_string(),
        json!(index.compatibility_version().id()),
    );
    Value::Object(doc)
}

fn legacy_template_to_doc(template: &IndexTemplateMetadata, mode: ContextMode) -> Value {
    let mut aliases = Map::new();
    for (name, alias) in &template.aliases {
        aliases.insert(name.clone(), alias_to_doc(alias));
    }
    let mut doc = Map::new();
    doc.insert("order".to_string(), json!(template.order));
    if let Some(version) = template.version {
        doc.insert("version".to_string(), json!(version));
    }
    doc.insert("index_patterns".to_string(), json!(template.patterns));
    doc.insert("settings".to_string(), template.settings.to_nested_json());
    if let Some(mappings) = &template.mappings {
        // Legacy quirk: the persisted form nests the body under a dummy
        // type key; API output is the reduced form.
        let rendered = match mode {
            ContextMode::Gateway => wrap_mappings_legacy(mappings),
            _ => mappings.clone(),
        };
        doc.insert("mappings".to_string(), rendered);
    }
    doc.insert("aliases".to_string(), Value::Object(aliases));
    Value::Object(doc)
}

fn template_block_to_doc(template: &Template) -> Value {
    let mut doc = Map::new();
    if let Some(settings) = &template.settings {
        doc.insert("settings".to_string(), settings.to_nested_json());
    }
    if let Some(mappings) = &template.mappings {
        doc.insert("mappings".to_string(), mappings.clone());
    }
    if let Some(aliases) = &template.aliases {
        let mut rendered = Map::new();
        for (name, alias) in aliases {
            rendered.insert(name.clone(), alias_to_doc(alias));
        }
        doc.insert("aliases".to_string(), Value::Object(rendered));
    }
    Value::Object(doc)
}

fn component_template_to_doc(template: &ComponentTemplate) -> Value {
    let mut doc = Map::new();
    doc.insert("template".to_string(), template_block_to_doc(&template.template));
    if let Some(version) = template.version {
        doc.insert("version".to_string(), json!(version));
    }
    if let Some(meta) = &template.metadata {
        doc.insert("_meta".to_string(), meta.clone());
    }
    Value::Object(doc)
}

fn composable_template_to_doc(template: &ComposableIndexTemplate) -> Value {
    let mut doc = Map::new();
    doc.insert("index_patterns".to_string(), json!(template.index_patterns));
    if let Some(block) = &template.template {
        doc.insert("template".to_string(), template_block_to_doc(block));
    }
    if !template.component_templates.is_empty() {
        doc.insert("composed_of".to_string(), json!(template.component_templates));
    }
    if let Some(priority) = template.priority {
        doc.insert("priority".to_string(), json!(priority));
    }
    if let Some(version) = template.version {
        doc.insert("version".to_string(), json!(version));
    }
    if let Some(meta) = &template.metadata {
        doc.insert("_meta".to_string(), meta.clone());
    }
    if let Some(ds) = &template.data_stream_template {
        doc.insert(
            "data_stream".to_string(),
            json!({"hidden": ds.hidden, "allow_custom_routing": ds.allow_custom_routing}),
        );
    }
    Value::Object(doc)
}

fn data_stream_to_doc(stream: &DataStream) -> Value {
    let mut doc = Map::new();
    doc.insert("name".to_string(), json!(stream.name()));
    doc.insert(
        "timestamp_field".to_string(),
        json!({"name": stream.timestamp_field()}),
    );
    doc.insert(
        "indices".to_string(),
        stream
            .indices()
            .iter()
            .map(|i| json!({"index_name": i.name(), "index_uuid": i.uuid()}))
            .collect(),
    );
    doc.insert("generation".to_string(), json!(stream.generation()));
    if let Some(meta) = stream.metadata() {
        doc.insert("_meta".to_string(), json!(meta));
    }
    doc.insert("hidden".to_string(), json!(stream.is_hidden()));
    doc.insert("replicated".to_string(), json!(stream.is_replicated()));
    doc.insert("system".to_string(), json!(stream.is_system()));
    doc.insert(
        "allow_custom_routing".to_string(),
        json!(stream.allows_custom_routing()),
    );
    Value::Object(doc)
}

fn data_stream_alias_to_doc(alias: &DataStreamAlias) -> Value {
    let mut doc = Map::new();
    doc.insert("data_streams".to_string(), json!(alias.data_streams()));
    if let Some(write) = alias.write_data_stream() {
        doc.insert("write_data_stream".to_string(), json!(write));
    }
    if let Some(filter) = alias.filter() {
        doc.insert("filter".to_string(), filter.clone());
    }
    Value::Object(doc)
}

fn custom_to_doc(custom: &Custom) -> Option<Value> {
    match custom {
        Custom::IndexGraveyard(graveyard) => Some(json!({
            "tombstones": graveyard
                .tombstones()
                .map(|t| json!({
                    "index": {"index_name": t.index.name(), "index_uuid": t.index.uuid()},
                    "delete_date_in_millis": t.delete_date_millis,
                }))
                .collect::<Vec<_>>(),
        })),
        // Snapshots are transient and never written into documents here;
        // unknown customs cannot be rendered.
        Custom::SnapshotsInProgress(_) | Custom::Unknown { .. } => None,
    }
}

fn immutable_state_to_doc(state: &ImmutableStateMetadata) -> Value {
    let mut handlers = Map::new();
    for (name, handler) in &state.handlers {
        handlers.insert(
            name.clone(),
            json!({"keys": handler.keys.iter().collect::<Vec<_>>()}),
        );
    }
    json!({
        "version": state.version,
        "handlers": Value::Object(handlers),
    })
}

// ============================================================================
// Parsing (GATEWAY)
// ============================================================================

fn corrupt(message: impl Into<String>) -> MetadataError {
    MetadataError::CorruptMetadata(message.into())
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| corrupt(format!("expected [{}] to be an object", what)))
}

fn get_u64(map: &Map<String, Value>, key: &str) -> Result<u64> {
    map.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| corrupt(format!("missing or invalid field [{}]", key)))
}

fn get_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| corrupt(format!("missing or invalid field [{}]", key)))
}

fn get_bool(map: &Map<String, Value>, key: &str) -> Result<bool> {
    map.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| corrupt(format!("missing or invalid field [{}]", key)))
}

/// Parse a GATEWAY document back into a catalog
pub fn from_gateway_document(document: &Value) -> Result<Metadata> {
    let wrapper = as_object(document, "document root")?;
    let root = as_object(
        wrapper
            .get(GATEWAY_ROOT)
            .ok_or_else(|| corrupt(format!("missing [{}] root object", GATEWAY_ROOT)))?,
        GATEWAY_ROOT,
    )?;

    let mut builder = MetadataBuilder::new();
    builder
        .version(get_u64(root, "version")?)
        .cluster_uuid(get_str(root, "cluster_uuid")?)
        .cluster_uuid_committed(get_bool(root, "cluster_uuid_committed")?);

    if let Some(coordination) = root.get("cluster_coordination") {
        builder.coordination_metadata(coordination_from_doc(coordination)?);
    }
    if let Some(settings) = root.get("settings") {
        builder.persistent_settings(Settings::from_nested_json(settings)?);
    }
    if let Some(templates) = root.get("templates") {
        for (name, doc) in as_object(templates, "templates")? {
            builder.put_template(legacy_template_from_doc(name, doc)?);
        }
    }
    if let Some(templates) = root.get("component_template") {
        for (name, doc) in as_object(templates, "component_template")? {
            builder.put_component_template(name.clone(), component_template_from_doc(doc)?);
        }
    }
    if let Some(templates) = root.get("index_template") {
        for (name, doc) in as_object(templates, "index_template")? {
            builder.put_composable_template(name.clone(), composable_template_from_doc(doc)?);
        }
    }
    if let Some(indices) = root.get("indices") {
        for (name, doc) in as_object(indices, "indices")? {
            builder.put(index_from_doc(name, doc)?, false)?;
        }
    }
    if let Some(section) = root.get("data_stream") {
        let section = as_object(section, "data_stream")?;
        if let Some(streams) = section.get("data_streams") {
            for (_, doc) in as_object(streams, "data_streams")? {
                builder.put_data_stream(data_stream_from_doc(doc)?);
            }
        }
        if let Some(aliases) = section.get("data_stream_aliases") {
            for (name, doc) in as_object(aliases, "data_stream_aliases")? {
                builder.put_data_stream_alias_value(data_stream_alias_from_doc(name, doc)?);
            }
        }
    }
    if let Some(graveyard) = root.get(INDEX_GRAVEYARD_NAME) {
        builder.index_graveyard(graveyard_from_doc(graveyard)?);
    }
    if let Some(states) = root.get("immutable_state") {
        for (name, doc) in as_object(states, "immutable_state")? {
            builder.put_immutable_state(immutable_state_from_doc(name, doc)?);
        }
    }
    builder.build()
}

fn coordination_from_doc(value: &Value) -> Result<CoordinationMetadata> {
    let map = as_object(value, "cluster_coordination")?;
    let string_set = |key: &str| -> Result<std::collections::BTreeSet<String>> {
        match map.get(key) {
            None => Ok(Default::default()),
            Some(value) => value
                .as_array()
                .ok_or_else(|| corrupt(format!("[{}] must be an array", key)))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| corrupt(format!("[{}] must hold strings", key)))
                })
                .collect(),
        }
    };
    let mut exclusions = Vec::new();
    if let Some(raw) = map.get("voting_config_exclusions") {
        for entry in raw
            .as_array()
            .ok_or_else(|| corrupt("[voting_config_exclusions] must be an array"))?
        {
            let entry = as_object(entry, "voting_config_exclusion")?;
            exclusions.push(VotingConfigExclusion {
                node_id: get_str(entry, "node_id")?.to_string(),
                node_name: get_str(entry, "node_name")?.to_string(),
            });
        }
    }
    Ok(CoordinationMetadata {
        term: get_u64(map, "term")?,
        last_committed_config: string_set("last_committed_config")?,
        last_accepted_config: string_set("last_accepted_config")?,
        voting_config_exclusions: exclusions,
    })
}

fn alias_from_doc(name: &str, value: &Value) -> Result<AliasMetadata> {
    let map = as_object(value, "alias")?;
    Ok(AliasMetadata {
        alias: name.to_string(),
        filter: map.get("filter").cloned(),
        index_routing: map
            .get("index_routing")
            .and_then(Value::as_str)
            .map(str::to_string),
        search_routing: map
            .get("search_routing")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_write_index: map.get("is_write_index").and_then(Value::as_bool),
        is_hidden: map.get("is_hidden").and_then(Value::as_bool),
    })
}

fn index_from_doc(name: &str, value: &Value) -> Result<IndexMetadata> {
    let map = as_object(value, "index")?;
    let mut builder = IndexMetadata::builder(name)
        .uuid(get_str(map, "uuid")?)
        .version(get_u64(map, "version")?)
        .mapping_version(get_u64(map, "mapping_version")?)
        .settings_version(get_u64(map, "settings_version")?)
        .aliases_version(get_u64(map, "aliases_version")?)
        .state(match get_str(map, "state")? {
            "open" => IndexState::Open,
            "close" => IndexState::Closed,
            other => return Err(corrupt(format!("unknown index state [{}]", other))),
        })
        .system(get_bool(map, "system")?)
        .creation_version(TransportVersion(get_u64(map, "creation_version")? as u32))
        .compatibility_version(TransportVersion(
            get_u64(map, "compatibility_version")? as u32,
        ));
    if let Some(settings) = map.get("settings") {
        builder = builder.settings(Settings::from_nested_json(settings)?);
    }
    if let Some(mappings) = map.get("mappings") {
        builder = builder.mapping(Arc::new(MappingMetadata::new(mappings.clone())));
    }
    if let Some(aliases) = map.get("aliases") {
        for (alias_name, alias_doc) in as_object(aliases, "aliases")? {
            builder = builder.put_alias(alias_from_doc(alias_name, alias_doc)?);
        }
    }
    if let Some(customs) = map.get("customs") {
        let parsed: BTreeMap<String, BTreeMap<String, String>> =
            serde_json::from_value(customs.clone())
                .map_err(|e| corrupt(format!("invalid index customs: {}", e)))?;
        for (key, value) in parsed {
            builder = builder.put_custom(key, value);
        }
    }
    builder.build()
}

fn legacy_template_from_doc(name: &str, value: &Value) -> Result<IndexTemplateMetadata> {
    let map = as_object(value, "template")?;
    let mut aliases = BTreeMap::new();
    if let Some(raw) = map.get("aliases") {
        for (alias_name, alias_doc) in as_object(raw, "aliases")? {
            aliases.insert(alias_name.clone(), alias_from_doc(alias_name, alias_doc)?);
        }
    }
    Ok(IndexTemplateMetadata {
        name: name.to_string(),
        order: map.get("order").and_then(Value::as_i64).unwrap_or(0) as i32,
        version: map.get("version").and_then(Value::as_i64),
        patterns: map
            .get("index_patterns")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        settings: map
            .get("settings")
            .map(Settings::from_nested_json)
            .transpose()?
            .unwrap_or_default(),
        // The persisted form is type-wrapped; reduce on read.
        mappings: map.get("mappings").map(reduce_mappings),
        aliases,
    })
}

fn template_block_from_doc(value: &Value) -> Result<Template> {
    let map = as_object(value, "template block")?;
    let mut aliases = None;
    if let Some(raw) = map.get("aliases") {
        let mut parsed = BTreeMap::new();
        for (alias_name, alias_doc) in as_object(raw, "aliases")? {
            parsed.insert(alias_name.clone(), alias_from_doc(alias_name, alias_doc)?);
        }
        aliases = Some(parsed);
    }
    Ok(Template {
        settings: map
            .get("settings")
            .map(Settings::from_nested_json)
            .transpose()?,
        mappings: map.get("mappings").cloned(),
        aliases,
    })
}

fn component_template_from_doc(value: &Value) -> Result<ComponentTemplate> {
    let map = as_object(value, "component template")?;
    Ok(ComponentTemplate {
        template: template_block_from_doc(
            map.get("template")
                .ok_or_else(|| corrupt("component template missing [template]"))?,
        )?,
        version: map.get("version").and_then(Value::as_i64),
        metadata: map.get("_meta").cloned(),
    })
}

fn composable_template_from_doc(value: &Value) -> Result<ComposableIndexTemplate> {
    let map = as_object(value, "index template")?;
    Ok(ComposableIndexTemplate {
        index_patterns: map
            .get("index_patterns")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        template: map.get("template").map(template_block_from_doc).transpose()?,
        component_templates: map
            .get("composed_of")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        priority: map.get("priority").and_then(Value::as_i64),
        version: map.get("version").and_then(Value::as_i64),
        metadata: map.get("_meta").cloned(),
        data_stream_template: map
            .get("data_stream")
            .map(|ds| -> Result<DataStreamTemplate> {
                let ds = as_object(ds, "data_stream")?;
                Ok(DataStreamTemplate {
                    hidden: ds.get("hidden").and_then(Value::as_bool).unwrap_or(false),
                    allow_custom_routing: ds
                        .get("allow_custom_routing")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            })
            .transpose()?,
    })
}

fn data_stream_from_doc(value: &Value) -> Result<DataStream> {
    let map = as_object(value, "data stream")?;
    let name = get_str(map, "name")?;
    let indices: Vec<Index> = map
        .get("indices")
        .and_then(Value::as_array)
        .ok_or_else(|| corrupt(format!("data stream [{}] missing indices", name)))?
        .iter()
        .map(|entry| -> Result<Index> {
            let entry = as_object(entry, "backing index")?;
            Ok(Index::new(
                get_str(entry, "index_name")?,
                get_str(entry, "index_uuid")?,
            ))
        })
        .collect::<Result<_>>()?;
    let mut stream = DataStream::new(name, indices, get_u64(map, "generation")?)?
        .with_hidden(get_bool(map, "hidden")?)
        .with_replicated(get_bool(map, "replicated")?)
        .with_system(get_bool(map, "system")?)
        .with_allow_custom_routing(get_bool(map, "allow_custom_routing")?);
    if let Some(meta) = map.get("_meta") {
        let parsed: BTreeMap<String, Value> = serde_json::from_value(meta.clone())
            .map_err(|e| corrupt(format!("invalid data stream _meta: {}", e)))?;
        stream = stream.with_metadata(parsed);
    }
    Ok(stream)
}

fn data_stream_alias_from_doc(name: &str, value: &Value) -> Result<DataStreamAlias> {
    let map = as_object(value, "data stream alias")?;
    let members: Vec<&str> = map
        .get("data_streams")
        .and_then(Value::as_array)
        .ok_or_else(|| corrupt(format!("data stream alias [{}] missing members", name)))?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let write = map.get("write_data_stream").and_then(Value::as_str);
    let filter = map.get("filter").cloned();
    let mut members_iter = members.iter();
    let first = *members_iter
        .next()
        .ok_or_else(|| corrupt(format!("data stream alias [{}] has no members", name)))?;
    let mut alias = DataStreamAlias::new(name, first, write == Some(first), filter);
    for member in members_iter {
        alias = alias.update(member, Some(write == Some(*member)), None);
    }
    Ok(alias)
}

fn graveyard_from_doc(value: &Value) -> Result<IndexGraveyard> {
    let map = as_object(value, INDEX_GRAVEYARD_NAME)?;
    let mut graveyard = IndexGraveyard::new();
    if let Some(tombstones) = map.get("tombstones") {
        for entry in tombstones
            .as_array()
            .ok_or_else(|| corrupt("[tombstones] must be an array"))?
        {
            let entry = as_object(entry, "tombstone")?;
            let index = as_object(
                entry
                    .get("index")
                    .ok_or_else(|| corrupt("tombstone missing [index]"))?,
                "tombstone index",
            )?;
            let millis = entry
                .get("delete_date_in_millis")
                .and_then(Value::as_i64)
                .ok_or_else(|| corrupt("tombstone missing [delete_date_in_millis]"))?;
            graveyard = graveyard.with_tombstone(
                Index::new(get_str(index, "index_name")?, get_str(index, "index_uuid")?),
                millis,
            );
        }
    }
    Ok(graveyard)
}

fn immutable_state_from_doc(name: &str, value: &Value) -> Result<ImmutableStateMetadata> {
    let map = as_object(value, "immutable state")?;
    let mut state = ImmutableStateMetadata::new(
        name,
        map.get("version")
            .and_then(Value::as_i64)
            .ok_or_else(|| corrupt("immutable state missing [version]"))?,
    );
    if let Some(handlers) = map.get("handlers") {
        for (handler_name, handler_doc) in as_object(handlers, "handlers")? {
            let handler_doc = as_object(handler_doc, "handler")?;
            let keys = handler_doc
                .get("keys")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            state = state.with_handler(ImmutableStateHandlerMetadata {
                name: handler_name.clone(),
                keys,
            });
        }
    }
    Ok(state)
}

// ============================================================================
// Tests
// ============================================================================
