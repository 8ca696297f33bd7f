//! Index templates
//!
//! Templates apply partial settings / mappings / aliases to newly created
//! indices whose names match the template's glob patterns. Two generations
//! coexist:
//!
//! - [`IndexTemplateMetadata`]: the legacy form, ordered by an integer
//!   `order` with inline settings/mappings/aliases
//! - [`ComposableIndexTemplate`]: the current form, composed from named
//!   [`ComponentTemplate`]s plus an inline [`Template`] block, ordered by
//!   `priority`, optionally declaring that matching names create data
//!   streams
//!
//! ## Legacy mapping wrapper
//!
//! Template mappings serialize in a legacy wrapper where the body nests one
//! level under a dummy type key: `{"mappings": {"_doc": { ... }}}`. Reading
//! removes the nesting (`reduce_mappings`). GATEWAY documents emit the
//! wrapped form; API documents emit the reduced form. Both paths are part
//! of the compatibility contract.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::simple_diffable;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

use crate::index::AliasMetadata;
use crate::settings::Settings;

/// Dummy type key used by the legacy mapping wrapper
pub const LEGACY_MAPPING_TYPE: &str = "_doc";

/// Nest a mapping body under the legacy dummy type key
pub fn wrap_mappings_legacy(body: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({ LEGACY_MAPPING_TYPE: body })
}

/// Remove the legacy dummy-type nesting if present
pub fn reduce_mappings(wrapped: &serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(map) = wrapped {
        if map.len() == 1 {
            if let Some(inner) = map.get(LEGACY_MAPPING_TYPE) {
                return inner.clone();
            }
        }
    }
    wrapped.clone()
}

fn write_json<W: Write>(out: &mut WireWriter<W>, value: &serde_json::Value) -> Result<()> {
    let bytes = serde_json::to_vec(value).expect("JSON value serializes");
    out.write_bytes(&bytes)
}

fn read_json<R: Read>(input: &mut WireReader<R>) -> Result<serde_json::Value> {
    let bytes = input.read_bytes()?;
    serde_json::from_slice(&bytes)
        .map_err(|e| MetadataError::CorruptMetadata(format!("invalid JSON payload: {}", e)))
}

// ============================================================================
// Legacy templates
// ============================================================================

/// Legacy index template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexTemplateMetadata {
    /// Template name
    pub name: String,
    /// Application order; higher order wins on conflicts
    pub order: i32,
    /// Optional user-managed version
    pub version: Option<i64>,
    /// Name globs this template applies to
    pub patterns: Vec<String>,
    /// Partial settings
    pub settings: Settings,
    /// Partial mapping body (stored reduced, without the legacy wrapper)
    pub mappings: Option<serde_json::Value>,
    /// Aliases created on matching indices
    pub aliases: BTreeMap<String, AliasMetadata>,
}

simple_diffable!(IndexTemplateMetadata);

impl IndexTemplateMetadata {
    /// A template with the given name and patterns, nothing else
    pub fn new(name: impl Into<String>, patterns: Vec<String>) -> IndexTemplateMetadata {
        IndexTemplateMetadata {
            name: name.into(),
            order: 0,
            version: None,
            patterns,
            settings: Settings::empty(),
            mappings: None,
            aliases: BTreeMap::new(),
        }
    }

    /// Whether an index name matches any pattern
    pub fn matches(&self, index_name: &str) -> bool {
        self.patterns.iter().any(|p| glob_match(p, index_name))
    }
}

impl WireWritable for IndexTemplateMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        out.write_vint(self.order as u32)?;
        out.write_optional(self.version.as_ref(), |out, v| out.write_i64(*v))?;
        out.write_string_collection(&self.patterns)?;
        self.settings.write_to(out)?;
        out.write_optional(self.mappings.as_ref(), write_json)?;
        out.write_map(&self.aliases, |out, alias| alias.write_to(out))
    }
}

impl WireReadable for IndexTemplateMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let order = input.read_vint()? as i32;
        let version = input.read_optional(|input| input.read_i64())?;
        let patterns = input.read_string_collection()?;
        let settings = Settings::read_from(input)?;
        let mappings = input.read_optional(read_json)?;
        let aliases = input.read_map(AliasMetadata::read_from)?;
        Ok(IndexTemplateMetadata {
            name,
            order,
            version,
            patterns,
            settings,
            mappings,
            aliases,
        })
    }
}

// ============================================================================
// Composable templates
// ============================================================================

/// The inline settings/mappings/aliases block shared by composable and
/// component templates
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    /// Partial settings
    pub settings: Option<Settings>,
    /// Partial mapping body (reduced form)
    pub mappings: Option<serde_json::Value>,
    /// Aliases created on matching indices
    pub aliases: Option<BTreeMap<String, AliasMetadata>>,
}

impl WireWritable for Template {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_optional(self.settings.as_ref(), |out, s| s.write_to(out))?;
        out.write_optional(self.mappings.as_ref(), write_json)?;
        out.write_optional(self.aliases.as_ref(), |out, aliases| {
            out.write_map(aliases, |out, alias| alias.write_to(out))
        })
    }
}

impl WireReadable for Template {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let settings = input.read_optional(Settings::read_from)?;
        let mappings = input.read_optional(read_json)?;
        let aliases = input.read_optional(|input| input.read_map(AliasMetadata::read_from))?;
        Ok(Template {
            settings,
            mappings,
            aliases,
        })
    }
}

/// A named, reusable template fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTemplate {
    /// The fragment body
    pub template: Template,
    /// Optional user-managed version
    pub version: Option<i64>,
    /// Optional opaque user metadata
    pub metadata: Option<serde_json::Value>,
}

simple_diffable!(ComponentTemplate);

impl WireWritable for ComponentTemplate {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        self.template.write_to(out)?;
        out.write_optional(self.version.as_ref(), |out, v| out.write_i64(*v))?;
        out.write_optional(self.metadata.as_ref(), write_json)
    }
}

impl WireReadable for ComponentTemplate {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let template = Template::read_from(input)?;
        let version = input.read_optional(|input| input.read_i64())?;
        let metadata = input.read_optional(read_json)?;
        Ok(ComponentTemplate {
            template,
            version,
            metadata,
        })
    }
}

/// Data-stream block on a composable template
///
/// Its presence declares that indices created through this template are
/// data-stream write indices; the timestamp field is fixed by the
/// data-stream contract and not configurable here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataStreamTemplate {
    /// Create the stream hidden
    pub hidden: bool,
    /// Allow custom routing on stream documents
    pub allow_custom_routing: bool,
}

impl WireWritable for DataStreamTemplate {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_bool(self.hidden)?;
        out.write_bool(self.allow_custom_routing)
    }
}

impl WireReadable for DataStreamTemplate {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let hidden = input.read_bool()?;
        let allow_custom_routing = input.read_bool()?;
        Ok(DataStreamTemplate {
            hidden,
            allow_custom_routing,
        })
    }
}

/// Current-generation index template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposableIndexTemplate {
    /// Name globs this template applies to
    pub index_patterns: Vec<String>,
    /// Inline template block
    pub template: Option<Template>,
    /// Names of component templates composed under the inline block
    pub component_templates: Vec<String>,
    /// Priority; the highest-priority matching template wins
    pub priority: Option<i64>,
    /// Optional user-managed version
    pub version: Option<i64>,
    /// Optional opaque user metadata
    pub metadata: Option<serde_json::Value>,
    /// Present when matching names create data streams
    pub data_stream_template: Option<DataStreamTemplate>,
}

simple_diffable!(ComposableIndexTemplate);

impl ComposableIndexTemplate {
    /// A template with the given patterns, nothing else
    pub fn new(index_patterns: Vec<String>) -> ComposableIndexTemplate {
        ComposableIndexTemplate {
            index_patterns,
            template: None,
            component_templates: Vec::new(),
            priority: None,
            version: None,
            metadata: None,
            data_stream_template: None,
        }
    }

    /// Priority, defaulting to 0 when unset
    pub fn priority_or_zero(&self) -> i64 {
        self.priority.unwrap_or(0)
    }

    /// Whether an index or data-stream name matches any pattern
    pub fn matches(&self, name: &str) -> bool {
        self.index_patterns.iter().any(|p| glob_match(p, name))
    }
}

impl WireWritable for ComposableIndexTemplate {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string_collection(&self.index_patterns)?;
        out.write_optional(self.template.as_ref(), |out, t| t.write_to(out))?;
        out.write_string_collection(&self.component_templates)?;
        out.write_optional(self.priority.as_ref(), |out, v| out.write_i64(*v))?;
        out.write_optional(self.version.as_ref(), |out, v| out.write_i64(*v))?;
        out.write_optional(self.metadata.as_ref(), write_json)?;
        out.write_optional(self.data_stream_template.as_ref(), |out, d| d.write_to(out))
    }
}

impl WireReadable for ComposableIndexTemplate {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let index_patterns = input.read_string_collection()?;
        let template = input.read_optional(Template::read_from)?;
        let component_templates = input.read_string_collection()?;
        let priority = input.read_optional(|input| input.read_i64())?;
        let version = input.read_optional(|input| input.read_i64())?;
        let metadata = input.read_optional(read_json)?;
        let data_stream_template = input.read_optional(DataStreamTemplate::read_from)?;
        Ok(ComposableIndexTemplate {
            index_patterns,
            template,
            component_templates,
            priority,
            version,
            metadata,
            data_stream_template,
        })
    }
}

/// Match a name against a glob pattern (`*` wildcards only)
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn inner(pattern: &[u8], name: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], name) || (!name.is_empty() && inner(pattern, &name[1..]))
            }
            (Some(p), Some(n)) if p == n => inner(&pattern[1..], &name[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}

// ============================================================================
// Tests
// ============================================================================
