//! Property tests over generated catalogs

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use clustermeta::{
    AliasMetadata, Diff, Diffable, IndexMetadata, IndexState, MappingMetadata, Metadata, Settings,
    TransportVersion, WireReadable, WireReader, WireWritable, WireWriter,
};

#[derive(Debug, Clone)]
struct IndexCase {
    name_id: u8,
    shards: u32,
    replicas: u32,
    hidden: bool,
    closed: bool,
    mapping_id: Option<u8>,
    alias_id: Option<u8>,
}

fn index_case() -> impl Strategy<Value = IndexCase> {
    (
        0u8..6,
        1u32..4,
        0u32..3,
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(0u8..3),
        proptest::option::of(0u8..2),
    )
        .prop_map(
            |(name_id, shards, replicas, hidden, closed, mapping_id, alias_id)| IndexCase {
                name_id,
                shards,
                replicas,
                hidden,
                closed,
                mapping_id,
                alias_id,
            },
        )
}

fn mapping_body(id: u8) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        format!("field_{}", id),
        serde_json::json!({"type": "keyword"}),
    );
    serde_json::json!({ "properties": properties })
}

fn build_metadata(cases: &[IndexCase], version: u64) -> Metadata {
    let mut builder = Metadata::builder();
    builder.cluster_uuid("prop-uuid").version(version);
    for case in cases {
        let name = format!("index-{}", case.name_id);
        let mut settings = Settings::builder();
        settings
            .put_u32("index.number_of_shards", case.shards)
            .put_u32("index.number_of_replicas", case.replicas)
            .put_bool("index.hidden", case.hidden);
        let mut index = IndexMetadata::builder(&name)
            .uuid(format!("{}-uuid", name))
            .settings(settings.build())
            .state(if case.closed {
                IndexState::Closed
            } else {
                IndexState::Open
            });
        if let Some(mapping_id) = case.mapping_id {
            index = index.mapping(Arc::new(MappingMetadata::new(mapping_body(mapping_id))));
        }
        if let Some(alias_id) = case.alias_id {
            index = index.put_alias(AliasMetadata::new(format!("alias-{}", alias_id)));
        }
        builder
            .put(index.build().expect("generated index is valid"), false)
            .expect("put succeeds");
    }
    builder.build().expect("generated metadata is valid")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Index, alias, and data-stream names stay pairwise disjoint, and the
    // lookup resolves every index name to a concrete index.
    #[test]
    fn names_disjoint_and_resolvable(cases in proptest::collection::vec(index_case(), 0..8)) {
        let m = build_metadata(&cases, 1);
        for name in m.all_indices() {
            prop_assert!(!m.aliased_indices().contains_key(name));
            prop_assert!(!m.data_streams().contains_key(name));
            prop_assert!(m.indices_lookup()[name].is_concrete_index());
        }
    }

    // The precomputed name arrays partition correctly.
    #[test]
    fn name_arrays_partition(cases in proptest::collection::vec(index_case(), 0..8)) {
        let m = build_metadata(&cases, 1);
        let all: HashSet<&String> = m.all_indices().iter().collect();
        let visible: HashSet<&String> = m.visible_indices().iter().collect();
        let open: HashSet<&String> = m.all_open_indices().iter().collect();
        let closed: HashSet<&String> = m.all_closed_indices().iter().collect();

        prop_assert!(visible.is_subset(&all));
        prop_assert!(open.is_disjoint(&closed));
        prop_assert_eq!(open.len() + closed.len(), all.len());
        prop_assert!(m.total_open_index_shards() <= m.total_number_of_shards());
    }

    // Every pooled mapping hash is referenced by a live index, and every
    // live mapping is pooled.
    #[test]
    fn pool_is_exactly_live_mappings(cases in proptest::collection::vec(index_case(), 0..8)) {
        let m = build_metadata(&cases, 1);
        let live: HashSet<_> = m
            .indices()
            .values()
            .filter_map(|i| i.mapping().map(|mp| mp.hash()))
            .collect();
        let pooled: HashSet<_> = m.mappings_by_hash().hashes().copied().collect();
        prop_assert_eq!(pooled, live);
    }

    // Wire round trip at the current version is lossless.
    #[test]
    fn wire_round_trip(cases in proptest::collection::vec(index_case(), 0..8)) {
        let m = build_metadata(&cases, 3);
        let mut writer = WireWriter::new(Vec::new(), TransportVersion::CURRENT);
        m.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader = WireReader::new(bytes.as_slice(), TransportVersion::CURRENT);
        let decoded = Metadata::read_from(&mut reader).unwrap();
        prop_assert_eq!(decoded, m);
    }

    // prev.apply(diff(prev, curr)) == curr for arbitrary pairs, and the
    // no-change law holds.
    #[test]
    fn diff_round_trip(
        prev_cases in proptest::collection::vec(index_case(), 0..8),
        curr_cases in proptest::collection::vec(index_case(), 0..8),
    ) {
        let prev = build_metadata(&prev_cases, 1);
        let curr = build_metadata(&curr_cases, 2);

        let diff = curr.diff_from(&prev);
        prop_assert_eq!(diff.apply_to(&prev).unwrap(), curr.clone());

        let self_diff = curr.diff_from(&curr.clone());
        prop_assert!(!self_diff.has_changes());
        prop_assert_eq!(self_diff.apply_to(&curr).unwrap(), curr);
    }

    // Re-building without mutations is the identity.
    #[test]
    fn rebuild_identity(cases in proptest::collection::vec(index_case(), 0..8)) {
        let m = build_metadata(&cases, 1);
        prop_assert_eq!(m.builder_from().build().unwrap(), m);
    }
}
