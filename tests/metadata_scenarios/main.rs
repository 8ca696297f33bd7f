//! End-to-end scenarios over the public facade

mod properties;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use clustermeta::{
    from_gateway_document, to_document, AliasMetadata, ContextMode, DataStream, Diff, Diffable,
    Entry, EntryState, Index, IndexId, IndexMetadata, MappingMetadata, Metadata, MetadataDiff,
    Settings, ShardId, ShardSnapshotStatus, ShardState, Snapshot, SnapshotId, SnapshotsInProgress,
    TransportVersion, WireReadable, WireReader, WireWritable, WireWriter,
};

fn index_settings(shards: u32, replicas: u32) -> Settings {
    let mut b = Settings::builder();
    b.put_u32("index.number_of_shards", shards)
        .put_u32("index.number_of_replicas", replicas);
    b.build()
}

fn index_with_mapping(name: &str, mapping: serde_json::Value) -> IndexMetadata {
    IndexMetadata::builder(name)
        .uuid(format!("{}-uuid", name))
        .settings(index_settings(1, 0))
        .mapping(Arc::new(MappingMetadata::new(mapping)))
        .build()
        .unwrap()
}

// Scenario 1: identical mapping bodies put under two indices intern to a
// single pooled instance shared by identity.
#[test]
fn dedup_on_put() {
    let body = serde_json::json!({"properties": {"f": {"type": "keyword"}}});
    let mut builder = Metadata::builder();
    builder.put(index_with_mapping("a", body.clone()), false).unwrap();
    builder.put(index_with_mapping("b", body), false).unwrap();
    let m = builder.build().unwrap();

    assert_eq!(m.mappings_by_hash().len(), 1);
    let a = m.index("a").unwrap().mapping().unwrap();
    let b = m.index("b").unwrap().mapping().unwrap();
    assert_eq!(a.hash(), b.hash());
    assert!(Arc::ptr_eq(a, b));
}

// Scenario 2: rollover of `orders` at generation 5 on 2024-01-02 produces
// `.ds-orders-2024.01.02-000006`, and the old write index moves to the
// penultimate position.
#[test]
fn rollover_naming() {
    let t = 1_704_153_600_000; // 2024-01-02T00:00:00Z
    let stream = DataStream::new(
        "orders",
        vec![Index::new(".ds-orders-2024.01.01-000005", "old-uuid")],
        5,
    )
    .unwrap();

    let rolled = stream.rollover(|_| false, "U", t).unwrap();
    assert_eq!(rolled.generation(), 6);
    assert_eq!(rolled.write_index().name(), ".ds-orders-2024.01.02-000006");
    assert_eq!(rolled.write_index().uuid(), "U");
    let names: Vec<&str> = rolled.indices().iter().map(|i| i.name()).collect();
    assert_eq!(
        names,
        vec![".ds-orders-2024.01.01-000005", ".ds-orders-2024.01.02-000006"]
    );
}

// A rollover that collides with existing names keeps incrementing the
// generation until a free name is found.
#[test]
fn rollover_retries_past_collisions() {
    let t = 1_704_153_600_000;
    let stream = DataStream::new(
        "orders",
        vec![Index::new(".ds-orders-2024.01.01-000005", "old-uuid")],
        5,
    )
    .unwrap();
    let taken: HashSet<&str> = [
        ".ds-orders-2024.01.02-000006",
        ".ds-orders-2024.01.02-000007",
    ]
    .into_iter()
    .collect();

    let rolled = stream
        .rollover(|name| taken.contains(name), "U", t)
        .unwrap();
    assert_eq!(rolled.generation(), 8);
    assert_eq!(rolled.write_index().name(), ".ds-orders-2024.01.02-000008");
}

// Scenario 3: an index and a data stream sharing the name `orders` fail the
// build with a message naming the conflict.
#[test]
fn name_collision_build_fails() {
    let mut builder = Metadata::builder();
    builder
        .put(
            IndexMetadata::builder("orders")
                .uuid("orders-uuid")
                .settings(index_settings(1, 0))
                .build()
                .unwrap(),
            false,
        )
        .unwrap();
    builder
        .put(
            IndexMetadata::builder(".ds-orders-2024.01.01-000001")
                .uuid("backing-uuid")
                .settings(index_settings(1, 0))
                .build()
                .unwrap(),
            false,
        )
        .unwrap();
    builder.put_data_stream(
        DataStream::new(
            "orders",
            vec![Index::new(".ds-orders-2024.01.01-000001", "backing-uuid")],
            1,
        )
        .unwrap(),
    );

    let err = builder.build().unwrap_err();
    assert!(
        err.to_string()
            .contains("data stream [orders] conflicts with index"),
        "unexpected message: {err}"
    );
}

// Scenario 4: aborting an entry with INIT/WAITING/QUEUED shards aborts the
// assigned shards, leaves the queued one queued, and an all-queued entry
// aborts to nothing.
#[test]
fn abort_in_flight_snapshot_with_mixed_shard_states() {
    let shard = |n: u32| ShardId::new(Index::new("idx", "idx-uuid"), n);
    let mut shards = BTreeMap::new();
    shards.insert(shard(1), ShardSnapshotStatus::init("N1", Some("G".to_string())));
    shards.insert(shard(2), ShardSnapshotStatus::waiting("N2", Some("G".to_string())));
    shards.insert(shard(3), ShardSnapshotStatus::queued());
    let entry = Entry::started(
        Snapshot::new("repo", SnapshotId::new("snap", "snap-uuid")),
        true,
        false,
        vec![IndexId::new("idx", "idx-id")],
        vec![],
        vec![],
        0,
        1,
        shards,
        None,
        TransportVersion::CURRENT,
    );

    let aborted = entry.abort().expect("mixed states abort to an entry");
    assert_eq!(aborted.state(), EntryState::Aborted);
    assert_eq!(aborted.failure(), Some("Snapshot was aborted by deletion"));
    assert_eq!(aborted.shards()[&shard(1)].state(), ShardState::Aborted);
    assert_eq!(aborted.shards()[&shard(2)].state(), ShardState::Aborted);
    assert_eq!(aborted.shards()[&shard(3)].state(), ShardState::Queued);

    let mut all_queued = BTreeMap::new();
    all_queued.insert(shard(1), ShardSnapshotStatus::queued());
    let entry = Entry::started(
        Snapshot::new("repo", SnapshotId::new("snap2", "snap2-uuid")),
        true,
        false,
        vec![],
        vec![],
        vec![],
        0,
        1,
        all_queued,
        None,
        TransportVersion::CURRENT,
    );
    assert!(entry.abort().is_none());
}

// Scenario 5: diff across an index replacement patches the follower to the
// exact successor, purges the departed mapping, and keeps the unchanged
// mapping identity-shared with the predecessor.
#[test]
fn diff_round_trip_across_replacement() {
    let mut builder = Metadata::builder();
    builder
        .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
        .unwrap();
    builder
        .put(index_with_mapping("b", serde_json::json!({"b": 1})), false)
        .unwrap();
    builder
        .put(index_with_mapping("c", serde_json::json!({"c": 1})), false)
        .unwrap();
    let prev = builder.build().unwrap();

    let mut builder = prev.builder_from();
    let b_replacement = IndexMetadata::builder_from(prev.index("b").unwrap())
        .mapping(Arc::new(MappingMetadata::new(serde_json::json!({"b": 2}))))
        .build()
        .unwrap();
    builder.put(b_replacement, true).unwrap();
    builder.remove("c");
    builder
        .put(index_with_mapping("d", serde_json::json!({"d": 1})), false)
        .unwrap();
    builder.with_incremented_version();
    let curr = builder.build().unwrap();

    let diff = curr.diff_from(&prev);
    let applied = diff.apply_to(&prev).unwrap();
    assert_eq!(applied, curr);

    let hashes: HashSet<_> = applied.mappings_by_hash().hashes().copied().collect();
    let expected: HashSet<_> = ["a", "b", "d"]
        .iter()
        .map(|n| applied.index(n).unwrap().mapping().unwrap().hash())
        .collect();
    assert_eq!(hashes, expected);
    assert!(!hashes.contains(&MappingMetadata::new(serde_json::json!({"c": 1})).hash()));

    assert!(Arc::ptr_eq(
        applied.index("a").unwrap().mapping().unwrap(),
        prev.index("a").unwrap().mapping().unwrap()
    ));
}

// The diff survives the wire.
#[test]
fn diff_wire_round_trip() {
    let mut builder = Metadata::builder();
    builder
        .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
        .unwrap();
    let prev = builder.build().unwrap();

    let mut builder = prev.builder_from();
    builder
        .put(index_with_mapping("b", serde_json::json!({"b": 1})), false)
        .unwrap();
    builder.with_incremented_version();
    let curr = builder.build().unwrap();

    let diff = curr.diff_from(&prev);
    let mut writer = WireWriter::new(Vec::new(), TransportVersion::CURRENT);
    diff.write_to(&mut writer).unwrap();
    let bytes = writer.into_inner();

    let mut reader = WireReader::new(bytes.as_slice(), TransportVersion::CURRENT);
    let decoded = MetadataDiff::read_from(&mut reader).unwrap();
    assert_eq!(decoded.apply_to(&prev).unwrap(), curr);
}

// Scenario 6: clone entries survive a same-version round trip; a pre-clone
// peer decodes everything up to the clone cutoff and sees no source and no
// clones.
#[test]
fn snapshot_entry_version_compatibility() {
    let clone = Entry::clone_entry(
        Snapshot::new("repo", SnapshotId::new("clone-snap", "clone-uuid")),
        SnapshotId::new("source-snap", "source-uuid"),
        vec![IndexId::new("idx", "idx-id")],
        7,
        3,
        TransportVersion::CURRENT,
    );
    let mut writer = WireWriter::new(Vec::new(), TransportVersion::CURRENT);
    clone.write_to(&mut writer).unwrap();
    let bytes = writer.into_inner();
    let mut reader = WireReader::new(bytes.as_slice(), TransportVersion::CURRENT);
    let decoded = Entry::read_from(&mut reader).unwrap();
    assert_eq!(decoded, clone);

    let mut shards = BTreeMap::new();
    shards.insert(
        ShardId::new(Index::new("idx", "idx-uuid"), 0),
        ShardSnapshotStatus::init("node-1", None),
    );
    let backup = Entry::started(
        Snapshot::new("repo", SnapshotId::new("snap", "snap-uuid")),
        true,
        false,
        vec![IndexId::new("idx", "idx-id")],
        vec!["stream".to_string()],
        vec![],
        11,
        5,
        shards,
        None,
        TransportVersion::CURRENT,
    );
    let pre_clone = TransportVersion::V_CUSTOM_ROUTING;
    let mut writer = WireWriter::new(Vec::new(), pre_clone);
    backup.write_to(&mut writer).unwrap();
    let bytes = writer.into_inner();
    let mut reader = WireReader::new(bytes.as_slice(), pre_clone);
    let decoded = Entry::read_from(&mut reader).unwrap();

    assert_eq!(decoded.snapshot(), backup.snapshot());
    assert_eq!(decoded.shards(), backup.shards());
    assert_eq!(decoded.data_streams(), backup.data_streams());
    assert_eq!(decoded.state(), backup.state());
    assert_eq!(decoded.source(), None);
    assert!(decoded.clones().is_empty());
}

// A data stream with a single backing index refuses to lose it.
#[test]
fn single_backing_index_cannot_be_removed() {
    let stream = DataStream::new(
        "orders",
        vec![Index::new(".ds-orders-2024.01.01-000001", "u")],
        1,
    )
    .unwrap();
    let err = stream
        .remove_backing_index(".ds-orders-2024.01.01-000001")
        .unwrap_err();
    assert!(err.to_string().contains("write index"));
}

// Full metadata wire round trip at the current version.
#[test]
fn metadata_wire_round_trip() {
    let mut builder = Metadata::builder();
    builder
        .cluster_uuid("wire-uuid")
        .cluster_uuid_committed(true)
        .version(5);
    builder
        .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
        .unwrap();
    let aliased = IndexMetadata::builder("b")
        .uuid("b-uuid")
        .settings(index_settings(2, 1))
        .put_alias(AliasMetadata::new("al"))
        .build()
        .unwrap();
    builder.put(aliased, false).unwrap();
    let m = builder.build().unwrap();

    let mut writer = WireWriter::new(Vec::new(), TransportVersion::CURRENT);
    m.write_to(&mut writer).unwrap();
    let bytes = writer.into_inner();
    let mut reader = WireReader::new(bytes.as_slice(), TransportVersion::CURRENT);
    let decoded = Metadata::read_from(&mut reader).unwrap();
    assert_eq!(decoded, m);
}

// GATEWAY document round trip through the persistence layer.
#[test]
fn gateway_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = Metadata::builder();
    builder.cluster_uuid("disk-uuid").version(4);
    builder
        .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
        .unwrap();
    let m = builder.build().unwrap();

    clustermeta::write_global_state(dir.path(), &m).unwrap();
    let loaded = clustermeta::read_global_state(dir.path()).unwrap().unwrap();
    assert_eq!(loaded, m);
}

// Gateway document round trip without touching disk.
#[test]
fn gateway_document_round_trip() {
    let mut builder = Metadata::builder();
    builder.cluster_uuid("doc-uuid").version(2);
    builder
        .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
        .unwrap();
    let m = builder.build().unwrap();

    let doc = to_document(&m, ContextMode::Gateway);
    assert_eq!(from_gateway_document(&doc).unwrap(), m);
}

// An untouched builder reproduces its source value.
#[test]
fn build_of_unchanged_builder_is_identity() {
    let mut builder = Metadata::builder();
    builder
        .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
        .unwrap();
    let m = builder.build().unwrap();

    let rebuilt = m.builder_from().build().unwrap();
    assert_eq!(rebuilt, m);
    // The mapping pool rides along untouched
    assert_eq!(rebuilt.mappings_by_hash(), m.mappings_by_hash());
}

// Snapshots ride the metadata as a custom and respect the per-repository
// ordering invariant end to end.
#[test]
fn snapshots_in_progress_attached_to_metadata() {
    let mut shards = BTreeMap::new();
    shards.insert(
        ShardId::new(Index::new("idx", "idx-uuid"), 0),
        ShardSnapshotStatus::init("node-1", None),
    );
    let entry = Entry::started(
        Snapshot::new("repo", SnapshotId::new("snap", "snap-uuid")),
        false,
        false,
        vec![IndexId::new("idx", "idx-id")],
        vec![],
        vec![],
        0,
        1,
        shards,
        None,
        TransportVersion::CURRENT,
    );
    let sip = SnapshotsInProgress::new(vec![entry]).unwrap();

    let mut builder = Metadata::builder();
    builder.snapshots_in_progress(sip.clone());
    let m = builder.build().unwrap();
    assert_eq!(m.snapshots_in_progress(), sip);

    let mut writer = WireWriter::new(Vec::new(), TransportVersion::CURRENT);
    m.write_to(&mut writer).unwrap();
    let bytes = writer.into_inner();
    let mut reader = WireReader::new(bytes.as_slice(), TransportVersion::CURRENT);
    let decoded = Metadata::read_from(&mut reader).unwrap();
    assert_eq!(decoded.snapshots_in_progress(), sip);
}
