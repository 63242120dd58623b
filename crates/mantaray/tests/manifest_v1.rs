//! End-to-end suite for v1.0 manifests: trie algebra, wire round trips,
//! obfuscation, and incremental persistence through in-memory storage.

use mantaray::node::v1_0::{self, Node, PREFIX_CEILING};
use mantaray::node::{ForkAttributes, KeyGenerator};
use mantaray::{MantarayError, MemoryStorage, Metadata, ObfuscationKey, Reference};
use serde_json::json;

fn reference(byte: u8) -> Reference {
    Reference::try_from(vec![byte; 32]).unwrap()
}

fn metadata(key: &str, value: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(key.into(), json!(value));
    metadata
}

/// Walk the whole tree checking the radix-map invariants
fn assert_radix_invariants(node: &Node) {
    for (key, fork) in node.forks() {
        assert_eq!(fork.prefix[0], *key, "fork prefix must start with its key");
        assert!(!fork.prefix.is_empty());
        assert!(fork.prefix.len() <= PREFIX_CEILING);
        assert_radix_invariants(&fork.node);
    }
}

fn assert_subtree_clean(node: &Node) {
    assert!(!node.is_dirty(), "saved subtree must be clean");
    for fork in node.forks().values() {
        assert_subtree_clean(&fork.node);
    }
}

#[test]
fn single_entry_round_trip() {
    let entry = Reference::try_from(
        hex::decode("7d00112233445566778899aabbccddeeff0123456789abcdef0123456789ab57")
            .unwrap(),
    )
    .unwrap();

    let mut node = Node::new(ObfuscationKey::ZERO);
    node.set_entry(Some(entry.clone()));

    let reloaded = Node::deserialize(&node.serialize().unwrap()).unwrap();
    assert_eq!(reloaded.entry(), Some(&entry));
    assert!(reloaded.forks().is_empty());
    v1_0::equal_nodes(&node, &reloaded).unwrap();
}

#[test]
fn three_fork_split() {
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(b"path1/valami/elso", ForkAttributes::with_entry(reference(1)), None)
        .unwrap();
    node.add_fork(
        b"path1/valami/masodik",
        ForkAttributes::with_entry(reference(2)),
        None,
    )
    .unwrap();
    node.add_fork(
        b"path1/valami/masodik.ext",
        ForkAttributes::with_entry(reference(3)),
        None,
    )
    .unwrap();

    // one root fork under 'p', carrying the shared prefix
    let keys: Vec<u8> = node.forks().keys().copied().collect();
    assert_eq!(keys, [0x70]);
    let mid = &node.forks()[&0x70];
    assert_eq!(mid.prefix, b"path1/valami/");

    // the shared-prefix node branches on 'e' and 'm'
    let mid_keys: Vec<u8> = mid.node.forks().keys().copied().collect();
    assert_eq!(mid_keys, [b'e', b'm']);

    // the 'm' subtree forks on '.'
    let masodik = &mid.node.forks()[&b'm'];
    assert_eq!(masodik.prefix, b"masodik");
    assert_eq!(masodik.node.entry(), Some(&reference(2)));
    let ext_keys: Vec<u8> = masodik.node.forks().keys().copied().collect();
    assert_eq!(ext_keys, [b'.']);

    for (path, entry) in [
        (&b"path1/valami/elso"[..], reference(1)),
        (b"path1/valami/masodik", reference(2)),
        (b"path1/valami/masodik.ext", reference(3)),
    ] {
        assert_eq!(node.fork_at_path(path).unwrap().node.entry(), Some(&entry));
    }
    assert_radix_invariants(&node);
}

#[tokio::test]
async fn removal_changes_the_root_reference() {
    let storage = MemoryStorage::new();
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(b"path1/valami/elso", ForkAttributes::with_entry(reference(1)), None)
        .unwrap();
    node.add_fork(
        b"path1/valami/masodik",
        ForkAttributes::with_entry(reference(2)),
        None,
    )
    .unwrap();
    node.add_fork(
        b"path1/valami/masodik.ext",
        ForkAttributes::with_entry(reference(3)),
        None,
    )
    .unwrap();
    let before = node.save(&storage).await.unwrap();

    node.remove_path(b"path1/valami/masodik").unwrap();

    // the whole 'm' subtree is gone, only 'e' remains
    let mid = &node.forks()[&0x70].node;
    let mid_keys: Vec<u8> = mid.forks().keys().copied().collect();
    assert_eq!(mid_keys, [b'e']);
    assert!(matches!(
        node.fork_at_path(b"path1/valami/masodik.ext"),
        Err(MantarayError::NotFound { .. })
    ));

    let after = node.save(&storage).await.unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn continuous_node_chains_an_overlong_path() {
    let storage = MemoryStorage::new();
    let path: Vec<u8> = (1..=66u8).collect();

    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(&path, ForkAttributes::with_entry(reference(9)), None)
        .unwrap();

    // 66 = 31 + 31 + 4 across two continuous links
    let first = &node.forks()[&path[0]];
    assert_eq!(first.prefix, path[..31]);
    assert!(first.node.is_continuous());
    assert_eq!(first.node.forks().len(), 1);
    assert!(first.node.entry().is_none());

    let second = &first.node.forks()[&path[31]];
    assert_eq!(second.prefix, path[31..62]);
    assert!(second.node.is_continuous());
    assert_eq!(second.node.forks().len(), 1);

    let leaf = &second.node.forks()[&path[62]];
    assert_eq!(leaf.prefix, path[62..]);
    assert!(!leaf.node.is_continuous());
    assert_eq!(leaf.node.entry(), Some(&reference(9)));

    assert_eq!(node.fork_at_path(&path).unwrap().node.entry(), Some(&reference(9)));

    // on the wire the overflowing record advertises prefixLength = 32
    node.save(&storage).await.unwrap();
    let data = node.serialize().unwrap();
    assert_eq!(data[96], 32);

    // and the whole chain survives a reload
    let root_ref = node.content_address().unwrap().clone();
    let mut reloaded = Node::new(ObfuscationKey::ZERO);
    reloaded.load(&storage, &root_ref).await.unwrap();
    reloaded.load_all(&storage).await.unwrap();
    v1_0::equal_nodes(&node, &reloaded).unwrap();
}

#[test]
fn fork_metadata_overflows_its_slot() {
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.set_fork_metadata_segment_size(1).unwrap();

    let result = node.add_fork(
        b"entry",
        ForkAttributes {
            entry: Some(reference(1)),
            node_metadata: None,
            fork_metadata: Some(metadata("k", &"x".repeat(60))),
        },
        None,
    );
    assert!(matches!(
        result,
        Err(MantarayError::MetadataOverflow { capacity: 32, .. })
    ));
    assert!(node.forks().is_empty(), "failed insert must not publish state");
}

#[test]
fn obfuscation_key_leads_the_payload() {
    let key_bytes = [0xc3u8; 32];

    let mut plain = Node::new(ObfuscationKey::ZERO);
    plain.set_entry(Some(reference(0x11)));
    plain.set_metadata(Some(metadata("name", "index.html")));
    let plain_bytes = plain.serialize().unwrap();

    let mut obfuscated = plain.clone();
    obfuscated.set_obfuscation_key(ObfuscationKey::from(key_bytes));
    let obfuscated_bytes = obfuscated.serialize().unwrap();

    assert_eq!(plain_bytes.len(), obfuscated_bytes.len());
    assert_eq!(&obfuscated_bytes[..32], &key_bytes);
    for i in 32..plain_bytes.len() {
        assert_eq!(
            obfuscated_bytes[i] ^ key_bytes[(i - 32) % 32],
            plain_bytes[i],
            "byte {i} must XOR back to the plain payload"
        );
    }
}

#[tokio::test]
async fn full_round_trip_through_storage() {
    let storage = MemoryStorage::new();
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(
        b"docs/readme.md",
        ForkAttributes {
            entry: Some(reference(1)),
            node_metadata: Some(metadata("mime", "text/markdown")),
            fork_metadata: Some(metadata("mode", "0644")),
        },
        None,
    )
    .unwrap();
    node.add_fork(b"docs/license", ForkAttributes::with_entry(reference(2)), None)
        .unwrap();
    node.add_fork(b"src/lib.rs", ForkAttributes::with_entry(reference(3)), None)
        .unwrap();

    let root_ref = node.save(&storage).await.unwrap();

    let mut reloaded = Node::new(ObfuscationKey::ZERO);
    reloaded.load(&storage, &root_ref).await.unwrap();
    reloaded.load_all(&storage).await.unwrap();

    v1_0::equal_nodes(&node, &reloaded).unwrap();
    assert_eq!(
        reloaded
            .fork_at_path(b"docs/readme.md")
            .unwrap()
            .node
            .metadata(),
        Some(&metadata("mime", "text/markdown"))
    );
    assert_eq!(
        reloaded
            .fork_at_path(b"docs/readme.md")
            .unwrap()
            .node
            .fork_metadata(),
        Some(&metadata("mode", "0644"))
    );
}

#[tokio::test]
async fn obfuscated_tree_round_trips() {
    let storage = MemoryStorage::new();
    let mut generate = || ObfuscationKey::from(rand::random::<[u8; 32]>());

    let mut node = Node::new(ObfuscationKey::from(rand::random::<[u8; 32]>()));
    for (path, byte) in [
        (&b"img/1.png"[..], 1u8),
        (b"img/2.png", 2),
        (b"index.html", 3),
    ] {
        node.add_fork(
            path,
            ForkAttributes::with_entry(reference(byte)),
            Some(&mut generate as &mut dyn KeyGenerator),
        )
        .unwrap();
    }

    let root_ref = node.save(&storage).await.unwrap();
    let mut reloaded = Node::new(ObfuscationKey::ZERO);
    reloaded.load(&storage, &root_ref).await.unwrap();
    reloaded.load_all(&storage).await.unwrap();

    v1_0::equal_nodes(&node, &reloaded).unwrap();
    assert_eq!(
        reloaded.obfuscation_key(),
        node.obfuscation_key(),
        "the root chunk leads with its own key"
    );
}

#[tokio::test]
async fn unchanged_tree_saves_nothing() {
    let storage = MemoryStorage::new();
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(b"a/x", ForkAttributes::with_entry(reference(1)), None)
        .unwrap();
    node.add_fork(b"a/y", ForkAttributes::with_entry(reference(2)), None)
        .unwrap();

    let first = node.save(&storage).await.unwrap();
    // root, the shared "a/" node, and two leaves
    assert_eq!(storage.writes(), 4);
    assert_subtree_clean(&node);

    let second = node.save(&storage).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(storage.writes(), 4, "a clean tree submits nothing");
}

#[tokio::test]
async fn mutating_one_leaf_rewrites_only_its_path() {
    let storage = MemoryStorage::new();
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(b"a/x", ForkAttributes::with_entry(reference(1)), None)
        .unwrap();
    node.add_fork(b"a/y", ForkAttributes::with_entry(reference(2)), None)
        .unwrap();
    node.save(&storage).await.unwrap();
    let y_before = node.fork_at_path(b"a/y").unwrap().node.content_address().cloned();

    node.add_fork(b"a/x", ForkAttributes::with_entry(reference(7)), None)
        .unwrap();
    assert!(node.is_dirty(), "every ancestor of a mutation goes dirty");

    let writes_before = storage.writes();
    node.save(&storage).await.unwrap();
    // leaf 'x', the shared "a/" node, and the root
    assert_eq!(storage.writes() - writes_before, 3);

    let y_after = node.fork_at_path(b"a/y").unwrap().node.content_address().cloned();
    assert_eq!(y_before, y_after, "the untouched sibling keeps its address");
}

#[tokio::test]
async fn save_rejects_a_node_without_payload() {
    let storage = MemoryStorage::new();
    let mut node = Node::new(ObfuscationKey::ZERO);
    let result = node.save(&storage).await;
    assert!(matches!(result, Err(MantarayError::DirtyWithoutPayload)));
    assert_eq!(storage.writes(), 0);
}

#[test]
fn removal_leaves_no_trace_of_the_path() {
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(b"keep/me", ForkAttributes::with_entry(reference(1)), None)
        .unwrap();
    node.add_fork(b"drop/me", ForkAttributes::with_entry(reference(2)), None)
        .unwrap();
    node.remove_path(b"drop/me").unwrap();

    assert!(matches!(
        node.fork_at_path(b"drop/me"),
        Err(MantarayError::NotFound { .. })
    ));
    assert_eq!(
        node.fork_at_path(b"keep/me").unwrap().node.entry(),
        Some(&reference(1))
    );
    assert_radix_invariants(&node);
}

#[test]
fn navigation_failure_modes() {
    let mut node = Node::new(ObfuscationKey::ZERO);
    node.add_fork(b"present", ForkAttributes::with_entry(reference(1)), None)
        .unwrap();

    assert!(matches!(node.fork_at_path(b""), Err(MantarayError::EmptyPath)));
    assert!(matches!(node.remove_path(b""), Err(MantarayError::EmptyPath)));
    assert!(matches!(
        node.fork_at_path(b"absent"),
        Err(MantarayError::NotFound { .. })
    ));
    assert!(matches!(
        node.fork_at_path(b"pre"),
        Err(MantarayError::NotFound { .. }),
    ));
    assert!(matches!(
        node.remove_path(b"presence"),
        Err(MantarayError::NotFound { .. })
    ));
}

#[test]
fn dense_insertion_keeps_radix_uniqueness() {
    let mut node = Node::new(ObfuscationKey::ZERO);
    let words = [
        &b"romane"[..],
        b"romanus",
        b"romulus",
        b"rubens",
        b"ruber",
        b"rubicon",
        b"rubicundus",
        b"r",
        b"ro",
    ];
    for (i, word) in words.iter().enumerate() {
        node.add_fork(word, ForkAttributes::with_entry(reference(i as u8 + 1)), None)
            .unwrap();
    }
    for (i, word) in words.iter().enumerate() {
        assert_eq!(
            node.fork_at_path(word).unwrap().node.entry(),
            Some(&reference(i as u8 + 1)),
            "word {}",
            String::from_utf8_lossy(word)
        );
    }
    assert_radix_invariants(&node);
}
