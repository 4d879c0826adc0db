// Archive persistence test
//
// Messages written to a sled-backed archive survive a reopen, come back in
// timestamp order, and keep their content ids.

use peerchat_core::protocol::ChatMessage;
use peerchat_core::store::{ContentId, MessageArchive};
use proptest::prelude::*;

fn message_at(content: &str, timestamp: u64) -> ChatMessage {
    let mut message = ChatMessage::new("peerA", "", content);
    message.timestamp = timestamp;
    message
}

#[tokio::test]
async fn test_archive_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive");

    let ids = {
        let archive = MessageArchive::open(&path).unwrap();
        let late = archive.store(&message_at("second", 2_000)).await.unwrap();
        let early = archive.store(&message_at("first", 1_000)).await.unwrap();
        assert_eq!(archive.len(), 2);
        vec![late, early]
    };

    let archive = MessageArchive::open(&path).unwrap();
    assert_eq!(archive.len(), 2);
    assert_eq!(archive.message_ids().unwrap(), ids);

    let conversation = archive.load_conversation().await.unwrap();
    let contents: Vec<&str> = conversation.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);

    let recent = archive.load_recent(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].content, "second");
}

#[tokio::test]
async fn test_duplicate_store_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive");
    let message = message_at("only once", 42);

    let first = MessageArchive::open(&path).unwrap().store(&message).await.unwrap();
    let archive = MessageArchive::open(&path).unwrap();
    let second = archive.store(&message).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.retrieve(&first).await.unwrap(), message);
}

proptest! {
    #[test]
    fn prop_content_id_parses_back(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let cid = ContentId::for_bytes(&bytes);
        let parsed: ContentId = cid.as_str().parse().unwrap();
        prop_assert_eq!(parsed, cid);
    }

    #[test]
    fn prop_content_id_rejects_short_digests(len in 0usize..32) {
        let encoded = format!("z{}", bs58::encode(vec![7u8; len]).into_string());
        prop_assert!(encoded.parse::<ContentId>().is_err());
    }
}
