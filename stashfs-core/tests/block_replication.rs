mod common;

use common::{GROUP, TestCluster};
use stashfs_core::contracts::CommitBlockArgs;
use stashfs_core::rpc::BlockRequest;
use stashfs_core::{
    CommandId, Consensus, ContractResult, ErrorKind, FileMeta, Key, StashError, StorageNode,
};
use tokio_test::{assert_err, assert_ok};

async fn commit(
    cluster: &TestCluster,
    file: &FileMeta,
    node_ids: Vec<u64>,
) -> Result<FileMeta, StashError> {
    let payload = serde_json::to_vec(&CommitBlockArgs {
        index: file.block_count(),
        file: file.key,
        node_ids,
        client_time: 42,
    })
    .unwrap();
    let reply = cluster
        .consensus
        .exec_command(GROUP, CommandId::CommitBlock, payload)
        .await
        .unwrap();
    ContractResult::decode(&reply).unwrap().into_file()
}

#[tokio::test]
async fn test_block_lands_on_every_stash_host() {
    let cluster = TestCluster::with_stashes(3, 1 << 30).await;
    let fs = cluster.client(1);
    fs.new_volume("docs", 5, 1024).await.unwrap();

    let mut stream = fs.open("/docs/a").await.unwrap();
    stream.write(b"hello").await.unwrap();
    stream.flush().await.unwrap();

    let meta = stream.meta().clone();
    assert_eq!(meta.blocks[0].hosts, vec![1, 2, 3]);
    for node in &cluster.nodes {
        let block = node
            .service
            .get_block(BlockRequest {
                group: GROUP,
                file: meta.key,
                index: 0,
            })
            .await
            .unwrap();
        assert_eq!(&block.data[..5], b"hello");
        assert_eq!(block.tail, 5);
    }
}

#[tokio::test]
async fn test_unreachable_host_is_left_out() {
    let cluster = TestCluster::with_stashes(3, 1 << 30).await;
    let fs = cluster.client(1);
    fs.new_volume("docs", 5, 1024).await.unwrap();
    cluster.set_offline(2, true);

    let mut stream = fs.open("/docs/a").await.unwrap();
    stream.write(b"abc").await.unwrap();
    stream.flush().await.unwrap();
    assert_eq!(stream.meta().blocks[0].hosts, vec![1, 3]);

    cluster.set_offline(2, false);
    let missing = cluster
        .node(2)
        .service
        .get_block(BlockRequest {
            group: GROUP,
            file: stream.meta().key,
            index: 0,
        })
        .await;
    assert!(matches!(missing, Err(StashError::NotFound(_))));
}

#[tokio::test]
async fn test_no_stash_hosts_is_placement_failure() {
    let cluster = TestCluster::start(3).await;
    let fs = cluster.client(1);
    fs.new_volume("docs", 5, 1024).await.unwrap();

    let mut stream = fs.open("/docs/a").await.unwrap();
    let err = stream.write(b"abc").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlacementFailure);
    assert!(err.is_retryable());
    assert_eq!(stream.meta().block_count(), 0);
}

#[tokio::test]
async fn test_commit_requires_confirmed_hosts() {
    let cluster = TestCluster::with_stashes(3, 1 << 30).await;
    let fs = cluster.client(1);
    fs.new_volume("docs", 5, 1024).await.unwrap();
    let file = fs.touch_file("/docs/a").await.unwrap();

    // Nothing confirmed yet.
    let err = assert_err!(commit(&cluster, &file, vec![1]).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let request = BlockRequest {
        group: GROUP,
        file: file.key,
        index: 0,
    };
    assert_ok!(cluster.node(1).service.create_block(request).await);

    // Host 2 never created the block.
    let err = assert_err!(commit(&cluster, &file, vec![1, 2]).await);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let updated = assert_ok!(commit(&cluster, &file, vec![1]).await);
    assert_eq!(updated.block_count(), 1);
    assert_eq!(updated.blocks[0].hosts, vec![1]);

    // Every replica of the metadata agrees.
    for node in &cluster.nodes {
        let stored = node
            .store
            .view(|txn| txn.file_meta(GROUP, &file.key))
            .unwrap()
            .unwrap();
        assert_eq!(stored, updated);
    }
}

#[tokio::test]
async fn test_create_block_keeps_existing_bytes() {
    let cluster = TestCluster::with_stashes(3, 1 << 30).await;
    let fs = cluster.client(1);
    fs.new_volume("docs", 5, 1024).await.unwrap();

    let mut stream = fs.open("/docs/a").await.unwrap();
    stream.write(b"keep me").await.unwrap();
    stream.flush().await.unwrap();

    let request = BlockRequest {
        group: GROUP,
        file: stream.meta().key,
        index: 0,
    };
    let node = &cluster.node(3).service;
    let result = node.create_block(request).await.unwrap();
    assert_eq!(result.remains, 1024 - 7);

    let block = node.get_block(request).await.unwrap();
    assert_eq!(&block.data[..7], b"keep me");

    node.delete_block(request).await.unwrap();
    assert!(matches!(
        node.delete_block(request).await,
        Err(StashError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_write_lock_between_clients() {
    let cluster = TestCluster::with_stashes(3, 1 << 30).await;
    let alice = cluster.client(1);
    let bob = cluster.client(2);
    alice.new_volume("docs", 5, 1024).await.unwrap();
    let file = alice.touch_file("/docs/shared").await.unwrap();

    alice.acquire_write_lock(file.key, None).await.unwrap();
    alice.acquire_write_lock(file.key, None).await.unwrap();
    let err = bob.acquire_write_lock(file.key, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    alice.release_write_lock(file.key).await.unwrap();
    bob.acquire_write_lock(file.key, None).await.unwrap();

    let err = alice.release_write_lock(Key::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() {
    let cluster = TestCluster::with_stashes(3, 1 << 30).await;
    let alice = cluster.client(1);
    let bob = cluster.client(2);
    alice.new_volume("docs", 5, 1024).await.unwrap();
    let file = alice.touch_file("/docs/shared").await.unwrap();

    // A lease already in the past.
    alice.acquire_write_lock(file.key, Some(1)).await.unwrap();
    bob.acquire_write_lock(file.key, None).await.unwrap();

    let lock = cluster
        .node(1)
        .store
        .view(|txn| txn.write_lock(GROUP, &file.key))
        .unwrap()
        .unwrap();
    assert_eq!(lock.owner, 2);
}
