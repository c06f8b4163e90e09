//! Failover tests for leader deactivation and recovery.
//!
//! These tests verify that the remaining peers elect a new leader, that a
//! reactivated leader steps down once it learns the newer term, and that
//! committed commands survive the change of leadership.


use std::time::Duration;
use test_harness::TestCluster;

use raft_peer::raft::RaftRole;

/// Test 1: Remaining peers elect a new leader after the leader goes dormant
#[tokio::test]
async fn test_new_leader_after_leader_deactivated() {
    let cluster = TestCluster::new(5, 52100).await;

    let initial_leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");
    let initial_term = cluster.current_term(initial_leader).await;

    cluster.deactivate_node(initial_leader).await;

    let new_leader = cluster
        .wait_for_new_leader(initial_leader, Duration::from_secs(5))
        .await
        .expect("New leader should be elected");

    assert_ne!(new_leader, initial_leader);
    assert!(
        cluster.current_term(new_leader).await > initial_term,
        "Term should increase after new election"
    );

    cluster.shutdown().await;
}

/// Test 2: Deactivation preserves leadership belief; reactivation demotes it
#[tokio::test]
async fn test_reactivated_leader_steps_down() {
    let cluster = TestCluster::new(5, 52110).await;

    let old_leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");
    let old_term = cluster.current_term(old_leader).await;

    cluster.deactivate_node(old_leader).await;

    let new_leader = cluster
        .wait_for_new_leader(old_leader, Duration::from_secs(5))
        .await
        .expect("New leader should be elected");

    // Frozen state: the dormant peer still believes it leads the old term
    assert_eq!(cluster.role(old_leader).await, RaftRole::Leader);
    assert_eq!(cluster.current_term(old_leader).await, old_term);

    cluster.activate_node(old_leader).await;

    let new_term = cluster.current_term(new_leader).await;
    let stepped_down = test_harness::wait_for(
        || async {
            cluster.role(old_leader).await == RaftRole::Follower
                && cluster.current_term(old_leader).await >= new_term
        },
        Duration::from_secs(3),
        Duration::from_millis(25),
    )
    .await;
    assert!(stepped_down, "Old leader should revert to follower");

    assert!(cluster.verify_log_matching().await);
    assert_eq!(cluster.count_leaders().await, 1);

    cluster.shutdown().await;
}

/// Test 3: Committed commands survive a change of leader
#[tokio::test]
async fn test_committed_commands_survive_failover() {
    let cluster = TestCluster::new(5, 52120).await;

    let first_leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");

    for i in 1..=3 {
        let status = cluster
            .submit_to(first_leader, &format!("before-{}", i))
            .await
            .expect("Leader accepts commands");
        assert_eq!(status.index, i);
    }
    assert!(
        cluster
            .wait_for_commit_on_active(3, Duration::from_secs(5))
            .await,
        "Initial commands should commit everywhere"
    );

    cluster.deactivate_node(first_leader).await;
    let second_leader = cluster
        .wait_for_new_leader(first_leader, Duration::from_secs(5))
        .await
        .expect("New leader should be elected");

    for i in 1..=2 {
        cluster
            .submit_to(second_leader, &format!("after-{}", i))
            .await
            .expect("New leader accepts commands");
    }
    assert!(
        cluster
            .wait_for_commit_on_active(5, Duration::from_secs(5))
            .await,
        "New commands should commit on the remaining peers"
    );

    cluster.activate_node(first_leader).await;
    assert!(
        cluster
            .wait_for_commit_on(&cluster.node_ids(), 5, Duration::from_secs(5))
            .await,
        "Reactivated peer should catch up"
    );

    let expected: Vec<&[u8]> = vec![b"before-1", b"before-2", b"before-3", b"after-1", b"after-2"];
    for id in cluster.node_ids() {
        for (i, command) in expected.iter().enumerate() {
            let index = i as u64 + 1;
            assert_eq!(
                cluster.get_node(id).raft_node.get_committed_cmd(index).await,
                Some(command.to_vec()),
                "Node {} disagrees at index {}",
                id,
                index
            );
        }
    }

    cluster.shutdown().await;
}

/// Test 4: Followers reject commands with a hint to the leader
#[tokio::test]
async fn test_follower_rejects_commands() {
    let cluster = TestCluster::new(3, 52130).await;

    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let follower = cluster
        .node_ids()
        .into_iter()
        .find(|&id| id != leader_id)
        .expect("Should have a follower");

    let err = cluster
        .submit_to(follower, "nope")
        .await
        .expect_err("Follower must reject commands");
    assert!(err.contains("Not the leader"), "unexpected error: {}", err);
    assert_eq!(cluster.status(follower).await.call_count, 0);

    cluster.shutdown().await;
}
