use std::collections::HashSet;
use std::time::Duration;

use ringstore_dht::{Dataset, Partition, Record};
use ringstore_manager::{PeerState, Phase};
use ringstore_peer::{Error, PeerStatus};
use ringstore_protocols::FindOutcome;

use crate::Cluster;

const DATASET: &str = "1950";
const RECORDS: u64 = 60;

fn dataset() -> Dataset {
    let entries = (0..RECORDS)
        .map(|i| {
            let key = 1_000 + 7 * i;
            let record = Record::from(vec![
                key.to_string(),
                "KANSAS".to_string(),
                DATASET.to_string(),
                format!("Thunderstorm Wind {}", i),
            ]);
            (key, record)
        })
        .collect();
    Dataset::with_entries(DATASET, entries)
}

const SETTLE_ATTEMPTS: usize = 500;

/// Wait until every peer's status satisfies `done`.
async fn settle_until(cluster: &Cluster, what: &str, done: impl Fn(&[PeerStatus]) -> bool) {
    for _ in 0..SETTLE_ATTEMPTS {
        let mut statuses = Vec::new();
        for peer in cluster.peers() {
            statuses.push(peer.status().await);
        }
        if done(&statuses) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("cluster never settled: {}", what);
}

/// Wait until `expected` hold their ids and every record has been stored.
async fn settle(cluster: &Cluster, expected: &[String]) {
    let partition = Partition::for_dataset_size(RECORDS as usize);
    let slots: HashSet<_> = dataset().iter().map(|(k, _)| partition.slot(*k)).collect();
    settle_until(cluster, "ring seeded", |statuses| {
        let in_place = expected.iter().enumerate().all(|(id, name)| {
            statuses
                .iter()
                .any(|s| &s.name == name && s.id == Some(id) && s.ring_size == expected.len())
        });
        let records: usize = statuses.iter().filter(|s| s.id.is_some()).map(|s| s.records).sum();
        in_place && records == slots.len()
    })
    .await;
}

/// Four registered peers and a ring of three led by p1.
async fn built_cluster() -> Cluster {
    let mut cluster = Cluster::start(dataset(), 11).await.unwrap();
    cluster.register_all(&["p1", "p2", "p3", "p4"]).await.unwrap();
    cluster
        .peer("p1")
        .unwrap()
        .setup_dht(3, DATASET)
        .await
        .unwrap();
    let names = ring_names(&cluster, "p1").await;
    settle(&cluster, &names).await;
    cluster
}

/// Ring members' names in id order, as seen by `name`.
async fn ring_names(cluster: &Cluster, name: &str) -> Vec<String> {
    cluster
        .peer(name)
        .unwrap()
        .members()
        .await
        .unwrap()
        .iter()
        .map(|p| p.name.clone())
        .collect()
}

/// Every peer's view agrees with `expected`, tables partition the dataset.
async fn assert_ring(cluster: &Cluster, expected: &[String]) {
    let partition = Partition::for_dataset_size(RECORDS as usize);
    let ring_size = expected.len();

    let mut stored = HashSet::new();
    for (id, name) in expected.iter().enumerate() {
        let peer = cluster.peer(name).unwrap();
        let status = peer.status().await;
        assert_eq!(status.id, Some(id), "{} has the wrong id", name);
        assert_eq!(status.ring_size, ring_size);
        assert_eq!(status.leader.as_deref(), Some(expected[0].as_str()));
        assert_eq!(ring_names(cluster, name).await, expected);

        for slot in peer.table().await.slots() {
            assert_eq!(Partition::owner(*slot, ring_size), id);
            assert!(stored.insert(*slot), "slot {} stored twice", slot);
        }
    }

    let all_slots: HashSet<_> = dataset().iter().map(|(k, _)| partition.slot(*k)).collect();
    assert_eq!(stored, all_slots);
}

#[tokio::test]
async fn build_assigns_ids_and_seeds_every_record() {
    let mut cluster = Cluster::start(dataset(), 3).await.unwrap();
    cluster.register_all(&["p1", "p2", "p3", "p4", "p5"]).await.unwrap();

    let counts = cluster
        .peer("p1")
        .unwrap()
        .setup_dht(4, DATASET)
        .await
        .unwrap();
    let names = ring_names(&cluster, "p1").await;
    settle(&cluster, &names).await;

    assert_eq!(counts.len(), 4);
    assert_eq!(counts[0].name, "p1");
    assert_eq!(counts.iter().map(|c| c.records).sum::<usize>(), RECORDS as usize);

    assert_eq!(names.len(), 4);
    assert_eq!(names[0], "p1");
    let counted: Vec<_> = counts.iter().map(|c| c.name.clone()).collect();
    assert_eq!(counted, names);
    assert_ring(&cluster, &names).await;

    let registry = cluster.registry();
    let registry = registry.lock().await;
    assert_eq!(registry.phase(), Phase::Idle);
    assert!(registry.dht_exists());
    assert_eq!(registry.peer("p1").unwrap().state, PeerState::Leader);
    let in_ring = registry
        .peers()
        .iter()
        .filter(|p| p.state == PeerState::InDht)
        .count();
    assert_eq!(in_ring, 3);
}

#[tokio::test]
async fn manager_rejects_invalid_builds() {
    let mut cluster = Cluster::start(dataset(), 5).await.unwrap();
    cluster.register_all(&["p1", "p2", "p3"]).await.unwrap();
    let p1 = cluster.peer("p1").unwrap();

    let err = p1.setup_dht(2, DATASET).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(reason) if reason == "size n should be at least 3"));

    p1.setup_dht(3, DATASET).await.unwrap();
    let err = cluster
        .peer("p2")
        .unwrap()
        .setup_dht(3, DATASET)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected(_)));
}

#[tokio::test]
async fn free_peer_finds_present_and_absent_keys() {
    let cluster = built_cluster().await;
    let members = ring_names(&cluster, "p1").await;
    let outsider = ["p2", "p3", "p4"]
        .into_iter()
        .find(|n| !members.iter().any(|m| m.as_str() == *n))
        .unwrap();
    let requester = cluster.peer(outsider).unwrap();

    let data = dataset();
    for key in [1_000, 1_007 + 7 * 20, 1_000 + 7 * (RECORDS - 1)] {
        match requester.query(key).await.unwrap() {
            FindOutcome::Found { visited, record } => {
                assert_eq!(&record, data.get(key).unwrap());
                assert!(visited.len() <= members.len());
                let owner = Partition::for_dataset_size(RECORDS as usize)
                    .place(key, members.len())
                    .owner;
                assert_eq!(visited.last(), Some(&owner));
            }
            other => panic!("key {} not found: {:?}", key, other),
        }
    }

    let outcome = requester.query(1_001).await.unwrap();
    assert!(matches!(outcome, FindOutcome::NotFound { .. }));
    assert!(outcome.visited().len() <= members.len());

    // Ring members do not issue lookups.
    let err = cluster.peer("p1").unwrap().query(1_000).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(reason) if reason == "peer is not free"));
}

#[tokio::test]
async fn leave_then_rejoin_rebuilds_the_ring() {
    let cluster = built_cluster().await;
    let before = ring_names(&cluster, "p1").await;
    let leaver = before[1].clone();

    let new_leader = cluster.peer(&leaver).unwrap().leave().await.unwrap();
    assert_eq!(new_leader, before[2]);

    let shrunk = vec![before[2].clone(), before[0].clone()];
    settle(&cluster, &shrunk).await;
    assert_ring(&cluster, &shrunk).await;
    let status = cluster.peer(&leaver).unwrap().status().await;
    assert_eq!(status.id, None);
    assert_eq!(status.records, 0);
    {
        let registry = cluster.registry();
        let registry = registry.lock().await;
        assert_eq!(registry.phase(), Phase::Idle);
        assert_eq!(registry.peer(&leaver).unwrap().state, PeerState::Free);
        assert_eq!(registry.peer(&before[2]).unwrap().state, PeerState::Leader);
        assert_eq!(registry.peer("p1").unwrap().state, PeerState::InDht);
    }

    let leader = cluster.peer(&leaver).unwrap().join().await.unwrap();
    assert_eq!(leader, before[2]);

    let grown = vec![before[2].clone(), before[0].clone(), leaver.clone()];
    settle(&cluster, &grown).await;
    assert_ring(&cluster, &grown).await;
    let registry = cluster.registry();
    let registry = registry.lock().await;
    assert_eq!(registry.peer(&leaver).unwrap().state, PeerState::InDht);
    assert!(registry.pending().is_none());
}

#[tokio::test]
async fn leader_cannot_leave() {
    let cluster = built_cluster().await;
    let err = cluster.peer("p1").unwrap().leave().await.unwrap_err();
    assert!(matches!(err, Error::Rejected(reason) if reason == "peer is not in the DHT"));
    assert_eq!(cluster.peer("p1").unwrap().status().await.id, Some(0));
}

#[tokio::test]
async fn teardown_frees_every_peer() {
    let cluster = built_cluster().await;
    let members = ring_names(&cluster, "p1").await;

    // Only the leader may tear down.
    let err = cluster
        .peer(&members[1])
        .unwrap()
        .teardown()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected(reason) if reason == "peer is not the leader"));

    cluster.peer("p1").unwrap().teardown().await.unwrap();
    settle_until(&cluster, "ring torn down", |statuses| {
        statuses.iter().all(|s| s.id.is_none() && s.records == 0)
    })
    .await;

    for peer in cluster.peers() {
        let status = peer.status().await;
        assert_eq!(status.id, None, "{} still in a ring", status.name);
        assert_eq!(status.records, 0);
    }
    {
        let registry = cluster.registry();
        let registry = registry.lock().await;
        assert!(!registry.dht_exists());
        assert!(registry.peers().iter().all(|p| p.state == PeerState::Free));
    }

    cluster.peer(&members[2]).unwrap().deregister().await.unwrap();
    assert!(cluster.registry().lock().await.peer(&members[2]).is_none());

    // A fresh ring can be built from the remaining peers.
    cluster
        .peer("p1")
        .unwrap()
        .setup_dht(3, DATASET)
        .await
        .unwrap();
}
