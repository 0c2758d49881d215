//! The three named concurrency properties (spec §8): a signup race, a
//! participation race, and shutdown under load. Each drives several real
//! TCP connections against one in-process server concurrently and asserts
//! on the outcome rather than the interleaving, since the exact race
//! timing is not and should not be deterministic.

use std::time::Duration;

use tresor_client::{Client, Error, ParticipateOutcome, ShardBook};
use tresor_core::elgamal;
use tresor_test::{learn_shards, signed_up_client, spawn_server};
use tresor_types::update::UpdateRecord;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_signup_exactly_one_succeeds() {
    let server = spawn_server().await;
    let addr = server.addr;

    let (a, b) = tokio::join!(
        async {
            let mut client = Client::connect(addr, false).await.unwrap();
            client.signup("racer", "pw").await
        },
        async {
            let mut client = Client::connect(addr, false).await.unwrap();
            client.signup("racer", "pw").await
        },
    );

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the two racing signups should succeed");

    let failure = results.into_iter().find(Result::is_err).unwrap().unwrap_err();
    match failure {
        Error::Rejected(message) => {
            assert!(message.contains("already taken"), "unexpected rejection: {message}");
        }
        other => panic!("expected a Rejected error, got {other:?}"),
    }

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn n_participants_race_exactly_required_told_to_send() {
    let server = spawn_server().await;
    let addr = server.addr;
    let required: usize = 4;
    let candidates: usize = 10;

    let mut owner = signed_up_client(addr, false, "race-owner", "pw").await;
    let member_names: Vec<String> = (0..candidates).map(|i| format!("race-member-{i}")).collect();
    let mut members = Vec::new();
    for name in &member_names {
        members.push(signed_up_client(addr, false, name, "pw").await);
    }

    let user_set_id = owner
        .make_userset(vec!["race-owner".into()], member_names, 0, required as u8)
        .await
        .unwrap();

    let mut owner_book = ShardBook::new();
    learn_shards(&mut owner, &mut owner_book).await.unwrap();
    let owned = owner_book.shards_for(user_set_id).unwrap().clone();
    let mut rng = rand::thread_rng();
    let ciphertext = elgamal::encrypt(&mut rng, &owned.pub_key1, &owned.pub_key2, b"race").unwrap();
    owner.decrypt(user_set_id, ciphertext).await.unwrap();

    let mut set = tokio::task::JoinSet::new();
    for mut member in members {
        set.spawn(async move {
            let records = member.update().await.unwrap();
            let op_id = records
                .into_iter()
                .find_map(|record| match record {
                    UpdateRecord::OnLookup { op_id } => Some(op_id),
                    _ => None,
                })
                .expect("every candidate should have been notified via OnLookup");
            member.decrypt_participate(op_id).await.unwrap()
        });
    }

    let outcomes = set.join_all().await;
    let sent = outcomes
        .iter()
        .filter(|o| matches!(o, ParticipateOutcome::RegLayer(_)))
        .count();
    let not_required = outcomes
        .iter()
        .filter(|o| matches!(o, ParticipateOutcome::NotRequired))
        .count();
    assert_eq!(sent, required, "exactly the threshold count should be asked to send a part");
    assert_eq!(not_required, candidates - required);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_drains_in_flight_connections_within_bounded_time() {
    let server = spawn_server().await;
    let addr = server.addr;

    // Connect every socket up front, so the accept loop has already
    // admitted all of them before `shutdown` stops accepting new ones —
    // what's "in flight" below is request handling, not the accept race.
    let mut clients = Vec::new();
    for _ in 0..20 {
        clients.push(Client::connect(addr, false).await.unwrap());
    }

    let mut set = tokio::task::JoinSet::new();
    for (i, mut client) in clients.into_iter().enumerate() {
        set.spawn(async move {
            let name = format!("shutdown-user-{i}");
            client.signup(&name, "pw").await.unwrap();
            client.login(&name, "pw").await.unwrap();
            client.logout().await.unwrap();
        });
    }

    let shutdown = tokio::time::timeout(Duration::from_secs(5), server.shutdown());
    let (_clients, shutdown_result) = tokio::join!(set.join_all(), shutdown);
    shutdown_result
        .expect("server did not shut down within the timeout")
        .expect("server task returned an error");
}
