//! The six named end-to-end scenarios: literal userset configurations run
//! against a live, in-process server over real loopback TCP, asserting
//! the recovered plaintext matches what was encrypted.

use rand::RngCore;

use tresor_client::{finish_decryption, Applied, ShardBook};
use tresor_core::elgamal;
use tresor_test::{drain_and_participate, learn_shards, signed_up_client, spawn_server, wait_for_finish};

/// Encrypts `plaintext` under the pub keys a freshly-learned `ShardBook`
/// holds for `user_set_id`, returning the ciphertext and a clone of the
/// owned shard material (needed again at combine time).
fn encrypt_for(
    book: &ShardBook,
    user_set_id: tresor_types::ids::UserSetId,
    plaintext: &[u8],
) -> (elgamal::Ciphertext, tresor_client::OwnedShards) {
    let owned = book.shards_for(user_set_id).expect("creator holds its own shards").clone();
    let mut rng = rand::thread_rng();
    let ciphertext = elgamal::encrypt(&mut rng, &owned.pub_key1, &owned.pub_key2, plaintext).unwrap();
    (ciphertext, owned)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_party_minimal() {
    let server = spawn_server().await;

    let mut owner = signed_up_client(server.addr, false, "owner", "pw").await;
    let mut member = signed_up_client(server.addr, false, "member", "pw").await;

    let user_set_id = owner
        .make_userset(vec!["owner".into()], vec!["member".into()], 0, 1)
        .await
        .unwrap();

    let mut owner_book = ShardBook::new();
    learn_shards(&mut owner, &mut owner_book).await.unwrap();
    let mut member_book = ShardBook::new();
    learn_shards(&mut member, &mut member_book).await.unwrap();

    let plaintext = b"Hello There";
    let (ciphertext, owned) = encrypt_for(&owner_book, user_set_id, plaintext);

    let op_id = owner.decrypt(user_set_id, ciphertext.clone()).await.unwrap();

    drain_and_participate(&mut member, &mut member_book).await.unwrap();

    let finished = wait_for_finish(&mut owner, &mut owner_book, op_id).await.unwrap();
    let Applied::Finished {
        user_set_id,
        reg_parts,
        reg_shard_ids,
        own_parts,
        own_shard_ids,
        ..
    } = finished
    else {
        panic!("expected Finished");
    };

    let recovered = finish_decryption(
        user_set_id,
        &ciphertext,
        &owned,
        &reg_parts,
        &reg_shard_ids,
        &own_parts,
        &own_shard_ids,
    )
    .unwrap();
    assert_eq!(recovered, plaintext);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_members_k_of_n_reg() {
    let server = spawn_server().await;

    let mut owner = signed_up_client(server.addr, false, "owner", "pw").await;
    let mut m1 = signed_up_client(server.addr, false, "m1", "pw").await;
    let mut m2 = signed_up_client(server.addr, false, "m2", "pw").await;

    let user_set_id = owner
        .make_userset(vec!["owner".into()], vec!["m1".into(), "m2".into()], 0, 2)
        .await
        .unwrap();

    let mut owner_book = ShardBook::new();
    learn_shards(&mut owner, &mut owner_book).await.unwrap();
    let mut m1_book = ShardBook::new();
    learn_shards(&mut m1, &mut m1_book).await.unwrap();
    let mut m2_book = ShardBook::new();
    learn_shards(&mut m2, &mut m2_book).await.unwrap();

    let plaintext = b"k of n registry layer";
    let (ciphertext, owned) = encrypt_for(&owner_book, user_set_id, plaintext);

    let op_id = owner.decrypt(user_set_id, ciphertext.clone()).await.unwrap();

    drain_and_participate(&mut m1, &mut m1_book).await.unwrap();
    drain_and_participate(&mut m2, &mut m2_book).await.unwrap();

    let finished = wait_for_finish(&mut owner, &mut owner_book, op_id).await.unwrap();
    let Applied::Finished {
        user_set_id,
        reg_parts,
        reg_shard_ids,
        own_parts,
        own_shard_ids,
        ..
    } = finished
    else {
        panic!("expected Finished");
    };
    assert_eq!(reg_parts.len(), 2);

    let recovered = finish_decryption(
        user_set_id,
        &ciphertext,
        &owned,
        &reg_parts,
        &reg_shard_ids,
        &own_parts,
        &own_shard_ids,
    )
    .unwrap();
    assert_eq!(recovered, plaintext);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extra_member_unused() {
    let server = spawn_server().await;

    let mut owner = signed_up_client(server.addr, false, "owner", "pw").await;
    let mut m1 = signed_up_client(server.addr, false, "m1", "pw").await;
    let mut m2 = signed_up_client(server.addr, false, "m2", "pw").await;
    let mut m3 = signed_up_client(server.addr, false, "m3", "pw").await;

    let user_set_id = owner
        .make_userset(
            vec!["owner".into()],
            vec!["m1".into(), "m2".into(), "m3".into()],
            0,
            1,
        )
        .await
        .unwrap();

    let mut owner_book = ShardBook::new();
    learn_shards(&mut owner, &mut owner_book).await.unwrap();
    let mut m1_book = ShardBook::new();
    learn_shards(&mut m1, &mut m1_book).await.unwrap();
    let mut m2_book = ShardBook::new();
    learn_shards(&mut m2, &mut m2_book).await.unwrap();
    let mut m3_book = ShardBook::new();
    learn_shards(&mut m3, &mut m3_book).await.unwrap();

    let plaintext = b"only one of three is needed";
    let (ciphertext, owned) = encrypt_for(&owner_book, user_set_id, plaintext);

    let op_id = owner.decrypt(user_set_id, ciphertext.clone()).await.unwrap();

    // All three race to participate; exactly one is told to send a part,
    // the other two NotRequired (tolerated transparently by
    // `drain_and_participate`).
    drain_and_participate(&mut m1, &mut m1_book).await.unwrap();
    drain_and_participate(&mut m2, &mut m2_book).await.unwrap();
    drain_and_participate(&mut m3, &mut m3_book).await.unwrap();

    let finished = wait_for_finish(&mut owner, &mut owner_book, op_id).await.unwrap();
    let Applied::Finished {
        user_set_id,
        reg_parts,
        reg_shard_ids,
        own_parts,
        own_shard_ids,
        ..
    } = finished
    else {
        panic!("expected Finished");
    };
    assert_eq!(reg_parts.len(), 1, "only the threshold count should have been asked");

    let recovered = finish_decryption(
        user_set_id,
        &ciphertext,
        &owned,
        &reg_parts,
        &reg_shard_ids,
        &own_parts,
        &own_shard_ids,
    )
    .unwrap();
    assert_eq!(recovered, plaintext);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_layers_active() {
    let server = spawn_server().await;

    let mut owner = signed_up_client(server.addr, false, "owner", "pw").await;
    let mut owner2 = signed_up_client(server.addr, false, "owner2", "pw").await;
    let mut member = signed_up_client(server.addr, false, "member", "pw").await;

    let user_set_id = owner
        .make_userset(
            vec!["owner".into(), "owner2".into()],
            vec!["member".into()],
            1,
            1,
        )
        .await
        .unwrap();

    let mut owner_book = ShardBook::new();
    learn_shards(&mut owner, &mut owner_book).await.unwrap();
    let mut owner2_book = ShardBook::new();
    learn_shards(&mut owner2, &mut owner2_book).await.unwrap();
    let mut member_book = ShardBook::new();
    learn_shards(&mut member, &mut member_book).await.unwrap();

    let plaintext = b"both layers must cooperate";
    let (ciphertext, owned) = encrypt_for(&owner_book, user_set_id, plaintext);

    let op_id = owner.decrypt(user_set_id, ciphertext.clone()).await.unwrap();

    drain_and_participate(&mut owner2, &mut owner2_book).await.unwrap();
    drain_and_participate(&mut member, &mut member_book).await.unwrap();

    let finished = wait_for_finish(&mut owner, &mut owner_book, op_id).await.unwrap();
    let Applied::Finished {
        user_set_id,
        reg_parts,
        reg_shard_ids,
        own_parts,
        own_shard_ids,
        ..
    } = finished
    else {
        panic!("expected Finished");
    };
    assert_eq!(reg_parts.len(), 1);
    assert_eq!(own_parts.len(), 1);

    let recovered = finish_decryption(
        user_set_id,
        &ciphertext,
        &owned,
        &reg_parts,
        &reg_shard_ids,
        &own_parts,
        &own_shard_ids,
    )
    .unwrap();
    assert_eq!(recovered, plaintext);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn owners_only_userset() {
    let server = spawn_server().await;

    let mut o1 = signed_up_client(server.addr, false, "o1", "pw").await;
    let mut o2 = signed_up_client(server.addr, false, "o2", "pw").await;
    let mut o3 = signed_up_client(server.addr, false, "o3", "pw").await;

    let user_set_id = o1
        .make_userset(
            vec!["o1".into(), "o2".into(), "o3".into()],
            vec![],
            2,
            0,
        )
        .await
        .unwrap();

    let mut o1_book = ShardBook::new();
    learn_shards(&mut o1, &mut o1_book).await.unwrap();
    let mut o2_book = ShardBook::new();
    learn_shards(&mut o2, &mut o2_book).await.unwrap();
    let mut o3_book = ShardBook::new();
    learn_shards(&mut o3, &mut o3_book).await.unwrap();

    let plaintext = b"no registry layer, owners only";
    let (ciphertext, owned) = encrypt_for(&o1_book, user_set_id, plaintext);

    let op_id = o1.decrypt(user_set_id, ciphertext.clone()).await.unwrap();

    drain_and_participate(&mut o2, &mut o2_book).await.unwrap();
    drain_and_participate(&mut o3, &mut o3_book).await.unwrap();

    let finished = wait_for_finish(&mut o1, &mut o1_book, op_id).await.unwrap();
    let Applied::Finished {
        user_set_id,
        reg_parts,
        reg_shard_ids,
        own_parts,
        own_shard_ids,
        ..
    } = finished
    else {
        panic!("expected Finished");
    };
    assert_eq!(own_parts.len(), 2);
    assert!(reg_parts.is_empty());

    let recovered = finish_decryption(
        user_set_id,
        &ciphertext,
        &owned,
        &reg_parts,
        &reg_shard_ids,
        &own_parts,
        &own_shard_ids,
    )
    .unwrap();
    assert_eq!(recovered, plaintext);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_round_stress_with_eight_owners_and_fifteen_non_owners() {
    let server = spawn_server().await;

    let owner_names: Vec<String> = (0..8).map(|i| format!("stress-owner-{i}")).collect();
    let member_names: Vec<String> = (0..15).map(|i| format!("stress-member-{i}")).collect();

    let mut owners = Vec::new();
    for name in &owner_names {
        owners.push(signed_up_client(server.addr, false, name, "pw").await);
    }
    let mut members = Vec::new();
    for name in &member_names {
        members.push(signed_up_client(server.addr, false, name, "pw").await);
    }

    let user_set_id = owners[0]
        .make_userset(owner_names.clone(), member_names.clone(), 5, 10)
        .await
        .unwrap();

    let mut owner_books: Vec<ShardBook> = Vec::with_capacity(owners.len());
    for owner in owners.iter_mut() {
        let mut book = ShardBook::new();
        learn_shards(owner, &mut book).await.unwrap();
        owner_books.push(book);
    }
    let mut member_books: Vec<ShardBook> = Vec::with_capacity(members.len());
    for member in members.iter_mut() {
        let mut book = ShardBook::new();
        learn_shards(member, &mut book).await.unwrap();
        member_books.push(book);
    }

    let mut rng = rand::thread_rng();
    for round in 0..5 {
        let initiator_idx = (rng.next_u32() as usize) % owners.len();
        let mut plaintext = vec![0u8; 256];
        rng.fill_bytes(&mut plaintext);

        let (ciphertext, owned) = encrypt_for(&owner_books[initiator_idx], user_set_id, &plaintext);
        let op_id = owners[initiator_idx]
            .decrypt(user_set_id, ciphertext.clone())
            .await
            .unwrap();

        // Every other owner and every member races to participate; the
        // thresholds (5 extra owner parts, 10 extra reg parts) pick who's
        // actually needed.
        for (idx, owner) in owners.iter_mut().enumerate() {
            if idx == initiator_idx {
                continue;
            }
            drain_and_participate(owner, &mut owner_books[idx]).await.unwrap();
        }
        for (idx, member) in members.iter_mut().enumerate() {
            drain_and_participate(member, &mut member_books[idx]).await.unwrap();
        }

        let finished = wait_for_finish(&mut owners[initiator_idx], &mut owner_books[initiator_idx], op_id)
            .await
            .unwrap();
        let Applied::Finished {
            user_set_id,
            reg_parts,
            reg_shard_ids,
            own_parts,
            own_shard_ids,
            ..
        } = finished
        else {
            panic!("expected Finished on round {round}");
        };

        // I3: each delivered shard-id vector lines up one-to-one with its
        // parts vector and never includes the initiator's own shard id —
        // the initiator's contribution is folded in separately by
        // `finish_decryption`, growing the reconstruction set by exactly
        // one once combined.
        assert_eq!(reg_parts.len(), reg_shard_ids.len());
        assert_eq!(own_parts.len(), own_shard_ids.len());
        let own_reg_id = owned.reg_shard.unwrap().id;
        assert!(!reg_shard_ids.iter().any(|id| id.0 == own_reg_id));
        let own_owner_id = owned.owner_shard.unwrap().id;
        assert!(!own_shard_ids.iter().any(|id| id.0 == own_owner_id));

        let recovered = finish_decryption(
            user_set_id,
            &ciphertext,
            &owned,
            &reg_parts,
            &reg_shard_ids,
            &own_parts,
            &own_shard_ids,
        )
        .unwrap();
        assert_eq!(recovered, plaintext, "round {round} did not decrypt to the original plaintext");
    }

    server.shutdown().await.unwrap();
}
