//! A reference dev client for `tresor-server`: enough to drive every
//! protocol operation from a shell, grounded on `oprf-dev-client`'s shape
//! (a `clap::Subcommand` config, one async function per command, a
//! `StressTest` command timing many concurrent rounds) but not a
//! replacement for a real profile-holding interactive client.

mod config;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;
use tokio::task::JoinSet;

use tresor_client::{Applied, Client, ParticipateOutcome, ShardBook};
use tresor_core::elgamal;

use config::{Command, DevClientConfig, StressTestCommand};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = DevClientConfig::parse();
    tracing::info!(?config, "starting tresor-dev-client");

    match config.command.clone() {
        Command::Signup { username, password } => {
            let mut client = Client::connect(config.server_addr, config.require_encryption).await?;
            client.signup(&username, &password).await?;
            println!("signed up {username}");
        }
        Command::Login { username, password } => {
            let mut client = Client::connect(config.server_addr, config.require_encryption).await?;
            client.login(&username, &password).await?;
            client.logout().await?;
            println!("credentials for {username} are valid");
        }
        Command::MakeUserset {
            username,
            password,
            owners,
            reg_members,
            owners_threshold,
            reg_members_threshold,
        } => {
            let mut client = Client::connect(config.server_addr, config.require_encryption).await?;
            client.login(&username, &password).await?;
            let user_set_id = client
                .make_userset(owners, reg_members, owners_threshold, reg_members_threshold)
                .await?;
            println!("{user_set_id}");
        }
        Command::GetUsersets { username, password } => {
            let mut client = Client::connect(config.server_addr, config.require_encryption).await?;
            client.login(&username, &password).await?;
            for user_set_id in client.get_usersets().await? {
                println!("{user_set_id}");
            }
        }
        Command::Update { username, password } => {
            let mut client = Client::connect(config.server_addr, config.require_encryption).await?;
            client.login(&username, &password).await?;
            for record in client.update().await? {
                println!("{record:?}");
            }
        }
        Command::Demo { message } => {
            let plaintext = run_demo(config.server_addr, config.require_encryption, &message).await?;
            println!("recovered: {}", String::from_utf8_lossy(&plaintext));
        }
        Command::StressTest(cmd) => {
            run_stress_test(config.server_addr, config.require_encryption, cmd).await?;
        }
    }

    Ok(())
}

/// Runs a minimal two-owner, threshold-1 userset through signup, creation,
/// encryption, collaborative decryption, and combination, returning the
/// recovered plaintext. One self-contained round, reused by both
/// [`Command::Demo`] and [`Command::StressTest`].
async fn run_demo(addr: SocketAddr, require_encryption: bool, message: &str) -> eyre::Result<Vec<u8>> {
    round(addr, require_encryption, rand::thread_rng().gen(), message.as_bytes()).await
}

async fn round(
    addr: SocketAddr,
    require_encryption: bool,
    tag: u64,
    message: &[u8],
) -> eyre::Result<Vec<u8>> {
    let password = "dev-client-demo-password";
    let initiator_name = format!("dev-client-initiator-{tag}");
    let participant_name = format!("dev-client-participant-{tag}");

    let mut initiator = Client::connect(addr, require_encryption).await?;
    initiator.signup(&initiator_name, password).await?;
    initiator.login(&initiator_name, password).await?;

    let mut participant = Client::connect(addr, require_encryption).await?;
    participant.signup(&participant_name, password).await?;
    participant.login(&participant_name, password).await?;

    let user_set_id = initiator
        .make_userset(
            vec![initiator_name.clone(), participant_name.clone()],
            vec![initiator_name.clone(), participant_name.clone()],
            1,
            1,
        )
        .await?;
    tracing::debug!(%user_set_id, "created userset");

    let mut initiator_book = ShardBook::new();
    for record in initiator.update().await? {
        initiator_book.apply(record);
    }
    let owned = initiator_book
        .shards_for(user_set_id)
        .expect("initiator holds shards for the userset it just created")
        .clone();

    let mut rng = rand::thread_rng();
    let ciphertext = elgamal::encrypt(&mut rng, &owned.pub_key1, &owned.pub_key2, message)?;

    let op_id = initiator.decrypt(user_set_id, ciphertext.clone()).await?;
    tracing::debug!(%op_id, "requested decryption");

    let mut participant_book = ShardBook::new();
    for record in participant.update().await? {
        if let Applied::ShouldParticipate(id) = participant_book.apply(record) {
            match participant.decrypt_participate(id).await? {
                ParticipateOutcome::RegLayer(send) => {
                    participant.contribute(&participant_book, &send, false).await?;
                }
                ParticipateOutcome::OwnerLayer(send) => {
                    participant.contribute(&participant_book, &send, true).await?;
                }
                ParticipateOutcome::NotRequired => {}
            }
        }
    }

    loop {
        let records = initiator.update().await?;
        if records.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            continue;
        }
        for record in records {
            if let Applied::Finished {
                op_id: finished_id,
                user_set_id,
                reg_parts,
                reg_shard_ids,
                own_parts,
                own_shard_ids,
            } = initiator_book.apply(record)
            {
                if finished_id != op_id {
                    continue;
                }
                let plaintext = tresor_client::finish_decryption(
                    user_set_id,
                    &ciphertext,
                    &owned,
                    &reg_parts,
                    &reg_shard_ids,
                    &own_parts,
                    &own_shard_ids,
                )?;
                initiator.logout().await?;
                participant.logout().await?;
                return Ok(plaintext);
            }
        }
    }
}

async fn run_stress_test(
    addr: SocketAddr,
    require_encryption: bool,
    cmd: StressTestCommand,
) -> eyre::Result<()> {
    let message = vec![0x42u8; cmd.message_len];
    let start = Instant::now();
    let mut rounds = JoinSet::new();
    for idx in 0..cmd.rounds {
        let message = message.clone();
        let tag = (rand::thread_rng().gen::<u32>() as u64) << 32 | idx as u64;
        rounds.spawn(async move {
            let round_start = Instant::now();
            round(addr, require_encryption, tag, &message).await?;
            eyre::Ok(round_start.elapsed())
        });
    }

    let mut durations = Vec::with_capacity(cmd.rounds);
    while let Some(result) = rounds.join_next().await {
        match result {
            Ok(Ok(duration)) => durations.push(duration),
            Ok(Err(err)) => tracing::error!("round failed: {err:?}"),
            Err(err) => tracing::error!("round task panicked: {err:?}"),
        }
    }

    if durations.len() != cmd.rounds {
        eyre::bail!(
            "{} of {} rounds failed, see logs",
            cmd.rounds - durations.len(),
            cmd.rounds
        );
    }

    let total = start.elapsed();
    let throughput = cmd.rounds as f64 / total.as_secs_f64();
    tracing::info!(
        "{} rounds in {total:?}, avg {:?}, throughput {throughput:.2} rounds/s",
        cmd.rounds,
        avg(&durations),
    );
    Ok(())
}

/// Mean of a batch of round-trip durations. Mirrors `oprf-dev-client`'s
/// `avg` helper.
fn avg(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    durations.iter().sum::<Duration>() / durations.len() as u32
}
