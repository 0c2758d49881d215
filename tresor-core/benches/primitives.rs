use criterion::*;
use tresor_core::{elgamal, elgamal::KeyPair, group::Point, group::Scalar, shamir};

fn group_bench(c: &mut Criterion) {
    c.bench_function("Group/ScalarSample", |b| {
        let rng = &mut rand::thread_rng();
        b.iter(|| Scalar::sample(rng));
    });

    c.bench_function("Group/PointFromScalar", |b| {
        let rng = &mut rand::thread_rng();
        let s = Scalar::sample(rng);
        b.iter(|| Point::from_scalar(&s));
    });
}

fn elgamal_bench(c: &mut Criterion) {
    c.bench_function("ElGamal/Encrypt", |b| {
        let rng = &mut rand::thread_rng();
        let kp1 = KeyPair::generate(rng);
        let kp2 = KeyPair::generate(rng);
        b.iter(|| elgamal::encrypt(rng, &kp1.pk, &kp2.pk, b"benchmark payload").unwrap());
    });

    c.bench_function("ElGamal/Decrypt", |b| {
        let rng = &mut rand::thread_rng();
        let kp1 = KeyPair::generate(rng);
        let kp2 = KeyPair::generate(rng);
        let ct = elgamal::encrypt(rng, &kp1.pk, &kp2.pk, b"benchmark payload").unwrap();
        b.iter(|| elgamal::decrypt(&kp1.sk, &kp2.sk, &ct).unwrap());
    });
}

fn shamir_bench(c: &mut Criterion) {
    for set_size in [3u8, 5, 7, 10, 20] {
        c.bench_function(&format!("Shamir/Split (n={set_size})"), |b| {
            let rng = &mut rand::thread_rng();
            let secret = Scalar::sample(rng);
            b.iter(|| shamir::split(secret, set_size, set_size / 2 + 1, rng));
        });

        c.bench_function(&format!("Shamir/Combine (n={set_size})"), |b| {
            let rng = &mut rand::thread_rng();
            let secret = Scalar::sample(rng);
            let threshold = set_size / 2 + 1;
            let shards = shamir::split(secret, set_size, threshold, rng);

            b.iter_batched(
                || shards[0..threshold as usize].to_vec(),
                |subset| shamir::combine_shards(&subset).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(benches, group_bench, elgamal_bench, shamir_bench);
criterion_main!(benches);
