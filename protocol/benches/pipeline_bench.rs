// Invocation pipeline benchmarks.
//
// Covers envelope signing, the signed enqueue path (parse, verify, nonce)
// and batch execution at various sizes.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ledger_protocol::acl::MemoryAcl;
use ledger_protocol::batch::batch_argument;
use ledger_protocol::crypto::{KeyType, Keypair};
use ledger_protocol::envelope::SignedEnvelope;
use ledger_protocol::stub::MemoryWorld;
use ledger_protocol::{
    token, Address, Chaincode, Contract, CoreSettings, RouterBuilder, TokenConfig,
};

struct Bench;

impl Contract for Bench {
    fn routes(builder: RouterBuilder<Self>) -> RouterBuilder<Self> {
        token::routes(builder)
    }
}

const NONCE_BASE: u64 = 1_700_000_000_000;

fn setup() -> (MemoryWorld, Chaincode<Bench>, Keypair) {
    let acl = Arc::new(MemoryAcl::new());
    let sender = Keypair::from_seed(KeyType::Ed25519, &[1; 32]).expect("seeded keypair");
    let address = acl.register("sender", vec![sender.public_key()]);
    let chaincode = Chaincode::new(Bench, CoreSettings::default())
        .expect("router builds")
        .with_acl(acl);
    let mut world = MemoryWorld::new("fiat", "fiat");
    let config = TokenConfig::new("FIAT", address);
    world.init(&chaincode, b"d", vec![serde_json::to_vec(&config).expect("config json")]);
    (world, chaincode, sender)
}

fn transfer_args(sender: &Keypair, nonce: u64) -> Vec<Vec<u8>> {
    let to = Address::from_public_key(b"recipient").to_string();
    let args = vec![to, "1".into(), String::new()];
    SignedEnvelope::sign("transfer", "req", "fiat", "fiat", args, nonce, &[sender]).to_args()
}

fn bench_sign_envelope(c: &mut Criterion) {
    let sender = Keypair::from_seed(KeyType::Ed25519, &[1; 32]).expect("seeded keypair");
    c.bench_function("envelope/sign_ed25519", |b| {
        b.iter(|| transfer_args(&sender, NONCE_BASE));
    });

    let secp = Keypair::from_seed(KeyType::Secp256k1, &[2; 32]).expect("seeded keypair");
    c.bench_function("envelope/sign_secp256k1", |b| {
        b.iter(|| transfer_args(&secp, NONCE_BASE));
    });
}

fn bench_enqueue(c: &mut Criterion) {
    let (mut world, chaincode, sender) = setup();
    let mut nonce = NONCE_BASE;
    c.bench_function("pipeline/enqueue_signed", |b| {
        b.iter(|| {
            nonce += 1;
            world.invoke(&chaincode, b"client", transfer_args(&sender, nonce))
        });
    });
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/batch_execute");
    for size in [1usize, 10, 50] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let (mut world, chaincode, sender) = setup();
                    let ids: Vec<String> = (0..size as u64)
                        .map(|i| {
                            world
                                .invoke(
                                    &chaincode,
                                    b"client",
                                    transfer_args(&sender, NONCE_BASE + i + 1),
                                )
                                .payload_text()
                        })
                        .collect();
                    let arg = batch_argument(ids).expect("batch json");
                    (world, chaincode, arg)
                },
                |(mut world, chaincode, arg)| {
                    world.invoke(&chaincode, b"relay", vec![b"batchExecute".to_vec(), arg])
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sign_envelope, bench_enqueue, bench_batch);
criterion_main!(benches);
