//! Quick benchmark for blueprint flattening and service resolution

use std::time::Instant;

use fservice::bind_name::BindNameResolver;
use fservice::{builtin_registry, Context, Outbox, ServiceDescriptor, ServiceRegistry};
use indexmap::IndexMap;
use serde_json::json;

fn main() {
    let outbox = Outbox::new();
    let registry = builtin_registry(&outbox).expect("built-in catalog");

    println!("Service Resolution Performance Test");
    println!("===================================\n");

    // Flattening without cache: a fresh registry each round
    let iterations = 10_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let registry: ServiceRegistry = builtin_registry(&outbox).expect("built-in catalog");
        let _ = registry.blueprint("note_list");
    }
    report("blueprint (cold)", iterations, start);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = registry.blueprint("note_list");
    }
    report("blueprint (cached)", iterations, start);

    // Bind-name expansion
    let declared: IndexMap<String, String> = [
        ("order_by", "order by"),
        ("available_order_by", "available {{order_by}} options"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let dynamic = IndexMap::new();
    let resolver = BindNameResolver::new("bench", &declared, &dynamic);

    let iterations = 100_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = resolver.label("available_order_by");
    }
    report("bind name", iterations, start);

    // Full runs
    let ctx = Context::builder(registry).locale("en").build();
    let requests = vec![
        (
            "note_list",
            ServiceDescriptor::new("note_list")
                .input("token", "secret-token")
                .input("words", "rust"),
        ),
        (
            "note_digest",
            ServiceDescriptor::new("note_digest")
                .input("token", "secret-token")
                .input("queries", json!(["rust", "trip", "notes"])),
        ),
    ];

    let iterations = 2_000;
    for (label, descriptor) in &requests {
        let start = Instant::now();
        for _ in 0..iterations {
            let mut service = ctx.service(descriptor).expect("service");
            let _ = service.run();
        }
        report(label, iterations, start);
    }
}

fn report(label: &str, iterations: u32, start: Instant) {
    let elapsed = start.elapsed();
    println!("{}:", label);
    println!("  Time for {} iterations: {:?}", iterations, elapsed);
    println!("  Per operation: {:?}\n", elapsed / iterations);
}
