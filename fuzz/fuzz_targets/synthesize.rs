#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::arbitrary;
use libfuzzer_sys::fuzz_target;
use mcp_sql_fuzz::{QueryShape, QuerySynthesizer, TableSchema};
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    seed: u64,
    tables: Vec<(String, Vec<String>)>,
    rounds: u8,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(input) = FuzzInput::arbitrary(&mut u) else {
        return;
    };

    let tables: Vec<TableSchema> = input
        .tables
        .into_iter()
        .map(|(name, columns)| TableSchema::new(name, columns))
        .collect();
    let synthesizer = QuerySynthesizer::default();
    let mut rng = StdRng::seed_from_u64(input.seed);

    for _ in 0..input.rounds {
        let query = synthesizer.synthesize(&tables, &mut rng);
        if tables.is_empty() {
            assert_eq!(query.shape, QueryShape::Generic);
        }
        assert!(!query.sql.is_empty());
    }
});
