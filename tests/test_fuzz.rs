use nested_qs::{Config, Error, Parser, PercentDecoding, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHABET: &[&str] = &[
    "a", "b", "0", "1", "9", "[", "]", "[]", ".", "=", "&", ",", "+", "%", "%5B", "%5D", "%2E",
    "%20", "%ZZ", "%E2%9C%93", "é", "✓", "?", "utf8=", "__proto__",
];

fn random_input(rng: &mut StdRng) -> String {
    let len = rng.random_range(0..48);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
        .collect()
}

fn random_config(rng: &mut StdRng) -> Config {
    Config::new()
        .allow_dots(rng.random_bool(0.5))
        .decode_dot_in_keys(rng.random_bool(0.2))
        .comma(rng.random_bool(0.5))
        .depth(rng.random_range(0..4))
        .array_limit(rng.random_range(0..4))
        .parse_arrays(rng.random_bool(0.8))
        .strict_null_handling(rng.random_bool(0.3))
        .allow_sparse(rng.random_bool(0.3))
        .allow_empty_arrays(rng.random_bool(0.3))
        .charset_sentinel(rng.random_bool(0.3))
        .ignore_query_prefix(rng.random_bool(0.5))
        .parameter_limit(rng.random_range(0..6))
}

fn count_leaves(value: &Value) -> usize {
    match value {
        Value::Map(map) => map.values().map(count_leaves).sum(),
        Value::List(list) => list.iter().map(count_leaves).sum(),
        _ => 1,
    }
}

#[test]
fn arbitrary_input_never_fails_leniently() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut parser = Parser::new();
    for _ in 0..2000 {
        let input = random_input(&mut rng);
        let config = random_config(&mut rng);

        let value = parser
            .parse(&input, &config)
            .unwrap_or_else(|err| panic!("{input:?}: {err}"));
        assert!(value.as_map().is_some(), "{input:?}");

        // a pooled parse and a reused parser agree
        assert_eq!(config.parse_str(&input).unwrap(), value, "{input:?}");
    }
}

#[test]
fn strict_modes_only_fail_with_typed_errors() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..2000 {
        let input = random_input(&mut rng);
        let config = random_config(&mut rng)
            .strict_depth(true)
            .throw_on_limit_exceeded(true)
            .percent_decoding(PercentDecoding::Strict);

        match config.parse_str(&input) {
            Ok(value) => assert!(value.as_map().is_some()),
            Err(
                Error::DepthLimitExceeded { .. }
                | Error::ParameterLimitExceeded { .. }
                | Error::InvalidPercentEncoding { .. },
            ) => {}
            Err(err) => panic!("{input:?}: unexpected error {err}"),
        }
    }
}

#[test]
fn parameter_limit_bounds_the_output() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let limit = rng.random_range(1..5);
        // no commas, so every parameter contributes at most one leaf
        let input: String = (0..rng.random_range(0..12))
            .map(|i| format!("k{}[{}]=v&", rng.random_range(0..3), i % 4))
            .collect();
        let config = Config::new().parameter_limit(limit);
        let value = config.parse_str(&input).unwrap();
        assert!(count_leaves(&value) <= limit, "{input:?}");
    }
}
