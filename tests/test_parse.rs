use nested_qs::{Charset, Config, Delimiter, Duplicates, Error, Parser, PercentDecoding, Value};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use pretty_assertions::assert_eq;
use serde_json::json;

fn parse_with(input: &str, config: &Config) -> serde_json::Value {
    let value = config.parse_str(input).unwrap();
    serde_json::to_value(value).unwrap()
}

fn parse(input: &str) -> serde_json::Value {
    parse_with(input, &Config::new())
}

#[test]
fn flat_keys() {
    assert_eq!(parse("a"), json!({"a": ""}));
    assert_eq!(parse("hello-world_1"), json!({"hello-world_1": ""}));
    assert_eq!(
        parse_with("a", &Config::new().strict_null_handling(true)),
        json!({"a": null})
    );
    assert_eq!(parse("a=b&c=d"), json!({"a": "b", "c": "d"}));
    assert_eq!(parse(""), json!({}));
}

#[test]
fn brackets_and_dots_agree() {
    let expected = json!({"a": {"b": {"c": "d"}}});
    assert_eq!(parse("a[b][c]=d"), expected);
    assert_eq!(parse_with("a.b.c=d", &Config::new().allow_dots(true)), expected);
    assert_eq!(parse("a.b.c=d"), json!({"a.b.c": "d"}));
}

#[test]
fn appends_keep_order() {
    assert_eq!(parse("a[]=1&a[]=2"), json!({"a": ["1", "2"]}));
    assert_eq!(parse("a[]=2&a[]=1"), json!({"a": ["2", "1"]}));
}

#[test]
fn indices() {
    assert_eq!(parse("a[0]=x&a[1]=y&a[2]=z"), json!({"a": ["x", "y", "z"]}));
    assert_eq!(parse("a[2]=z&a[0]=x&a[1]=y"), json!({"a": ["x", "y", "z"]}));
    assert_eq!(
        parse_with("a[10]=x", &Config::new().array_limit(5)),
        json!({"a": {"10": "x"}})
    );
    assert_eq!(parse("a[20]=x"), json!({"a": ["x"]}));
    assert_eq!(parse("a[21]=x"), json!({"a": {"21": "x"}}));
    assert_eq!(parse("a[01]=x"), json!({"a": {"01": "x"}}));
    assert_eq!(parse("a[-1]=x"), json!({"a": {"-1": "x"}}));
}

#[test]
fn flat_depth() {
    assert_eq!(
        parse_with("a[b][c]=x", &Config::new().depth(0)),
        json!({"a[b][c]": "x"})
    );
}

#[test]
fn depth_limit() {
    assert_eq!(
        parse_with("a[b][c][d]=e", &Config::new().depth(1)),
        json!({"a": {"b": {"[c][d]": "e"}}})
    );
    let err = Config::new()
        .depth(1)
        .strict_depth(true)
        .parse_str("a[b][c]=d")
        .unwrap_err();
    assert!(matches!(err, Error::DepthLimitExceeded { depth: 1 }));
}

#[test]
fn comma_splitting() {
    let config = Config::new().comma(true);
    assert_eq!(parse_with("a=,", &config), json!({"a": ["", ""]}));
    assert_eq!(parse_with("a=1,2,3", &config), json!({"a": ["1", "2", "3"]}));
    assert_eq!(parse("a=1,2,3"), json!({"a": "1,2,3"}));
    assert_eq!(parse_with("a=1%2C2", &config), json!({"a": "1,2"}));
}

#[test]
fn charset_sentinel() {
    let config = Config::new().charset_sentinel(true);
    assert_eq!(
        parse_with("utf8=%26%2310003%3B&a=%F8", &config),
        json!({"a": "ø"})
    );
    assert_eq!(parse_with("utf8=%26%2310003%3B&a=b", &config), json!({"a": "b"}));

    let config = Config::new().charset_sentinel(true).charset(Charset::Latin1);
    assert_eq!(
        parse_with("utf8=%E2%9C%93&a=%C3%B8", &config),
        json!({"a": "ø"})
    );

    // an unknown sentinel value is an ordinary parameter
    assert_eq!(
        parse_with("utf8=maybe&a=b", &Config::new().charset_sentinel(true)),
        json!({"utf8": "maybe", "a": "b"})
    );
    // without detection the sentinel is an ordinary parameter too
    assert_eq!(parse("utf8=%E2%9C%93&a=b"), json!({"utf8": "✓", "a": "b"}));
}

#[test]
fn duplicates() {
    let input = "a=1&a=2";
    assert_eq!(parse(input), json!({"a": ["1", "2"]}));
    assert_eq!(
        parse_with(input, &Config::new().duplicates(Duplicates::First)),
        json!({"a": "1"})
    );
    assert_eq!(
        parse_with(input, &Config::new().duplicates(Duplicates::Last)),
        json!({"a": "2"})
    );
    assert_eq!(
        parse_with("a[b]=1&a[b]=2", &Config::new().duplicates(Duplicates::Last)),
        json!({"a": {"b": "2"}})
    );
}

#[test]
fn prototype_keys() {
    for config in [Config::new(), Config::new().allow_prototypes(true)] {
        assert_eq!(parse_with("__proto__=x&a=b", &config), json!({"a": "b"}));
        assert_eq!(
            parse_with("categories[__proto__]=x&categories[length]=y", &config),
            json!({"categories": {"length": "y"}})
        );
        assert_eq!(parse_with("a[b][__proto__][c]=d", &config), json!({}));
    }
    assert_eq!(parse("toString=x&a[constructor]=y&z=1"), json!({"z": "1"}));
    assert_eq!(
        parse_with("toString=x", &Config::new().allow_prototypes(true)),
        json!({"toString": "x"})
    );
}

#[test]
fn parameter_limits() {
    let config = Config::new().parameter_limit(2);
    assert_eq!(parse_with("a=1&b=2&c=3", &config), json!({"a": "1", "b": "2"}));

    let config = config.throw_on_limit_exceeded(true);
    let err = config.parse_str("a=1&b=2&c=3").unwrap_err();
    assert!(matches!(err, Error::ParameterLimitExceeded { limit: 2 }));
    assert_eq!(
        err.to_string(),
        "Parameter limit exceeded. Only 2 parameters allowed."
    );
    assert_eq!(parse_with("a=1&b=2", &config), json!({"a": "1", "b": "2"}));

    let many: String = (0..2000).map(|i| format!("k{i}=v&")).collect();
    let value = nested_qs::from_str(&many).unwrap();
    assert_eq!(value.as_map().map(|m| m.len()), Some(1000));
    let value = Config::new().parameter_limit(0).parse_str(&many).unwrap();
    assert_eq!(value.as_map().map(|m| m.len()), Some(2000));
}

#[test]
fn query_prefix() {
    assert_eq!(parse("?a=b"), json!({"?a": "b"}));
    assert_eq!(
        parse_with("?a=b", &Config::new().ignore_query_prefix(true)),
        json!({"a": "b"})
    );
}

#[test]
fn delimiters() {
    assert_eq!(
        parse_with("a=b;c=d", &Config::new().delimiter(';')),
        json!({"a": "b", "c": "d"})
    );
    let pattern = Delimiter::pattern(r"[;,]").unwrap();
    assert_eq!(
        parse_with("a=b;c=d,e=f", &Config::new().delimiter(pattern)),
        json!({"a": "b", "c": "d", "e": "f"})
    );
    assert!(matches!(
        Delimiter::pattern("(").unwrap_err(),
        Error::InvalidDelimiter(_)
    ));
}

#[test]
fn percent_decoding() {
    assert_eq!(parse("a=%E2%9C%93&b=100%25"), json!({"a": "✓", "b": "100%"}));
    assert_eq!(parse("a=%"), json!({"a": "%"}));
    let err = Config::new()
        .percent_decoding(PercentDecoding::Strict)
        .parse_str("ok=1&a=%")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPercentEncoding { offset: 7 }));
}

#[test]
fn numeric_entities() {
    let config = Config::new()
        .charset(Charset::Latin1)
        .interpret_numeric_entities(true);
    assert_eq!(parse_with("foo=%26%239786%3B", &config), json!({"foo": "☺"}));
    // keys are left alone
    assert_eq!(parse_with("%26%239786%3B=x", &config), json!({"&#9786;": "x"}));
}

#[test]
fn sparse_and_empty_lists() {
    assert_eq!(parse("a[1]=b&a[15]=c"), json!({"a": ["b", "c"]}));
    assert_eq!(
        parse_with("a[1]=b&a[3]=c", &Config::new().allow_sparse(true)),
        json!({"a": [null, "b", null, "c"]})
    );
    assert_eq!(
        parse_with("a[]=&b=c", &Config::new().allow_empty_arrays(true)),
        json!({"a": [], "b": "c"})
    );
}

#[test]
fn bytes_input() {
    let value = nested_qs::from_bytes(b"a[b]=c").unwrap();
    assert_eq!(value["a"]["b"].as_str(), Some("c"));
    assert!(matches!(
        nested_qs::from_bytes(b"a=\xff").unwrap_err(),
        Error::Utf8(_)
    ));
}

fn encode(text: &str) -> String {
    utf8_percent_encode(text, NON_ALPHANUMERIC).to_string()
}

/// Writes a value back in indices form, e.g. `a[b][0]=x`.
fn stringify(value: &Value) -> String {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Map(map) => {
                for (key, child) in map {
                    let key = encode(key);
                    let path = if prefix.is_empty() {
                        key
                    } else {
                        format!("{prefix}[{key}]")
                    };
                    walk(&path, child, out);
                }
            }
            Value::List(list) => {
                for (index, child) in list.iter().enumerate() {
                    walk(&format!("{prefix}[{index}]"), child, out);
                }
            }
            Value::String(s) => out.push(format!("{prefix}={}", encode(s))),
            Value::Bool(_) | Value::Null => out.push(prefix.to_owned()),
        }
    }
    let mut out = Vec::new();
    walk("", value, &mut out);
    out.join("&")
}

#[test]
fn reparsing_is_stable() {
    let inputs = [
        "a[b][c]=d&a[b][e]=f",
        "a[]=1&a[]=2&a[]=3",
        "user[name]=J%C3%B6rg&user[tags][]=x&user[tags][]=y+z",
        "a[0][b]=1&a[1][b]=2&c=%26",
    ];
    for input in inputs {
        let first = nested_qs::from_str(input).unwrap();
        let again = nested_qs::from_str(input).unwrap();
        assert_eq!(first, again);

        let reparsed = nested_qs::from_str(&stringify(&first)).unwrap();
        assert_eq!(first, reparsed, "{input}");
    }
}

#[test]
fn parser_reuse() {
    let config = Config::new();
    let mut parser = Parser::new();
    let inputs = ["a=1&b=2&c[d]=3", "x[]=1", "", "a[b][c]=%20"];
    for input in inputs {
        assert_eq!(
            parser.parse(input, &config).unwrap(),
            config.parse_str(input).unwrap()
        );
    }
}
