use std::cell::RefCell;

use crate::parse::Parser;

#[derive(Default)]
struct ParserPool {
    parser: Option<Parser>,
}

impl ParserPool {
    fn take(&mut self) -> Parser {
        self.parser.take().unwrap_or_default()
    }

    fn put(&mut self, parser: Parser) {
        self.parser = Some(parser);
    }
}

thread_local! {
    static PARSER_POOL: RefCell<ParserPool> = RefCell::new(ParserPool::default());
}

/// Runs `f` with this thread's pooled parser.
///
/// The parser is taken out of the pool for the duration of the call, so a
/// nested call (e.g. from inside a custom decoder) gets a fresh parser
/// instead of a borrow conflict.
pub(crate) fn with_parser<T>(f: impl FnOnce(&mut Parser) -> T) -> T {
    let mut parser = PARSER_POOL.with(|pool| pool.borrow_mut().take());
    let result = f(&mut parser);
    PARSER_POOL.with(|pool| pool.borrow_mut().put(parser));
    result
}

#[cfg(test)]
mod test {
    use super::with_parser;
    use crate::{BoxError, Charset, Config, DecodeKind};

    #[test]
    fn nested_use_does_not_conflict() {
        let config = Config::new().decoder(
            |input: &str, _: Charset, _: DecodeKind| -> Result<String, BoxError> {
                // re-enters the pool while the outer parse holds its parser
                let inner = Config::new().parse_str("x=1")?;
                Ok(format!("{input}{}", inner["x"].as_str().unwrap_or_default()))
            },
        );
        let value = with_parser(|parser| parser.parse("a=b", &config)).unwrap();
        assert_eq!(value["a1"].as_str(), Some("b1"));
    }
}
