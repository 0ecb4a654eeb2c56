use thiserror::Error;

/// Boxed error returned by custom [`Decoder`](crate::Decoder) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

fn plural(n: &usize) -> &'static str {
    if *n == 1 { "" } else { "s" }
}

/// Errors surfaced while parsing a querystring.
///
/// Most malformed input is recovered from locally (a bad percent escape is
/// kept as text, a denied key drops its parameter). Only the conditions
/// below abort a parse.
#[derive(Error, Debug)]
pub enum Error {
    /// More parameters than `parameter_limit` with `throw_on_limit_exceeded`.
    #[error("Parameter limit exceeded. Only {limit} parameter{} allowed.", plural(.limit))]
    ParameterLimitExceeded { limit: usize },

    /// A key nests deeper than `depth` with `strict_depth` set.
    #[error("Input depth exceeded depth option of {depth} and strict_depth is true")]
    DepthLimitExceeded { depth: usize },

    /// A malformed `%XX` escape under [`PercentDecoding::Strict`](crate::PercentDecoding).
    #[error("invalid percent encoding at byte {offset}")]
    InvalidPercentEncoding { offset: usize },

    /// The input is larger than spans can address.
    #[error("input of {len} bytes exceeds the maximum supported size")]
    InputTooLarge { len: usize },

    #[error("invalid delimiter pattern: {0}")]
    InvalidDelimiter(#[from] regex::Error),

    #[error("input is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Error returned by a custom decoder.
    #[error("decoder failed: {0}")]
    Decoder(#[source] BoxError),
}

impl Error {
    pub(crate) fn decoder(err: BoxError) -> Self {
        Error::Decoder(err)
    }
}

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn limit_messages_follow_qs_wording() {
        assert_eq!(
            Error::ParameterLimitExceeded { limit: 1 }.to_string(),
            "Parameter limit exceeded. Only 1 parameter allowed."
        );
        assert_eq!(
            Error::ParameterLimitExceeded { limit: 3 }.to_string(),
            "Parameter limit exceeded. Only 3 parameters allowed."
        );
        assert_eq!(
            Error::DepthLimitExceeded { depth: 1 }.to_string(),
            "Input depth exceeded depth option of 1 and strict_depth is true"
        );
    }
}
