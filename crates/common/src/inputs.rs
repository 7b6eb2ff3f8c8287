use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Number of integers the bundled circuit takes (`x` and `y`)
pub const INPUT_SIZE: usize = 2;

/// User-supplied circuit inputs.
///
/// Either exactly [`INPUT_SIZE`] integers or empty. Empty is the
/// invalid-input sentinel: malformed text resets the input instead of being
/// reported as an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Input(Vec<BigInt>);

impl Input {
    /// The invalid-input sentinel
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build from values, `None` unless the arity is exactly [`INPUT_SIZE`]
    pub fn new(values: Vec<BigInt>) -> Option<Self> {
        (values.len() == INPUT_SIZE).then_some(Self(values))
    }

    /// Parse the text field contents.
    ///
    /// Accepts `[a, b]` where each element is an optional `-` followed by
    /// ASCII digits, with arbitrary whitespace around elements. Anything
    /// else yields [`Input::empty`].
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_default()
    }

    pub fn try_parse(raw: &str) -> Option<Self> {
        let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
        let values = inner
            .split(',')
            .map(parse_integer)
            .collect::<Option<Vec<_>>>()?;
        Self::new(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[BigInt] {
        &self.0
    }
}

impl From<[i64; INPUT_SIZE]> for Input {
    fn from(values: [i64; INPUT_SIZE]) -> Self {
        Self(values.iter().map(|&v| BigInt::from(v)).collect())
    }
}

fn parse_integer(token: &str) -> Option<BigInt> {
    let token = token.trim();
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

// Small values serialize as JSON numbers so the UI can echo them back
// verbatim; anything wider than 64 bits goes out as a decimal string.
impl Serialize for Input {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<serde_json::Value> = self
            .0
            .iter()
            .map(|v| match (v.to_i64(), v.to_u64()) {
                (Some(i), _) => serde_json::Value::from(i),
                (None, Some(u)) => serde_json::Value::from(u),
                _ => serde_json::Value::String(v.to_string()),
            })
            .collect();
        values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Input {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Element {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        let elements = Vec::<Element>::deserialize(deserializer)?;
        if elements.is_empty() {
            return Ok(Self::empty());
        }
        let values = elements
            .into_iter()
            .map(|e| match e {
                Element::Signed(i) => Ok(BigInt::from(i)),
                Element::Unsigned(u) => Ok(BigInt::from(u)),
                Element::Text(s) => parse_integer(&s)
                    .ok_or_else(|| de::Error::custom(format!("not an integer: {}", s))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(values).ok_or_else(|| {
            de::Error::custom(format!("expected {} inputs", INPUT_SIZE))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid_input() {
        assert_eq!(Input::parse("[3, 4]"), Input::from([3, 4]));
        assert_eq!(Input::parse("[  7,9 ]"), Input::from([7, 9]));
        assert_eq!(Input::parse("[-1,2]"), Input::from([-1, 2]));
    }

    #[test]
    fn test_parse_invalid_input_is_empty() {
        for raw in [
            "",
            "[",
            "[]",
            "[1]",
            "[1,2,3]",
            "[1.5, 2]",
            "[a, 2]",
            " [1, 2]",
            "[1, 2] ",
            "[+1, 2]",
            "[1,,2]",
            "[-, 2]",
            "{1, 2}",
            "1, 2",
        ] {
            assert!(Input::parse(raw).is_empty(), "expected empty for {:?}", raw);
        }
    }

    #[test]
    fn test_parse_big_integer() {
        let input = Input::parse("[123456789012345678901234567890, 1]");
        assert_eq!(input.len(), 2);
        assert_eq!(
            input.values()[0].to_string(),
            "123456789012345678901234567890"
        );
    }

    #[test]
    fn test_display_matches_json_stringify() {
        assert_eq!(Input::from([3, 4]).to_string(), "[3,4]");
        assert_eq!(Input::empty().to_string(), "[]");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Input::from([3, 4])).unwrap();
        assert_eq!(json, "[3,4]");

        let big: Input = serde_json::from_str("[\"99999999999999999999999\", 2]").unwrap();
        assert_eq!(
            serde_json::to_string(&big).unwrap(),
            "[\"99999999999999999999999\",2]"
        );

        let empty: Input = serde_json::from_str("[]").unwrap();
        assert!(empty.is_empty());
        assert!(serde_json::from_str::<Input>("[1]").is_err());
    }

    fn whitespace() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec![' ', '\t', '\n']), 0..3)
            .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn well_formed_pairs_parse(
            a in any::<i64>(),
            b in any::<i64>(),
            w1 in whitespace(),
            w2 in whitespace(),
            w3 in whitespace(),
            w4 in whitespace(),
        ) {
            let raw = format!("[{}{}{},{}{}{}]", w1, a, w2, w3, b, w4);
            prop_assert_eq!(Input::parse(&raw), Input::from([a, b]));
        }

        #[test]
        fn wrong_arity_is_empty(values in prop::collection::vec(any::<i32>(), 0..6)) {
            prop_assume!(values.len() != INPUT_SIZE);
            let raw = format!(
                "[{}]",
                values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
            );
            prop_assert!(Input::parse(&raw).is_empty());
        }

        #[test]
        fn unbracketed_text_is_empty(raw in "[^\\[].*") {
            prop_assert!(Input::parse(&raw).is_empty());
        }

        #[test]
        fn parsed_input_has_exact_arity(raw in "\\PC{0,16}") {
            let input = Input::parse(&raw);
            prop_assert!(input.is_empty() || input.len() == INPUT_SIZE);
        }
    }
}
