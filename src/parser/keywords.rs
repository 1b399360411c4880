//! SQL keywords recognised by the tokenizer

use std::fmt;

macro_rules! keywords {
    ($($variant:ident => $text:literal),* $(,)?) => {
        /// Reserved words of the supported SELECT dialect
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant),*
        }

        impl Keyword {
            pub fn all() -> &'static [Keyword] {
                &[$(Keyword::$variant),*]
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text),*
                }
            }
        }
    };
}

keywords! {
    All => "ALL",
    And => "AND",
    As => "AS",
    Asc => "ASC",
    Between => "BETWEEN",
    By => "BY",
    Case => "CASE",
    Cast => "CAST",
    Cross => "CROSS",
    Desc => "DESC",
    Distinct => "DISTINCT",
    Else => "ELSE",
    End => "END",
    Except => "EXCEPT",
    Exists => "EXISTS",
    False => "FALSE",
    From => "FROM",
    Full => "FULL",
    Group => "GROUP",
    Having => "HAVING",
    In => "IN",
    Inner => "INNER",
    Intersect => "INTERSECT",
    Is => "IS",
    Join => "JOIN",
    Left => "LEFT",
    Like => "LIKE",
    Limit => "LIMIT",
    Not => "NOT",
    Null => "NULL",
    On => "ON",
    Or => "OR",
    Order => "ORDER",
    Outer => "OUTER",
    Recursive => "RECURSIVE",
    Right => "RIGHT",
    Select => "SELECT",
    Then => "THEN",
    True => "TRUE",
    Union => "UNION",
    When => "WHEN",
    Where => "WHERE",
    With => "WITH",
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_text_is_upper_case() {
        for keyword in Keyword::all() {
            assert_eq!(keyword.to_string(), keyword.as_str().to_uppercase());
        }
        assert_eq!(Keyword::Select.to_string(), "SELECT");
    }
}
