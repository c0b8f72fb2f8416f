//! GraphQL text rendering for queries

use super::{Field, ParamValue, Query};
use std::fmt;

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // never valid GraphQL, so a leaked placeholder fails server-side too
            Self::Missing => f.write_str("$MISSING"),
            Self::Null => f.write_str("null"),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                f.write_str(&quoted)
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;

        if !self.params.is_empty() {
            f.write_str("(")?;
            for (i, (key, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            f.write_str(")")?;
        }

        if !self.children.is_empty() {
            f.write_str(" { ")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", child)?;
            }
            f.write_str(" }")?;
        }

        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("query {")?;
        for field in self.fields() {
            write!(f, " {}", field)?;
        }
        f.write_str(" }")
    }
}
