//! Multiplication modes and their gradient rotation

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Role an operand plays in a block-sparse product
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Stored as a stack of populated blocks
    Sparse,
    /// Stored as a strided dense matrix
    Dense,
}

/// Which of `(output, left, right)` is block-sparse
///
/// The string forms list the roles of output, left and right operand:
/// `"sdd"`, `"dsd"` and `"dds"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SparseMode {
    /// Sparse output from two dense operands (`sdd`)
    SparseOutput,
    /// Dense output from a sparse left operand (`dsd`)
    SparseLeft,
    /// Dense output from a sparse right operand (`dds`)
    SparseRight,
}

impl SparseMode {
    /// Roles of `(output, left, right)`
    pub fn roles(self) -> [Role; 3] {
        use Role::{Dense as D, Sparse as S};
        match self {
            Self::SparseOutput => [S, D, D],
            Self::SparseLeft => [D, S, D],
            Self::SparseRight => [D, D, S],
        }
    }

    /// Mode that computes the gradient of the left operand
    ///
    /// Obtained by swapping the roles of output and left operand.
    pub fn grad_a_mode(self) -> Self {
        match self {
            Self::SparseOutput => Self::SparseLeft,
            Self::SparseLeft => Self::SparseOutput,
            Self::SparseRight => Self::SparseRight,
        }
    }

    /// Mode that computes the gradient of the right operand
    ///
    /// Obtained by swapping the roles of output and right operand.
    pub fn grad_b_mode(self) -> Self {
        match self {
            Self::SparseOutput => Self::SparseRight,
            Self::SparseLeft => Self::SparseLeft,
            Self::SparseRight => Self::SparseOutput,
        }
    }

    /// Whether the output is block-sparse
    #[inline]
    pub fn is_sparse_output(self) -> bool {
        matches!(self, Self::SparseOutput)
    }

    /// Three-letter name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SparseOutput => "sdd",
            Self::SparseLeft => "dsd",
            Self::SparseRight => "dds",
        }
    }
}

impl FromStr for SparseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sdd" => Ok(Self::SparseOutput),
            "dsd" => Ok(Self::SparseLeft),
            "dds" => Ok(Self::SparseRight),
            other => Err(Error::config(format!(
                "unknown mode '{other}', supported modes are: sdd, dsd, dds"
            ))),
        }
    }
}

impl fmt::Display for SparseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ALL: [SparseMode; 3] = [
        SparseMode::SparseOutput,
        SparseMode::SparseLeft,
        SparseMode::SparseRight,
    ];

    fn from_roles(roles: [Role; 3]) -> Option<SparseMode> {
        ALL.into_iter().find(|m| m.roles() == roles)
    }

    #[test]
    fn test_parse_roundtrip() {
        for mode in ALL {
            assert_eq!(mode.as_str().parse::<SparseMode>().unwrap(), mode);
        }
        let err = "ssd".parse::<SparseMode>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_rotation_matches_role_swap() {
        for mode in ALL {
            let [o, l, r] = mode.roles();
            assert_eq!(from_roles([l, o, r]), Some(mode.grad_a_mode()));
            assert_eq!(from_roles([r, l, o]), Some(mode.grad_b_mode()));
        }
    }

    #[test]
    fn test_rotation_table() {
        use SparseMode::*;
        assert_eq!(SparseOutput.grad_a_mode(), SparseLeft);
        assert_eq!(SparseOutput.grad_b_mode(), SparseRight);
        assert_eq!(SparseLeft.grad_a_mode(), SparseOutput);
        assert_eq!(SparseLeft.grad_b_mode(), SparseLeft);
        assert_eq!(SparseRight.grad_a_mode(), SparseRight);
        assert_eq!(SparseRight.grad_b_mode(), SparseOutput);
    }
}
