//! Object user operation mask
//!
//! The op mask limits which S3 operations a user may perform. It is written
//! as a comma separated list of `read`, `write`, `delete`, or `*` for all.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Parsed operation mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpMask {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl OpMask {
    pub const ALL: OpMask = OpMask {
        read: true,
        write: true,
        delete: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.delete)
    }
}

impl FromStr for OpMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let entries: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();

        if entries.contains(&"*") {
            if entries.len() > 1 {
                return Err(Error::validation(format!(
                    "invalid use of glob in op mask {:?}",
                    s
                )));
            }
            return Ok(OpMask::ALL);
        }

        let mut mask = OpMask::default();
        for entry in entries {
            match entry {
                "read" => mask.read = true,
                "write" => mask.write = true,
                "delete" => mask.delete = true,
                other => {
                    return Err(Error::validation(format!(
                        "unknown op mask entry {:?}, expected read, write, delete or *",
                        other
                    )))
                }
            }
        }
        Ok(mask)
    }
}

impl std::fmt::Display for OpMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if self.read {
            parts.push("read");
        }
        if self.write {
            parts.push("write");
        }
        if self.delete {
            parts.push("delete");
        }
        write!(f, "{}", parts.join(", "))
    }
}
