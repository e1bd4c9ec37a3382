//SPDX-License-Identifier: MPL-2.0

//! The fixed set of achievements the vendor knows about.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::Error;

/// Valid achievement identifiers.  Anything else is rejected before reaching the vendor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Achievement {
    JobTitle1,
    JobTitle2,
    JobTitle3,
    JobTitle4,
    JobTitle5,
    JobTitle6,
    JobTitle7,
    JobTitle8,
    NewEnd,
    TimeLate,
    TimeEarly,
    OmitSubleq,
    Erase,
    Avoision,
}

impl Achievement {
    pub const ALL: [Achievement; 14] = [
        Achievement::JobTitle1,
        Achievement::JobTitle2,
        Achievement::JobTitle3,
        Achievement::JobTitle4,
        Achievement::JobTitle5,
        Achievement::JobTitle6,
        Achievement::JobTitle7,
        Achievement::JobTitle8,
        Achievement::NewEnd,
        Achievement::TimeLate,
        Achievement::TimeEarly,
        Achievement::OmitSubleq,
        Achievement::Erase,
        Achievement::Avoision,
    ];

    /// The vendor-side identifier.
    pub fn id(self) -> &'static str {
        match self {
            Achievement::JobTitle1 => "JOB_TITLE_1",
            Achievement::JobTitle2 => "JOB_TITLE_2",
            Achievement::JobTitle3 => "JOB_TITLE_3",
            Achievement::JobTitle4 => "JOB_TITLE_4",
            Achievement::JobTitle5 => "JOB_TITLE_5",
            Achievement::JobTitle6 => "JOB_TITLE_6",
            Achievement::JobTitle7 => "JOB_TITLE_7",
            Achievement::JobTitle8 => "JOB_TITLE_8",
            Achievement::NewEnd => "NEW_END",
            Achievement::TimeLate => "TIME_LATE",
            Achievement::TimeEarly => "TIME_EARLY",
            Achievement::OmitSubleq => "OMIT_SUBLEQ",
            Achievement::Erase => "ERASE",
            Achievement::Avoision => "AVOISION",
        }
    }
}

impl FromStr for Achievement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Achievement::ALL
            .into_iter()
            .find(|a| a.id() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown achievement {s:?}")))
    }
}

impl Display for Achievement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
