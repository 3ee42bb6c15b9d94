use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainPolicy {
    /// Stop at the first failed element
    #[default]
    FailFast,
    /// Submit the next element without a dependency and carry on
    Continue,
}

impl fmt::Display for ChainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainPolicy::FailFast => write!(f, "fail-fast"),
            ChainPolicy::Continue => write!(f, "continue"),
        }
    }
}
