// ABOUTME: Machine names derived from the target name and a run-local counter.
// ABOUTME: Names are unique within one run, not globally.

use super::TargetName;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MachineName(String);

impl MachineName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out `<target>-1`, `<target>-2`, ... for one install run.
#[derive(Debug)]
pub struct MachineNamer {
    base: TargetName,
    counter: AtomicUsize,
}

impl MachineNamer {
    pub fn new(base: TargetName) -> Self {
        Self {
            base,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn next_name(&self) -> MachineName {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        MachineName(format!("{}-{}", self.base, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_increase_monotonically() {
        let namer = MachineNamer::new(TargetName::new("prod").unwrap());
        assert_eq!(namer.next_name().as_str(), "prod-1");
        assert_eq!(namer.next_name().as_str(), "prod-2");
        assert_eq!(namer.next_name().as_str(), "prod-3");
    }
}
