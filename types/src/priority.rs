use serde::{Deserialize, Serialize};

/// Scheduling priority, ascending. Higher variants are always drained first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Maintenance,
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const COUNT: usize = 5;

    /// All levels in ascending order.
    pub const ALL: [Priority; Priority::COUNT] = [
        Priority::Maintenance,
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Position of this level in [`Priority::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_ascending() {
        assert!(Priority::Maintenance < Priority::Low);
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::High < Priority::Critical);
        for (i, p) in Priority::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }
}
