use rustc_hash::FxHashSet;

/// Identifiers are compared only after trimming.
#[inline]
pub fn normalize_key(raw: &str) -> &str {
    raw.trim()
}

/// The distinct identifiers a run is looking for, plus the row counts behind them.
#[derive(Debug, Default)]
pub struct TargetSet {
    keys: FxHashSet<String>,
    non_empty_rows: u64,
    empty_rows: u64,
}

impl TargetSet {
    /// Builds the set from the key column, in row order. Empty-after-trim values are
    /// counted but never become targets.
    pub fn from_keys<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = Self::default();
        for raw in keys {
            let key = normalize_key(raw);
            if key.is_empty() {
                set.empty_rows += 1;
            } else {
                set.non_empty_rows += 1;
                if !set.keys.contains(key) {
                    set.keys.insert(key.to_string());
                }
            }
        }
        set
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of matches that lets the scan stop early: one per distinct identifier.
    pub fn match_goal(&self) -> u64 {
        self.keys.len() as u64
    }

    pub fn distinct(&self) -> usize {
        self.keys.len()
    }

    pub fn non_empty_rows(&self) -> u64 {
        self.non_empty_rows
    }

    pub fn empty_rows(&self) -> u64 {
        self.empty_rows
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
