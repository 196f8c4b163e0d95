// factor.rs — Nested loop factor window
//
// Tracks a multiplicative factor (unroll or tripcount) across nested loop
// scopes. The three innermost levels are kept individually; deeper levels
// only contribute to the running product.
//
// Preconditions: factors passed to `enter` are positive.
// Postconditions: `exit` undoes the matching `enter`; `unpause` undoes the
//                 matching `pause`.
// Failure modes: none. `exit` on an empty window restores a neutral level.
// Side effects: none.

/// Snapshot of a factor window, copied onto nodes at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackedFactor {
    pub full: f64,
    pub first: f64,
    pub second: f64,
    pub third: f64,
}

impl Default for StackedFactor {
    fn default() -> Self {
        StackedFactor {
            full: 1.0,
            first: 1.0,
            second: 1.0,
            third: 1.0,
        }
    }
}

/// Sliding window over the three innermost loop levels.
#[derive(Debug, Clone)]
pub struct FactorHierarchy {
    levels: [f64; 3],
    full: f64,
    /// Level removed by the last `pause`.
    paused: f64,
    /// Level pushed out by the last `enter`.
    spilled: f64,
    overflow: Vec<f64>,
}

impl Default for FactorHierarchy {
    fn default() -> Self {
        FactorHierarchy {
            levels: [1.0; 3],
            full: 1.0,
            paused: 1.0,
            spilled: 1.0,
            overflow: Vec::new(),
        }
    }
}

impl FactorHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new innermost level.
    pub fn enter(&mut self, factor: f64) {
        self.full *= factor;
        self.overflow.push(self.levels[2]);
        self.spilled = self.levels[2];
        self.levels = [factor, self.levels[0], self.levels[1]];
    }

    /// Pop the innermost level.
    pub fn exit(&mut self) {
        self.full /= self.levels[0];
        let restored = self.overflow.pop().unwrap_or(1.0);
        self.levels = [self.levels[1], self.levels[2], restored];
    }

    /// Drop the innermost level's contribution until `unpause`.
    pub fn pause(&mut self) {
        self.full /= self.levels[0];
        self.paused = self.levels[0];
        self.levels = [self.levels[1], self.levels[2], self.spilled];
    }

    pub fn unpause(&mut self) {
        self.levels = [self.paused, self.levels[0], self.levels[1]];
        self.full *= self.levels[0];
    }

    pub fn product(&self) -> f64 {
        self.full
    }

    pub fn snapshot(&self) -> StackedFactor {
        StackedFactor {
            full: self.full,
            first: self.levels[0],
            second: self.levels[1],
            third: self.levels[2],
        }
    }
}
